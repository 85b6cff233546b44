//! Notifications: webhook delivery plus masking and chunking of long payloads

pub mod webhook;

pub use webhook::{NoopNotifier, WebhookNotifier, WebhookProvider};

use crate::core::traits::{DeliveryReport, Notifier};
use crate::security::SecureTokenManager;

/// Upper bound of one chunk, fences included
pub const MAX_MESSAGE_CHARS: usize = 1800;

const FENCE_OPEN: &str = "```\n";
const FENCE_CLOSE: &str = "\n```";

/// Notifier for an optional webhook URL
pub fn notifier_for(url: Option<&str>) -> Box<dyn Notifier> {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Box::new(WebhookNotifier::new(url)),
        None => Box::new(NoopNotifier),
    }
}

/// Split `text` into fenced code blocks of at most `max_chars` characters each
///
/// Lines are kept whole where they fit; longer lines are cut on char boundaries.
pub fn chunk_fenced(text: &str, max_chars: usize) -> Vec<String> {
    let overhead = FENCE_OPEN.len() + FENCE_CLOSE.len();
    let budget = max_chars.saturating_sub(overhead).max(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let mut flush = |current: &mut String, current_len: &mut usize| {
        if !current.is_empty() {
            chunks.push(format!("{}{}{}", FENCE_OPEN, current, FENCE_CLOSE));
            current.clear();
            *current_len = 0;
        }
    };

    for line in text.trim_end().lines() {
        let line = line.replace("```", "'''");
        let mut rest: &str = &line;
        loop {
            let separator = usize::from(current_len > 0);
            let available = budget.saturating_sub(current_len + separator);
            let rest_len = rest.chars().count();

            if rest_len <= available {
                if separator == 1 {
                    current.push('\n');
                }
                current.push_str(rest);
                current_len += separator + rest_len;
                break;
            }
            if current_len > 0 {
                flush(&mut current, &mut current_len);
                continue;
            }
            let split = rest
                .char_indices()
                .nth(budget)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            current.push_str(&rest[..split]);
            current_len = budget;
            flush(&mut current, &mut current_len);
            rest = &rest[split..];
            if rest.is_empty() {
                break;
            }
        }
    }
    flush(&mut current, &mut current_len);
    chunks
}

/// Mask registered secrets and send `message`
pub async fn send_masked(
    notifier: &dyn Notifier,
    tokens: &SecureTokenManager,
    message: &str,
) -> DeliveryReport {
    notifier.send(&tokens.mask_tokens_in_string(message)).await
}

/// Mask, chunk and send a long payload (e.g. npm error output), one message per chunk
pub async fn send_fenced(
    notifier: &dyn Notifier,
    tokens: &SecureTokenManager,
    text: &str,
) -> Vec<DeliveryReport> {
    let masked = tokens.mask_tokens_in_string(text);
    let mut reports = Vec::new();
    for chunk in chunk_fenced(&masked, MAX_MESSAGE_CHARS) {
        let report = notifier.send(&chunk).await;
        let stop = matches!(report, DeliveryReport::Disabled | DeliveryReport::Unsupported { .. });
        reports.push(report);
        if stop {
            break;
        }
    }
    reports
}
