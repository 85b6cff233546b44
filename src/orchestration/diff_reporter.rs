//! `diff`: report what changed since the last push (or in a time window)

use crate::core::config::CiEnvironment;
use crate::core::error::PublishError;
use crate::core::traits::{CommandRunner, Notifier};
use crate::git::{DiffSource, GitClient, collect_diff};
use crate::github::CiOutput;
use crate::llm::{Summarizer, SummaryKind};
use crate::notify::{MAX_MESSAGE_CHARS, send_fenced, send_masked};
use crate::security::SecureTokenManager;
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub directory: PathBuf,
    /// `git log --since` value; selects the time window mode
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub llm_api_key: Option<SecretString>,
}

/// Text produced by [`report_diff`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub source: DiffSource,
    pub text: String,
    /// `text` is an LLM summary rather than the raw diff
    pub summarized: bool,
}

/// Collect the diff, summarize it when a key is available, then publish the
/// text to the `diff-summary` output and the webhook
///
/// Returns `None` when there is nothing to report.
pub async fn report_diff(
    runner: &dyn CommandRunner,
    notifier: &dyn Notifier,
    ci: &CiEnvironment,
    options: &DiffOptions,
) -> Result<Option<DiffReport>, PublishError> {
    let source = DiffSource::select(options.start_time.as_deref(), options.end_time.as_deref(), ci);
    log::info!("Collecting changes ({:?})", source);

    let git = GitClient::new(runner, &options.directory);
    let Some(diff) = collect_diff(&git, &source).await? else {
        log::info!("No changes found");
        return Ok(None);
    };

    let mut tokens = SecureTokenManager::new();
    let (text, summarized) = match &options.llm_api_key {
        Some(key) => {
            tokens.register(key);
            match summarize(key, &diff).await {
                Some(summary) => (summary, true),
                None => (diff, false),
            }
        }
        None => (diff, false),
    };

    CiOutput::new(ci.github_output.as_deref()).set("diff-summary", &text);

    if summarized && text.chars().count() <= MAX_MESSAGE_CHARS {
        send_masked(notifier, &tokens, &text).await;
    } else {
        send_fenced(notifier, &tokens, &text).await;
    }

    Ok(Some(DiffReport {
        source,
        text,
        summarized,
    }))
}

async fn summarize(key: &SecretString, diff: &str) -> Option<String> {
    let result = match Summarizer::new(Some(key)) {
        Ok(summarizer) => summarizer.summarize(&SummaryKind::Changelog, diff).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(summary) => Some(summary),
        Err(e) => {
            log::warn!("Summarizing failed, reporting the raw diff instead: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeRunner, RecordingNotifier};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn ci_with_output(dir: &TempDir, extra: &[(&str, &str)]) -> CiEnvironment {
        let mut vars: HashMap<String, String> = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.insert(
            "GITHUB_OUTPUT".to_string(),
            dir.path().join("output").display().to_string(),
        );
        CiEnvironment::from_map(&vars)
    }

    #[tokio::test]
    async fn test_push_range_reported_raw() {
        let dir = TempDir::new().unwrap();
        let ci = ci_with_output(&dir, &[("GITHUB_EVENT_BEFORE", "aaa111"), ("GITHUB_SHA", "bbb222")]);
        let runner = FakeRunner::new().respond("git diff aaa111..bbb222", FakeRunner::ok("+added line"));
        let notifier = RecordingNotifier::new();

        let options = DiffOptions {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let report = report_diff(&runner, &notifier, &ci, &options)
            .await
            .unwrap()
            .unwrap();

        assert!(!report.summarized);
        assert_eq!(report.text, "+added line");
        assert_eq!(notifier.messages(), vec!["```\n+added line\n```"]);

        let output = std::fs::read_to_string(dir.path().join("output")).unwrap();
        assert_eq!(output, "diff-summary=+added line\n");
    }

    #[tokio::test]
    async fn test_time_window_uses_git_log() {
        let dir = TempDir::new().unwrap();
        let ci = ci_with_output(&dir, &[]);
        let runner = FakeRunner::new().respond("git log", FakeRunner::ok("commit abc\n\n    Fix"));
        let notifier = RecordingNotifier::new();

        let options = DiffOptions {
            directory: dir.path().to_path_buf(),
            start_time: Some("2024-01-01".to_string()),
            end_time: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        let report = report_diff(&runner, &notifier, &ci, &options)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(report.source, DiffSource::TimeWindow { .. }));
        assert!(runner.ran("git log --since=2024-01-01 --until=2024-02-01 -p"));
    }

    #[tokio::test]
    async fn test_empty_diff_reports_nothing() {
        let dir = TempDir::new().unwrap();
        let ci = ci_with_output(&dir, &[("GITHUB_EVENT_BEFORE", "aaa111"), ("GITHUB_SHA", "bbb222")]);
        let runner = FakeRunner::new();
        let notifier = RecordingNotifier::new();

        let options = DiffOptions {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(report_diff(&runner, &notifier, &ci, &options).await.unwrap().is_none());
        assert!(notifier.messages().is_empty());
        assert!(!dir.path().join("output").exists());
    }

    #[tokio::test]
    async fn test_unknown_key_falls_back_to_raw_diff() {
        let dir = TempDir::new().unwrap();
        let ci = ci_with_output(&dir, &[("GITHUB_EVENT_BEFORE", "aaa111"), ("GITHUB_SHA", "bbb222")]);
        let runner = FakeRunner::new().respond("git diff", FakeRunner::ok("+x"));
        let notifier = RecordingNotifier::new();

        let options = DiffOptions {
            directory: dir.path().to_path_buf(),
            llm_api_key: Some(SecretString::new("not-a-known-key-format".into())),
            ..Default::default()
        };
        let report = report_diff(&runner, &notifier, &ci, &options)
            .await
            .unwrap()
            .unwrap();
        assert!(!report.summarized);
        assert_eq!(report.text, "+x");
    }
}
