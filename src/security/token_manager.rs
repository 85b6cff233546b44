//! Secure token manager with memory-safe handling and masking capabilities
//!
//! Secrets handed to the helper (registry token, GitHub token, LLM key) are
//! kept in `secrecy` wrappers and registered here, so every piece of text
//! that leaves the process through logs or webhooks can be masked first.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

/// Environment variables that carry npm credentials
///
/// In OIDC mode these are removed from every npm invocation so a stale or
/// empty value does not take precedence over the identity token exchange.
pub const NPM_CREDENTIAL_ENV_VARS: &[&str] = &[
    "NODE_AUTH_TOKEN",
    "NPM_TOKEN",
    "NPM_CONFIG_TOKEN",
    "NPM_CONFIG__AUTH",
    "NPM_CONFIG__AUTHTOKEN",
];

/// Secure token manager for masking registered secrets
///
/// # Examples
///
/// ```
/// use npm_publish_helper::security::SecureTokenManager;
/// use secrecy::SecretString;
///
/// let mut manager = SecureTokenManager::new();
/// manager.register(&SecretString::new("npm_abcdefghijkl".into()));
/// assert_eq!(manager.mask_tokens_in_string("token npm_abcdefghijkl"), "token npm...jkl");
/// ```
#[derive(Default, Clone)]
pub struct SecureTokenManager {
    secrets: Vec<SecretString>,
}

impl SecureTokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a secret so it is masked in every sanitized string
    ///
    /// Empty secrets are ignored.
    pub fn register(&mut self, secret: &SecretString) {
        if !secret.expose_secret().trim().is_empty() {
            self.secrets.push(secret.clone());
        }
    }

    /// Number of registered secrets
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Masks a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters for identification purposes.
    /// Tokens shorter than 10 characters are fully masked as "****".
    ///
    /// ```
    /// use npm_publish_helper::security::SecureTokenManager;
    ///
    /// let manager = SecureTokenManager::new();
    /// assert_eq!(manager.mask_token("abcdef123456"), "abc...456");
    /// assert_eq!(manager.mask_token("short"), "****");
    /// ```
    pub fn mask_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 10 {
            return "****".to_string();
        }

        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }

    /// Masks all registered tokens in a string
    pub fn mask_tokens_in_string(&self, text: &str) -> String {
        let mut masked = text.to_string();

        for secret in &self.secrets {
            let token_str = secret.expose_secret();
            if let Ok(regex) = Regex::new(&regex::escape(token_str)) {
                let masked_token = self.mask_token(token_str);
                masked = regex
                    .replace_all(&masked, masked_token.as_str())
                    .to_string();
            }
        }

        masked
    }
}

impl std::fmt::Debug for SecureTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTokenManager")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}
