//! Configuration structures and types for npm-publish-helper
//!
//! [`PublishConfig`] is the mergeable layer shared by the project file, the
//! environment and the command line. [`CiEnvironment`] is the snapshot of
//! every CI variable the helper reads, taken once at startup.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default npm registry
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Mergeable publish configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    /// Registry URL (default: https://registry.npmjs.org/)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Dist-tag to create or update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Package access level (default: public)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<NpmAccess>,

    /// Append the short commit hash to the version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_hash: Option<bool>,

    /// Append the dist-tag to the version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_tag: Option<bool>,

    /// Create a git tag with this prefix (empty string: no prefix)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_tag: Option<String>,

    /// Webhook URL for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,

    /// Use OIDC trusted publishing instead of a token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc: Option<bool>,

    /// Do not publish, tag or push
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// Run update-npmdef, compile-library and tsc before publishing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepare_package: Option<bool>,
}

impl PublishConfig {
    /// Registry URL, falling back to the public npm registry
    pub fn registry_or_default(&self) -> String {
        self.registry
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
    }
}

/// npm package access level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NpmAccess {
    #[default]
    Public,
    Restricted,
}

impl NpmAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
        }
    }
}

/// Snapshot of the CI environment
///
/// Built once in `main` and passed down; library code never calls
/// `std::env::var` itself.
#[derive(Clone, Default)]
pub struct CiEnvironment {
    pub github_output: Option<PathBuf>,
    pub github_event_path: Option<PathBuf>,
    pub github_event_name: Option<String>,
    pub github_base_ref: Option<String>,
    pub github_head_ref: Option<String>,
    pub github_sha: Option<String>,
    pub github_event_before: Option<String>,
    pub github_repository: Option<String>,
    pub github_actor: Option<String>,
    pub github_repository_visibility: Option<String>,
    pub id_token_request_url: Option<String>,
    pub id_token_request_token: Option<SecretString>,
    pub llm_api_key: Option<SecretString>,
    pub git_user_name: Option<String>,
    pub git_user_email: Option<String>,
}

impl CiEnvironment {
    /// Build from an explicit variable map; empty values count as unset
    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secret = |name: &str| get(name).map(|v| SecretString::new(v.into()));

        Self {
            github_output: get("GITHUB_OUTPUT").map(PathBuf::from),
            github_event_path: get("GITHUB_EVENT_PATH").map(PathBuf::from),
            github_event_name: get("GITHUB_EVENT_NAME"),
            github_base_ref: get("GITHUB_BASE_REF"),
            github_head_ref: get("GITHUB_HEAD_REF"),
            github_sha: get("GITHUB_SHA"),
            github_event_before: get("GITHUB_EVENT_BEFORE"),
            github_repository: get("GITHUB_REPOSITORY"),
            github_actor: get("GITHUB_ACTOR"),
            github_repository_visibility: get("GITHUB_REPOSITORY_VISIBILITY"),
            id_token_request_url: get("ACTIONS_ID_TOKEN_REQUEST_URL"),
            id_token_request_token: secret("ACTIONS_ID_TOKEN_REQUEST_TOKEN"),
            llm_api_key: secret("LLM_API_KEY"),
            git_user_name: get("GIT_USER_NAME"),
            git_user_email: get("GIT_USER_EMAIL"),
        }
    }

    /// Whether the job may request an OIDC identity token
    pub fn has_id_token(&self) -> bool {
        self.id_token_request_url.is_some() && self.id_token_request_token.is_some()
    }

    pub fn is_pull_request(&self) -> bool {
        self.github_event_name.as_deref() == Some("pull_request")
    }

    pub fn is_public_repository(&self) -> bool {
        self.github_repository_visibility.as_deref() == Some("public")
    }
}

impl std::fmt::Debug for CiEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiEnvironment")
            .field("github_output", &self.github_output)
            .field("github_event_name", &self.github_event_name)
            .field("github_repository", &self.github_repository)
            .field("github_sha", &self.github_sha)
            .field("has_id_token", &self.has_id_token())
            .field("has_llm_api_key", &self.llm_api_key.is_some())
            .finish_non_exhaustive()
    }
}
