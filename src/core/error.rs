//! Error handling for npm publishing
//!
//! Fatal conditions of a publish run, each carrying a stable code and the
//! remediation steps printed by the CLI before it exits.

use thiserror::Error;

/// Main error type for publish operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Precondition errors
    #[error("package.json not found at {path}")]
    ManifestNotFound { path: String },

    #[error("invalid package.json at {path}: {message}")]
    ManifestInvalid { path: String, message: String },

    #[error("package.json at {path} has no \"{field}\" field")]
    MissingField { path: String, field: String },

    #[error("invalid dist-tag '{tag}': no non-empty path segment")]
    InvalidTag { tag: String },

    #[error("invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    // Authentication errors
    #[error("OIDC publishing requires npm >= {required}, found {found}")]
    OidcUnsupported { found: String, required: String },

    #[error("OIDC identity token is not available in this job")]
    OidcUnavailable,

    // External tool errors
    #[error("[{package}] npm publish failed: {message}")]
    PublishFailed {
        package: String,
        message: String,
        /// Full npm output including the recovered debug log
        output: String,
    },

    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("git tag '{tag}' could not be created: {message}")]
    GitTagFailed { tag: String, message: String },

    #[error("workflow dispatch failed (HTTP {status}): {message}")]
    DispatchFailed { status: u16, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PublishError {
    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::ManifestNotFound { .. } => vec![
                "Check the directory argument passed to the command",
                "Run the command from the package root",
            ],
            Self::ManifestInvalid { .. } | Self::Json(_) => {
                vec!["Fix the JSON syntax of package.json"]
            }
            Self::MissingField { .. } => {
                vec!["Add the field to package.json or pass --override-name / --override-version"]
            }
            Self::InvalidTag { .. } => vec![
                "Pass a dist-tag such as 'next' or 'canary'",
                "When deriving the tag from a git ref make sure the ref is not empty",
            ],
            Self::InvalidVersion { .. } => vec!["Use a SemVer version (e.g. 1.2.3 or 1.2.3-next.1)"],
            Self::Config(_) => vec!["Check the command line flags and .publish-config.yaml"],
            Self::OidcUnsupported { .. } => vec![
                "Upgrade npm in the workflow: npm install -g npm@latest",
                "Or publish with --access-token instead of --oidc",
            ],
            Self::OidcUnavailable => vec![
                "Add `permissions: id-token: write` to the workflow job",
                "OIDC is only available on GitHub-hosted or configured runners",
            ],
            Self::PublishFailed { .. } => vec![
                "Check the npm output sent above",
                "Check that the credentials may publish this package",
                "Check the registry status",
            ],
            Self::CommandFailed { .. } => vec![
                "Check the command output",
                "Make sure node, npm and git are installed on the runner",
            ],
            Self::GitTagFailed { .. } => vec![
                "Check that the workflow has `contents: write` permission",
                "Make sure the checkout kept credentials (persist-credentials)",
            ],
            Self::DispatchFailed { .. } => vec![
                "Check that the token has `actions: write` on the target repository",
                "Check the workflow file name and the ref",
            ],
            Self::Io(_) => vec!["Check file permissions in the package directory"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::ManifestNotFound { .. } => "MANIFEST_NOT_FOUND",
            Self::ManifestInvalid { .. } => "MANIFEST_INVALID",
            Self::MissingField { .. } => "MISSING_FIELD",
            Self::InvalidTag { .. } => "INVALID_TAG",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::Config(_) => "CONFIG_ERROR",
            Self::OidcUnsupported { .. } => "OIDC_UNSUPPORTED",
            Self::OidcUnavailable => "OIDC_UNAVAILABLE",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::GitTagFailed { .. } => "GIT_TAG_FAILED",
            Self::DispatchFailed { .. } => "DISPATCH_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the error was raised before any side effect took place
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ManifestNotFound { .. }
                | Self::ManifestInvalid { .. }
                | Self::MissingField { .. }
                | Self::InvalidTag { .. }
                | Self::Config(_)
        )
    }
}
