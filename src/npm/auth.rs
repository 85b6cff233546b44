//! Registry authentication: static token, OIDC trusted publishing or ambient npm config

use crate::core::config::CiEnvironment;
use crate::core::error::PublishError;
use crate::core::traits::{CommandRunner, CommandSpec, ExecResult};
use crate::security::NPM_CREDENTIAL_ENV_VARS;
use aho_corasick::AhoCorasick;
use lazy_static::lazy_static;
use secrecy::{ExposeSecret, SecretString};
use semver::Version;
use std::fmt;
use std::path::Path;

/// First npm release able to exchange a GitHub identity token
pub const OIDC_MIN_NPM_VERSION: &str = "11.5.1";

const FAILURE_PATTERNS: &[&str] = &[
    "E404",
    "404 Not Found",
    "E401",
    "401 Unauthorized",
    "E403",
    "403 Forbidden",
    "ENEEDAUTH",
];

lazy_static! {
    static ref FAILURE_MATCHER: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(FAILURE_PATTERNS)
        .unwrap();
}

/// How npm authenticates against the registry
#[derive(Clone)]
pub enum AuthMode {
    Token(SecretString),
    Oidc,
    /// Whatever `.npmrc` / environment the runner already has
    Ambient,
}

impl AuthMode {
    /// OIDC takes precedence over a token when both are given
    pub fn select(token: Option<SecretString>, oidc: bool) -> Self {
        match (oidc, token) {
            (true, Some(_)) => {
                log::warn!("Both an access token and --oidc were given; using OIDC");
                Self::Oidc
            }
            (true, None) => Self::Oidc,
            (false, Some(token)) if !token.expose_secret().trim().is_empty() => Self::Token(token),
            (false, _) => Self::Ambient,
        }
    }

    pub fn is_oidc(&self) -> bool {
        matches!(self, Self::Oidc)
    }

    /// Variables removed from every npm invocation in this mode
    pub fn env_removals(&self) -> &'static [&'static str] {
        match self {
            Self::Oidc => NPM_CREDENTIAL_ENV_VARS,
            _ => &[],
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => write!(f, "token"),
            Self::Oidc => write!(f, "oidc"),
            Self::Ambient => write!(f, "ambient"),
        }
    }
}

/// `.npmrc` key holding the token for `registry`
///
/// `https://npm.pkg.github.com` → `//npm.pkg.github.com/:_authToken`
pub fn registry_auth_key(registry: &str) -> String {
    let without_scheme = registry
        .trim()
        .trim_start_matches("https:")
        .trim_start_matches("http:")
        .trim_start_matches('/');
    let mut key = format!("//{}", without_scheme);
    if !key.ends_with('/') {
        key.push('/');
    }
    key.push_str(":_authToken");
    key
}

/// Prepare npm for publishing in `dir`
pub async fn configure(
    runner: &dyn CommandRunner,
    dir: &Path,
    mode: &AuthMode,
    registry: &str,
    ci: &CiEnvironment,
) -> Result<(), PublishError> {
    match mode {
        AuthMode::Token(token) => {
            let spec = CommandSpec::new("npm", dir)
                .args(["config", "set", registry_auth_key(registry).as_str()])
                .secret_arg(token.expose_secret());
            let result = run(runner, &spec).await?;
            if !result.is_success() {
                return Err(PublishError::CommandFailed {
                    command: spec.to_string(),
                    message: result.combined_output(),
                });
            }
            log::info!("Configured token authentication for {}", registry);
        }
        AuthMode::Oidc => {
            let spec = CommandSpec::new("npm", dir)
                .arg("--version")
                .env_remove(mode.env_removals().iter().copied());
            let found = run(runner, &spec).await?.stdout().to_string();
            check_oidc_npm_version(&found)?;
            if !ci.has_id_token() {
                return Err(PublishError::OidcUnavailable);
            }
            log::info!("Using OIDC trusted publishing (npm {})", found);
        }
        AuthMode::Ambient => {
            log::warn!(
                "No access token and no --oidc given; relying on the existing npm configuration"
            );
        }
    }
    Ok(())
}

async fn run(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<ExecResult, PublishError> {
    runner
        .run(spec)
        .await
        .map_err(|e| PublishError::CommandFailed {
            command: spec.to_string(),
            message: e.to_string(),
        })
}

/// Fail unless `found` is at least [`OIDC_MIN_NPM_VERSION`]
pub fn check_oidc_npm_version(found: &str) -> Result<(), PublishError> {
    let unsupported = || PublishError::OidcUnsupported {
        found: if found.is_empty() { "unknown" } else { found }.to_string(),
        required: OIDC_MIN_NPM_VERSION.to_string(),
    };
    let parsed = Version::parse(found.trim().trim_start_matches('v')).map_err(|_| unsupported())?;
    let required = Version::new(11, 5, 1);
    if parsed < required {
        return Err(unsupported());
    }
    Ok(())
}

/// Registry failure classes recognised in npm output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    NotFound,
    Unauthorized,
    Forbidden,
    NeedAuth,
}

impl AuthFailure {
    /// Earliest recognised failure in `output`
    pub fn classify(output: &str) -> Option<Self> {
        let found = FAILURE_MATCHER.find(output)?;
        Some(match found.pattern().as_usize() {
            0 | 1 => Self::NotFound,
            2 | 3 => Self::Unauthorized,
            4 | 5 => Self::Forbidden,
            _ => Self::NeedAuth,
        })
    }
}

/// Remediation hints for a failed publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TroubleshootingReport {
    pub failure: Option<AuthFailure>,
    pub lines: Vec<String>,
}

impl TroubleshootingReport {
    pub fn new(output: &str, mode: &AuthMode, package: &str, registry: &str) -> Self {
        let failure = AuthFailure::classify(output);
        let mut lines = Vec::new();

        match (failure, mode) {
            (Some(AuthFailure::NotFound), AuthMode::Oidc) => {
                lines.push(format!(
                    "The registry answered 404 for {}. With OIDC this usually means no trusted publisher is configured.",
                    package
                ));
                lines.push(
                    "Add this repository and workflow file as a trusted publisher in the package settings on npmjs.com".to_string(),
                );
                lines.push(
                    "First releases of a new package must be published with a token".to_string(),
                );
            }
            (Some(AuthFailure::NotFound), _) => {
                lines.push(format!(
                    "The registry answered 404 for {}. The token may lack access to the scope.",
                    package
                ));
                lines.push("Check that the scope exists and the token owner is a member".to_string());
            }
            (Some(AuthFailure::Unauthorized | AuthFailure::NeedAuth), AuthMode::Oidc) => {
                lines.push("npm could not authenticate using the OIDC identity token".to_string());
                lines.push(format!(
                    "Make sure npm >= {} is installed and the job has `permissions: id-token: write`",
                    OIDC_MIN_NPM_VERSION
                ));
            }
            (Some(AuthFailure::Unauthorized | AuthFailure::NeedAuth), AuthMode::Token(_)) => {
                lines.push(format!("The access token was rejected by {}", registry));
                lines.push("Check that the token has not expired or been revoked".to_string());
            }
            (Some(AuthFailure::Unauthorized | AuthFailure::NeedAuth), AuthMode::Ambient) => {
                lines.push(format!("No credentials were found for {}", registry));
                lines.push("Pass --access-token or enable --oidc".to_string());
            }
            (Some(AuthFailure::Forbidden), AuthMode::Oidc) => {
                lines.push(format!(
                    "The trusted publisher of {} does not match this workflow",
                    package
                ));
                lines.push(
                    "Compare the repository, workflow file name and environment with the npm package settings".to_string(),
                );
            }
            (Some(AuthFailure::Forbidden), _) => {
                lines.push(format!("The credentials may not publish {}", package));
                lines.push(
                    "Use an automation or granular token with write access to the package".to_string(),
                );
                lines.push("Accounts with 2FA for writes need an automation token".to_string());
            }
            (None, _) => {}
        }

        Self { failure, lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for TroubleshootingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "- {}", line)?;
        }
        Ok(())
    }
}
