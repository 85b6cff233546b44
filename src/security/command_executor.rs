//! SafeCommandExecutor: whitelisted execution of the tools the helper wraps
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: only `npm`, `npx`, `node` and `git` can run
//! - **Injection prevention**: arguments are passed as a vector to
//!   `tokio::process::Command`, never interpolated into a shell string
//! - **Working directory validation**: checked before spawning
//! - **Environment scrubbing**: per-command removal of stale credentials
//!
//! # Example
//!
//! ```rust,no_run
//! use npm_publish_helper::core::{CommandRunner, CommandSpec};
//! use npm_publish_helper::security::SafeCommandExecutor;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let executor = SafeCommandExecutor::new();
//! let result = executor.run(&CommandSpec::new("npm", ".").arg("--version")).await?;
//! println!("{}", result.stdout());
//! # Ok(())
//! # }
//! ```

use crate::core::traits::{CommandRunner, CommandSpec, ExecResult};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Allowed commands whitelist.
const ALLOWED_COMMANDS: &[&str] = &["npm", "npx", "node", "git"];

lazy_static! {
    /// npm prints the debug log location on failure
    static ref NPM_LOG_PATH: Regex =
        Regex::new(r"A complete log of this run can be found in:\s*(\S+\.log)").unwrap();
}

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be started (binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
}

/// Safe command executor with security controls
#[derive(Debug, Default)]
pub struct SafeCommandExecutor;

impl SafeCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn validate(spec: &CommandSpec) -> Result<(), CommandError> {
        if !ALLOWED_COMMANDS.contains(&spec.program.as_str()) {
            return Err(CommandError::CommandNotAllowed(spec.program.clone()));
        }
        if !spec.cwd.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(spec.cwd.clone()));
        }
        Ok(())
    }

    fn build(spec: &CommandSpec) -> Command {
        // Windows-specific: npm and npx are .cmd shims, not .exe
        #[cfg(target_os = "windows")]
        let command_name = if matches!(spec.program.as_str(), "npm" | "npx") {
            format!("{}.cmd", spec.program)
        } else {
            spec.program.clone()
        };

        #[cfg(not(target_os = "windows"))]
        let command_name = spec.program.clone();

        let mut command = Command::new(command_name);
        command.args(&spec.args).current_dir(&spec.cwd).kill_on_drop(true);
        for name in &spec.env_remove {
            command.env_remove(name);
        }
        if spec.inherit_output {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        command
    }
}

#[async_trait]
impl CommandRunner for SafeCommandExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError> {
        Self::validate(spec)?;
        log::debug!("$ {}", spec);

        let mut command = Self::build(spec);
        let output = command
            .output()
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", spec.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            return Ok(ExecResult::Success { stdout, stderr });
        }

        log::debug!(
            "`{}` exited with {:?}: {}",
            spec,
            output.status.code(),
            truncate(stderr.trim(), 100)
        );
        let log_contents = recover_npm_log(&stderr, &stdout).await;
        Ok(ExecResult::Failure {
            code: output.status.code(),
            stdout,
            stderr,
            log_contents,
        })
    }
}

/// Find the npm debug log path mentioned in the output
pub fn npm_log_path(text: &str) -> Option<PathBuf> {
    NPM_LOG_PATH
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| PathBuf::from(m.as_str()))
}

async fn recover_npm_log(stderr: &str, stdout: &str) -> Option<String> {
    let path = npm_log_path(stderr).or_else(|| npm_log_path(stdout))?;
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Some(contents),
        Err(e) => {
            log::debug!("Could not read npm log {}: {}", path.display(), e);
            None
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
