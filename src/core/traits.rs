//! Core traits and types for the publish pipeline
//!
//! Every external program is described by a [`CommandSpec`] and run through a
//! [`CommandRunner`]; every notification goes through a [`Notifier`]. The
//! pipeline only talks to these seams so tests can script both.

use crate::security::CommandError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Command execution
// ============================================================================

/// A single external program invocation with typed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Environment variables removed from the child environment
    pub env_remove: Vec<String>,
    /// Stream stdout/stderr to the terminal instead of capturing them
    pub inherit_output: bool,
    /// Indices of arguments printed as `****`
    pub redacted: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            env_remove: Vec::new(),
            inherit_output: false,
            redacted: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an argument that must never be displayed
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env_remove<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_remove.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (index, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&index) {
                write!(f, " ****")?;
            } else if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Outcome of a finished external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecResult {
    Success {
        stdout: String,
        stderr: String,
    },
    Failure {
        code: Option<i32>,
        stdout: String,
        stderr: String,
        /// Contents of the npm debug log referenced in the output, if any
        log_contents: Option<String>,
    },
}

impl ExecResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Trimmed stdout of the process
    pub fn stdout(&self) -> &str {
        match self {
            Self::Success { stdout, .. } | Self::Failure { stdout, .. } => stdout.trim(),
        }
    }

    /// All captured text: stderr, stdout and the recovered log file
    pub fn combined_output(&self) -> String {
        match self {
            Self::Success { stdout, stderr } => join_nonempty(&[stderr, stdout]),
            Self::Failure {
                stdout,
                stderr,
                log_contents,
                ..
            } => {
                let log = log_contents.as_deref().unwrap_or_default();
                join_nonempty(&[stderr, stdout, log])
            }
        }
    }
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Process-execution abstraction used by every pipeline step
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// A non-zero exit status is reported as [`ExecResult::Failure`]; `Err` is
    /// reserved for programs that could not be started at all.
    async fn run(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError>;
}

// ============================================================================
// Notifications
// ============================================================================

/// Result of delivering one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Sent,
    HttpFailure { status: u16, message: String },
    NetworkFailure { message: String },
    Unsupported { url: String },
    Disabled,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::HttpFailure { status, message } => {
                write!(f, "failed to send message: {} {}", status, message)
            }
            Self::NetworkFailure { message } => write!(f, "failed to send message: {}", message),
            Self::Unsupported { .. } => write!(f, "unsupported webhook URL"),
            Self::Disabled => write!(f, "no webhook configured"),
        }
    }
}

/// Capability of posting a message to one destination
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message; never fails, the outcome is reported instead
    async fn send(&self, message: &str) -> DeliveryReport;
}
