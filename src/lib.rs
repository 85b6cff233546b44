//! npm-publish-helper
//!
//! Publishes npm packages from CI: version policy, registry authentication,
//! CHECK → PUBLISH → TAG, git tags, webhook notifications and LLM summaries.

pub mod core;
pub mod git;
pub mod github;
pub mod llm;
pub mod notify;
pub mod npm;
pub mod orchestration;
pub mod security;

#[cfg(test)]
mod testutil;

pub use core::*;
pub use orchestration::{DiffOptions, PackagePublisher, PublishOptions, PublishReport};
pub use security::{CommandError, SafeCommandExecutor, SecureTokenManager};
