//! Git operations used around a publish: commit hash, release tags, diffs
//!
//! Everything goes through the `git` CLI via [`CommandRunner`], in the
//! package directory.

pub mod diff;
pub mod tag;

pub use diff::{DiffSource, collect_diff};
pub use tag::{GitIdentity, GitTagReport, create_release_tag, tag_name};

use crate::core::error::PublishError;
use crate::core::traits::{CommandRunner, CommandSpec, ExecResult};
use aho_corasick::AhoCorasick;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref LOCAL_TAG_EXISTS: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["already exists"])
        .unwrap();

    /// ` ! [rejected]  v1.0.0 -> v1.0.0 (already exists)`
    static ref REMOTE_TAG_EXISTS: Regex =
        Regex::new(r"(?mi)^\s*!\s*\[rejected\].*\(already exists\)").unwrap();
}

/// `git tag` failed because the tag is already in the local repository
pub fn is_existing_local_tag(output: &str) -> bool {
    LOCAL_TAG_EXISTS.is_match(output)
}

/// `git push` was rejected only because the remote already has the tag
///
/// Any other rejection (`[remote rejected]` by a hook or protection rule,
/// missing permissions) is a real failure.
pub fn is_existing_remote_tag(output: &str) -> bool {
    REMOTE_TAG_EXISTS.is_match(output)
}

/// `git` invocations rooted at one directory
pub struct GitClient<'a> {
    runner: &'a dyn CommandRunner,
    dir: PathBuf,
}

impl<'a> GitClient<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dir: &Path) -> Self {
        Self {
            runner,
            dir: dir.to_path_buf(),
        }
    }

    pub(crate) fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("git", &self.dir).args(args)
    }

    pub(crate) async fn exec(&self, spec: &CommandSpec) -> Result<ExecResult, PublishError> {
        self.runner
            .run(spec)
            .await
            .map_err(|e| PublishError::CommandFailed {
                command: spec.to_string(),
                message: e.to_string(),
            })
    }

    /// Run and return trimmed stdout, failing on a non-zero exit
    pub(crate) async fn output(&self, spec: CommandSpec) -> Result<String, PublishError> {
        let result = self.exec(&spec).await?;
        if !result.is_success() {
            return Err(PublishError::CommandFailed {
                command: spec.to_string(),
                message: result.combined_output(),
            });
        }
        Ok(result.stdout().to_string())
    }

    /// Short hash of HEAD, `None` outside a repository
    pub async fn short_sha(&self) -> Option<String> {
        match self.output(self.git(["rev-parse", "--short", "HEAD"])).await {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Could not determine the commit hash: {}", e);
                None
            }
        }
    }

    /// Current branch name
    pub async fn current_branch(&self) -> Result<String, PublishError> {
        self.output(self.git(["rev-parse", "--abbrev-ref", "HEAD"]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRunner;

    #[test]
    fn test_existing_tag_detection() {
        assert!(is_existing_local_tag("fatal: tag 'v1.0.0' already exists"));
        assert!(!is_existing_local_tag("fatal: could not read Username"));

        assert!(is_existing_remote_tag(
            "To github.com:o/r.git\n ! [rejected]        v1.0.0 -> v1.0.0 (already exists)\nerror: failed to push some refs"
        ));
        assert!(!is_existing_remote_tag(
            " ! [remote rejected] v1.0.0 -> v1.0.0 (refusing to allow a GitHub App to create or update tags: protected tag rule)"
        ));
        assert!(!is_existing_remote_tag(" ! [remote rejected] v1.0.0 -> v1.0.0 (permission denied)"));
        assert!(!is_existing_remote_tag(" ! [rejected]        main -> main (non-fast-forward)"));
        assert!(!is_existing_remote_tag("fatal: could not read Username"));
    }

    #[tokio::test]
    async fn test_short_sha() {
        let runner = FakeRunner::new().respond("git rev-parse --short HEAD", FakeRunner::ok("abc1234\n"));
        let git = GitClient::new(&runner, &std::env::temp_dir());
        assert_eq!(git.short_sha().await.as_deref(), Some("abc1234"));
    }

    #[tokio::test]
    async fn test_short_sha_outside_repository() {
        let runner = FakeRunner::new().respond(
            "git rev-parse",
            FakeRunner::fail("fatal: not a git repository"),
        );
        let git = GitClient::new(&runner, &std::env::temp_dir());
        assert_eq!(git.short_sha().await, None);
    }
}
