//! Annotated release tags

use super::{GitClient, is_existing_local_tag, is_existing_remote_tag};
use crate::core::config::CiEnvironment;
use crate::core::error::PublishError;

const BOT_NAME: &str = "github-actions[bot]";
const BOT_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

/// Committer identity used for the tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    /// `GIT_USER_NAME`/`GIT_USER_EMAIL`, else the workflow actor, else the actions bot
    pub fn from_ci(ci: &CiEnvironment) -> Self {
        let name = ci
            .git_user_name
            .clone()
            .or_else(|| ci.github_actor.clone())
            .unwrap_or_else(|| BOT_NAME.to_string());
        let email = ci.git_user_email.clone().unwrap_or_else(|| match &ci.github_actor {
            Some(actor) => format!("{}@users.noreply.github.com", actor),
            None => BOT_EMAIL.to_string(),
        });
        Self { name, email }
    }
}

/// Tag name for a published version
pub fn tag_name(prefix: &str, version: &str) -> String {
    format!("{}{}", prefix, version)
}

/// What happened to the release tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTagReport {
    pub tag: String,
    /// Created locally by this run
    pub created: bool,
    /// Pushed to origin by this run
    pub pushed: bool,
}

/// Create `<prefix><version>` as an annotated tag and push it to origin
pub async fn create_release_tag(
    git: &GitClient<'_>,
    prefix: &str,
    version: &str,
    identity: &GitIdentity,
) -> Result<GitTagReport, PublishError> {
    let tag = tag_name(prefix, version);
    let failed = |message: String| PublishError::GitTagFailed {
        tag: tag.clone(),
        message,
    };

    for (key, value) in [("user.name", &identity.name), ("user.email", &identity.email)] {
        git.output(git.git(["config", key, value.as_str()]))
            .await
            .map_err(|e| failed(e.to_string()))?;
    }

    let message = format!("Release {}", version);
    let created = run_tag_step(
        git,
        ["tag", "-a", tag.as_str(), "-m", message.as_str()],
        is_existing_local_tag,
    )
        .await
        .map_err(failed)?;
    if created {
        log::info!("Created git tag {}", tag);
    } else {
        log::warn!("Git tag {} already exists locally", tag);
    }

    let pushed = run_tag_step(git, ["push", "origin", tag.as_str()], is_existing_remote_tag)
        .await
        .map_err(failed)?;
    if pushed {
        log::info!("Pushed git tag {} to origin", tag);
    } else {
        log::warn!("Remote already has git tag {}", tag);
    }

    Ok(GitTagReport {
        tag,
        created,
        pushed,
    })
}

/// `Ok(true)` on success, `Ok(false)` when `exists` recognises the failure
async fn run_tag_step<const N: usize>(
    git: &GitClient<'_>,
    args: [&str; N],
    exists: fn(&str) -> bool,
) -> Result<bool, String> {
    let spec = git.git(args);
    let result = git.exec(&spec).await.map_err(|e| e.to_string())?;
    if result.is_success() {
        return Ok(true);
    }
    let output = result.combined_output();
    if exists(&output) {
        Ok(false)
    } else {
        Err(output)
    }
}
