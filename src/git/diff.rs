//! Collect the changes a CI run is about: a time window, a pull request or the last push

use super::GitClient;
use crate::core::config::CiEnvironment;
use crate::core::error::PublishError;

const ORIGIN: &str = "origin";
const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// Which range of history to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSource {
    /// `git log --since/--until -p`
    TimeWindow { since: String, until: Option<String> },
    /// `git diff <start>..<end>`
    Range { start: String, end: String },
    /// Resolve the range from the reflog of the remote branch
    LastPush,
}

impl DiffSource {
    /// Pick the source from the requested window and the CI context
    pub fn select(start_time: Option<&str>, end_time: Option<&str>, ci: &CiEnvironment) -> Self {
        if let Some(since) = start_time.map(str::trim).filter(|s| !s.is_empty()) {
            return Self::TimeWindow {
                since: since.to_string(),
                until: end_time
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            };
        }

        if ci.is_pull_request() {
            let base = ci.github_base_ref.as_deref().unwrap_or("HEAD~1");
            let head = ci.github_head_ref.as_deref().unwrap_or("HEAD");
            return Self::Range {
                start: format!("{}/{}", ORIGIN, base),
                end: head.to_string(),
            };
        }

        match (&ci.github_event_before, &ci.github_sha) {
            (Some(before), Some(sha)) if before != NULL_SHA => Self::Range {
                start: before.clone(),
                end: sha.clone(),
            },
            _ => Self::LastPush,
        }
    }
}

/// Text of the selected history, `None` when it is empty
pub async fn collect_diff(git: &GitClient<'_>, source: &DiffSource) -> Result<Option<String>, PublishError> {
    let text = match source {
        DiffSource::TimeWindow { since, until } => {
            let mut spec = git.git(["log", format!("--since={}", since).as_str()]);
            if let Some(until) = until {
                spec = spec.arg(format!("--until={}", until));
            }
            git.output(spec.arg("-p")).await?
        }
        DiffSource::Range { start, end } => {
            log::debug!("Diffing {}..{}", start, end);
            range_diff(git, start, end).await?
        }
        DiffSource::LastPush => {
            let start = last_push(git).await;
            range_diff(git, &start, "HEAD").await?
        }
    };

    Ok(Some(text).filter(|t| !t.is_empty()))
}

async fn range_diff(git: &GitClient<'_>, start: &str, end: &str) -> Result<String, PublishError> {
    git.output(git.git(["diff".to_string(), format!("{}..{}", start, end)]))
        .await
}

/// Commit of the last push to the remote branch, `HEAD~1` when unknown
async fn last_push(git: &GitClient<'_>) -> String {
    const FALLBACK: &str = "HEAD~1";

    fetch(git).await;

    let branch = match git.current_branch().await {
        Ok(branch) if !branch.is_empty() => format!("{}/{}", ORIGIN, branch),
        Ok(_) | Err(_) => {
            log::error!("Failed to determine the current branch, falling back to {}..HEAD", FALLBACK);
            return FALLBACK.to_string();
        }
    };

    let reflog = git
        .output(git.git(["reflog", "show", branch.as_str(), "--pretty=format:%h %gs"]))
        .await
        .unwrap_or_default();

    match last_push_from_reflog(&reflog) {
        Some(hash) => hash,
        None => {
            log::warn!(
                "No push found in the reflog of {}, falling back to {}..HEAD",
                branch,
                FALLBACK
            );
            FALLBACK.to_string()
        }
    }
}

/// Deepen shallow clones so the reflog and older commits are available
async fn fetch(git: &GitClient<'_>) {
    let shallow = git
        .output(git.git(["rev-parse", "--is-shallow-repository"]))
        .await
        .map(|out| out == "true")
        .unwrap_or(false);

    let spec = if shallow {
        log::debug!("Repository is shallow, fetching more history");
        git.git(["fetch", "--unshallow", "--no-tags", ORIGIN])
    } else {
        git.git(["fetch", "--no-tags", ORIGIN])
    };

    if let Err(e) = git.output(spec).await {
        log::warn!("Failed to fetch: {}", e);
    }
}

/// Hash of the newest "update by push" entry of `git reflog --pretty=format:"%h %gs"`
pub fn last_push_from_reflog(reflog: &str) -> Option<String> {
    reflog
        .lines()
        .find(|line| line.contains("update by push"))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}
