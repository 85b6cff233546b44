//! Workflow event payload (`GITHUB_EVENT_PATH`)

use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

/// Lazily loaded event payload; read at most once per run
#[derive(Debug, Default)]
pub struct GithubEvent {
    path: Option<PathBuf>,
    payload: OnceCell<Option<Value>>,
}

impl GithubEvent {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            payload: OnceCell::new(),
        }
    }

    /// Parsed payload; load failures are logged and yield `None`
    pub async fn payload(&self) -> Option<&Value> {
        self.payload
            .get_or_init(|| async {
                let path = self.path.as_ref()?;
                log::debug!("Loading GitHub event data from {}", path.display());
                let content = match tokio::fs::read_to_string(path).await {
                    Ok(content) => content,
                    Err(e) => {
                        log::error!("Failed to read GitHub event data from {}: {}", path.display(), e);
                        return None;
                    }
                };
                match serde_json::from_str(&content) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        log::error!("Failed to parse GitHub event data from {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Message of the pushed head commit
    pub async fn head_commit_message(&self) -> Option<String> {
        self.payload()
            .await?
            .pointer("/head_commit/message")
            .and_then(Value::as_str)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }

    /// Web URL of the head commit (push events) or pull request
    pub async fn html_url(&self) -> Option<String> {
        let payload = self.payload().await?;
        ["/head_commit/url", "/pull_request/html_url", "/compare"]
            .iter()
            .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_head_commit_message() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(
            &path,
            r#"{"head_commit": {"message": "Fix build\n", "url": "https://github.com/o/r/commit/abc"}}"#,
        )
        .unwrap();

        let event = GithubEvent::new(Some(&path));
        assert_eq!(event.head_commit_message().await.as_deref(), Some("Fix build"));
        assert_eq!(
            event.html_url().await.as_deref(),
            Some("https://github.com/o/r/commit/abc")
        );
    }

    #[tokio::test]
    async fn test_loaded_only_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{"head_commit": {"message": "first"}}"#).unwrap();

        let event = GithubEvent::new(Some(&path));
        assert_eq!(event.head_commit_message().await.as_deref(), Some("first"));

        std::fs::write(&path, r#"{"head_commit": {"message": "second"}}"#).unwrap();
        assert_eq!(event.head_commit_message().await.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_payload() {
        assert!(GithubEvent::new(None).payload().await.is_none());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(GithubEvent::new(Some(&path)).payload().await.is_none());
        assert!(GithubEvent::new(Some(&dir.path().join("missing.json"))).head_commit_message().await.is_none());
    }
}
