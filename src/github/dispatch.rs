//! `workflow_dispatch` trigger through the GitHub REST API

use crate::core::error::PublishError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// One workflow run request
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// `owner/repo`
    pub repository: String,
    /// Workflow file name or id
    pub workflow: String,
    pub git_ref: String,
    pub inputs: Value,
}

impl DispatchRequest {
    /// `inputs` must be a JSON object when given
    pub fn new(
        repository: &str,
        workflow: &str,
        git_ref: Option<&str>,
        inputs: Option<&str>,
    ) -> Result<Self, PublishError> {
        if repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(PublishError::Config(format!(
                "repository must be <owner>/<repo>, got '{}'",
                repository
            )));
        }
        let inputs = match inputs.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => match serde_json::from_str::<Value>(text)? {
                value @ Value::Object(_) => value,
                _ => {
                    return Err(PublishError::Config(
                        "workflow inputs must be a JSON object".to_string(),
                    ));
                }
            },
            None => json!({}),
        };

        Ok(Self {
            repository: repository.to_string(),
            workflow: workflow.to_string(),
            git_ref: git_ref.unwrap_or("main").to_string(),
            inputs,
        })
    }

    fn url(&self, api: &str) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            api.trim_end_matches('/'),
            self.repository,
            self.workflow
        )
    }
}

/// POST the dispatch; any non-2xx answer is an error
pub async fn dispatch_workflow(
    api: &str,
    token: &SecretString,
    request: &DispatchRequest,
) -> Result<(), PublishError> {
    let url = request.url(api);
    log::info!(
        "Triggering workflow {} on {}@{}",
        request.workflow,
        request.repository,
        request.git_ref
    );

    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(token.expose_secret())
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .header("User-Agent", concat!("npm-publish-helper/", env!("CARGO_PKG_VERSION")))
        .json(&json!({ "ref": request.git_ref, "inputs": request.inputs }))
        .send()
        .await
        .map_err(|e| PublishError::DispatchFailed {
            status: 0,
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PublishError::DispatchFailed {
            status: status.as_u16(),
            message: body,
        });
    }

    Ok(())
}
