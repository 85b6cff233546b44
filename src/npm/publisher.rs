//! npm client and the CHECK → PUBLISH → TAG executor
//!
//! CHECK asks the registry whether `name@version` exists. PUBLISH runs only
//! when it does not; a concurrent run that won the race is detected from
//! npm's output and counted as published. TAG points the requested dist-tag
//! at the version when the publish step did not already do it.

use super::auth::AuthMode;
use super::version_policy::auto_dist_tag;
use crate::core::config::NpmAccess;
use crate::core::error::PublishError;
use crate::core::state_machine::{PublishStage, PublishStateMachine};
use crate::core::traits::{CommandRunner, CommandSpec, ExecResult};
use aho_corasick::AhoCorasick;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};

lazy_static! {
    /// npm output of a publish that lost the race against an identical one
    static ref BENIGN_PUBLISH_RACE: AhoCorasick = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "cannot publish over previously published version",
            "cannot publish over the previously published version",
            "failed to save packument",
        ])
        .unwrap();
}

/// Whether a failed publish means the version is already there
pub fn is_benign_publish_race(output: &str) -> bool {
    BENIGN_PUBLISH_RACE.is_match(output)
}

/// Thin wrapper around the npm CLI for one package directory
pub struct NpmClient<'a> {
    runner: &'a dyn CommandRunner,
    dir: PathBuf,
    registry: String,
    env_remove: &'static [&'static str],
}

impl<'a> NpmClient<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dir: &Path, registry: &str, auth: &AuthMode) -> Self {
        Self {
            runner,
            dir: dir.to_path_buf(),
            registry: registry.to_string(),
            env_remove: auth.env_removals(),
        }
    }

    fn npm(&self) -> CommandSpec {
        CommandSpec::new("npm", &self.dir).env_remove(self.env_remove.iter().copied())
    }

    async fn exec(&self, spec: CommandSpec) -> Result<ExecResult, PublishError> {
        self.runner
            .run(&spec)
            .await
            .map_err(|e| PublishError::CommandFailed {
                command: spec.to_string(),
                message: e.to_string(),
            })
    }

    /// Version reported by the registry for `name@version`, if any
    pub async fn view_version(&self, name: &str, version: &str) -> Result<Option<String>, PublishError> {
        let spec = self.npm().args([
            "view",
            format!("{}@{}", name, version).as_str(),
            "version",
            "--registry",
            self.registry.as_str(),
        ]);
        let result = self.exec(spec).await?;
        if !result.is_success() {
            log::debug!("npm view failed, treating {}@{} as unpublished", name, version);
            return Ok(None);
        }
        Ok(Some(result.stdout().to_string()).filter(|v| !v.is_empty()))
    }

    /// Write `version` into package.json without touching git
    pub async fn set_version(&self, version: &str) -> Result<(), PublishError> {
        let spec = self
            .npm()
            .args(["version", version, "--no-git-tag-version", "--allow-same-version"]);
        let shown = spec.to_string();
        let result = self.exec(spec).await?;
        if !result.is_success() {
            return Err(PublishError::CommandFailed {
                command: shown,
                message: result.combined_output(),
            });
        }
        Ok(())
    }

    /// Run `npm publish`; a non-zero exit is returned, not raised
    pub async fn publish(&self, request: &PublishRequest) -> Result<ExecResult, PublishError> {
        let mut spec = self
            .npm()
            .args(["publish", "--access", request.access.as_str()])
            .args(["--registry", self.registry.as_str()]);
        if let Some(tag) = &request.dist_tag {
            spec = spec.args(["--tag", tag.as_str()]);
        }
        if request.provenance {
            spec = spec.arg("--provenance");
        }
        if request.dry_run {
            spec = spec.arg("--dry-run");
        }
        log::info!("{}", spec);
        self.exec(spec).await
    }

    /// Point `tag` at `name@version`
    pub async fn add_dist_tag(&self, name: &str, version: &str, tag: &str) -> Result<(), PublishError> {
        let spec = self.npm().args([
            "dist-tag",
            "add",
            format!("{}@{}", name, version).as_str(),
            tag,
            "--registry",
            self.registry.as_str(),
        ]);
        let shown = spec.to_string();
        let result = self.exec(spec).await?;
        if !result.is_success() {
            return Err(PublishError::CommandFailed {
                command: shown,
                message: result.combined_output(),
            });
        }
        Ok(())
    }
}

/// Arguments of one `npm publish` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub access: NpmAccess,
    pub dist_tag: Option<String>,
    pub provenance: bool,
    pub dry_run: bool,
}

/// What the pipeline wants published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub name: String,
    pub version: String,
    /// Explicitly requested dist-tag, already sanitized
    pub tag: Option<String>,
    pub access: NpmAccess,
    pub provenance: bool,
    pub dry_run: bool,
}

/// Result of the three stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Dist-tag passed to `npm publish`, requested or automatic
    pub dist_tag: Option<String>,
    /// This run uploaded the version
    pub published_now: bool,
    /// The version existed before this run finished publishing
    pub already_published: bool,
}

/// Run CHECK → PUBLISH → TAG for `plan`, recording each stage in `machine`
pub async fn execute(
    client: &NpmClient<'_>,
    plan: &PublishPlan,
    machine: &mut PublishStateMachine,
) -> Result<PublishOutcome, PublishError> {
    let mut outcome = PublishOutcome::default();
    let spec = format!("{}@{}", plan.name, plan.version);

    // CHECK
    let registry_version = client.view_version(&plan.name, &plan.version).await?;
    let exists = registry_version.as_deref() == Some(plan.version.as_str());
    stage(machine.complete(
        PublishStage::Check,
        if exists {
            format!("{} is already published", spec)
        } else {
            format!("{} is not published yet", spec)
        },
    ))?;

    // PUBLISH
    if exists {
        outcome.already_published = true;
        stage(machine.skip(PublishStage::Publish, "version already published"))?;
    } else {
        let dist_tag = plan.tag.clone().or_else(|| auto_dist_tag(&plan.version));
        let request = PublishRequest {
            access: plan.access,
            dist_tag: dist_tag.clone(),
            provenance: plan.provenance,
            dry_run: plan.dry_run,
        };
        outcome.dist_tag = dist_tag;

        let result = client.publish(&request).await?;
        if result.is_success() {
            outcome.published_now = !plan.dry_run;
            let detail = if plan.dry_run {
                format!("{} (dry run)", spec)
            } else {
                format!("published {}", spec)
            };
            stage(machine.complete(PublishStage::Publish, detail))?;
        } else {
            let output = result.combined_output();
            if is_benign_publish_race(&output) {
                log::warn!("{} was published concurrently, continuing", spec);
                outcome.already_published = true;
                stage(machine.complete(PublishStage::Publish, "already published by another run"))?;
            } else {
                let message = failure_summary(&output);
                stage(machine.fail(PublishStage::Publish, message.clone()))?;
                return Err(PublishError::PublishFailed {
                    package: plan.name.clone(),
                    message,
                    output,
                });
            }
        }
    }

    // TAG
    match &plan.tag {
        _ if plan.dry_run => stage(machine.skip(PublishStage::Tag, "dry run"))?,
        None => stage(machine.skip(PublishStage::Tag, "no tag requested"))?,
        Some(tag) if outcome.published_now => {
            stage(machine.skip(PublishStage::Tag, format!("'{}' applied by publish", tag)))?
        }
        Some(tag) => {
            if let Err(e) = client.add_dist_tag(&plan.name, &plan.version, tag).await {
                stage(machine.fail(PublishStage::Tag, e.to_string()))?;
                return Err(e);
            }
            outcome.dist_tag = Some(tag.clone());
            stage(machine.complete(PublishStage::Tag, format!("{} → {}", tag, spec)))?;
        }
    }

    Ok(outcome)
}

fn stage(result: Result<(), crate::core::state_machine::StateError>) -> Result<(), PublishError> {
    result.map_err(|e| PublishError::Config(e.to_string()))
}

/// First npm error line of a failed command, or its first line
pub fn failure_summary(output: &str) -> String {
    let lines = || output.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines()
        .find(|l| l.contains(" code ") || l.starts_with("npm ERR! code") || l.starts_with("npm error code"))
        .or_else(|| lines().next())
        .unwrap_or("no output");
    line.chars().take(200).collect()
}
