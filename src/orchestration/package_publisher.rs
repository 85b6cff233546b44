//! Package Publisher - Main orchestrator for npm publishing
//!
//! Runs one publish end to end:
//! - snapshot package.json and apply name/version/dependency edits
//! - registry authentication (token, OIDC or ambient)
//! - version policy (dist-tag and commit hash folded into the version)
//! - optional prepare step (npmdef sync, library build, tsc)
//! - CHECK → PUBLISH → TAG
//! - git tag, CI outputs and webhook notifications
//!
//! package.json and package-lock.json are restored on every exit path.

use crate::core::config::{CiEnvironment, DEFAULT_REGISTRY, NpmAccess, PublishConfig};
use crate::core::error::PublishError;
use crate::core::state_machine::{PublishStateMachine, StageRecord};
use crate::core::traits::{CommandRunner, Notifier};
use crate::git::{DiffSource, GitClient, GitIdentity, collect_diff, create_release_tag};
use crate::github::{CiOutput, GithubEvent};
use crate::llm::{Summarizer, SummaryKind};
use crate::notify::{MAX_MESSAGE_CHARS, send_fenced, send_masked};
use crate::npm::auth::{self, AuthMode, TroubleshootingReport};
use crate::npm::manifest::{ManifestGuard, PackageManifest};
use crate::npm::publisher::{self, NpmClient, PublishPlan};
use crate::npm::version_policy::{self, VersionInputs};
use crate::npm::{compile, unity};
use crate::security::SecureTokenManager;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::SecretString;
use std::path::PathBuf;

/// Publishing options resolved from CLI, environment and project config
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Package directory (contains package.json)
    pub directory: PathBuf,

    pub registry: String,

    pub auth: AuthMode,

    /// Dist-tag to create or update (may be a git ref like `refs/heads/x`)
    pub tag: Option<String>,

    pub access: NpmAccess,

    /// Fold the dist-tag into the version
    pub use_tag_in_version: bool,

    /// Fold the short commit hash into the version
    pub use_hash_in_version: bool,

    pub dry_run: bool,

    /// Create a git tag with this prefix after publishing
    pub git_tag_prefix: Option<String>,

    pub webhook: Option<String>,

    pub override_name: Option<String>,

    pub override_version: Option<String>,

    /// Enables the changelog summary in the success message
    pub llm_api_key: Option<SecretString>,

    /// Run update-npmdef, compile-library and tsc before publishing
    pub prepare_package: bool,

    /// Library name for the prepare step
    pub library: Option<String>,
}

impl PublishOptions {
    /// Options for `directory` from a merged [`PublishConfig`]
    pub fn from_config(directory: PathBuf, config: &PublishConfig, auth: AuthMode) -> Self {
        Self {
            directory,
            registry: config.registry_or_default(),
            auth,
            tag: config.tag.clone().filter(|t| !t.trim().is_empty()),
            access: config.access.unwrap_or_default(),
            use_tag_in_version: config.version_tag.unwrap_or(false),
            use_hash_in_version: config.version_hash.unwrap_or(false),
            dry_run: config.dry_run.unwrap_or(false),
            git_tag_prefix: config.create_tag.clone(),
            webhook: config.webhook.clone().filter(|w| !w.trim().is_empty()),
            override_name: None,
            override_version: None,
            llm_api_key: None,
            prepare_package: config.prepare_package.unwrap_or(false),
            library: None,
        }
    }

    fn token_manager(&self) -> SecureTokenManager {
        let mut tokens = SecureTokenManager::new();
        if let AuthMode::Token(token) = &self.auth {
            tokens.register(token);
        }
        if let Some(key) = &self.llm_api_key {
            tokens.register(key);
        }
        tokens
    }
}

/// Publishing report returned after a successful run
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub package_name: String,
    pub version: String,
    pub dist_tag: Option<String>,
    /// This run uploaded the version
    pub published_now: bool,
    /// The version was already on the registry
    pub already_published: bool,
    pub dry_run: bool,
    pub git_tag: Option<String>,
    pub stages: Vec<StageRecord>,
    pub build_time: DateTime<Utc>,
    pub summary: Option<String>,
}

/// Main package publisher orchestrator
pub struct PackagePublisher<'a> {
    runner: &'a dyn CommandRunner,
    notifier: &'a dyn Notifier,
    ci: &'a CiEnvironment,
    output: CiOutput,
    event: GithubEvent,
}

impl<'a> PackagePublisher<'a> {
    pub fn new(runner: &'a dyn CommandRunner, notifier: &'a dyn Notifier, ci: &'a CiEnvironment) -> Self {
        Self {
            runner,
            notifier,
            ci,
            output: CiOutput::new(ci.github_output.as_deref()),
            event: GithubEvent::new(ci.github_event_path.as_deref()),
        }
    }

    /// Publish the package in `options.directory`
    ///
    /// Failures are reported to the webhook (masked) before they are returned.
    pub async fn publish(&self, options: &PublishOptions) -> Result<PublishReport, PublishError> {
        let tokens = options.token_manager();
        let build_time = Utc::now();
        let build_time_text = build_time.to_rfc3339_opts(SecondsFormat::Millis, true);
        log::info!(
            "Publishing package from directory: {} (exists: {})",
            options.directory.display(),
            options.directory.is_dir()
        );
        log::info!("Build time: {}", build_time_text);
        self.output.set("build-time", &build_time_text);

        let mut machine = PublishStateMachine::new();
        let mut context = RunContext::default();
        let result = self.run(options, &tokens, &mut machine, &mut context).await;

        match result {
            Ok(mut report) => {
                report.build_time = build_time;
                report.stages = machine.into_records();
                Ok(report)
            }
            Err(e) => {
                if context.published.is_none() {
                    self.output.set("package-published", "false");
                }
                self.report_failure(options, &tokens, &context, &e).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        options: &PublishOptions,
        tokens: &SecureTokenManager,
        machine: &mut PublishStateMachine,
        context: &mut RunContext,
    ) -> Result<PublishReport, PublishError> {
        let dir = options.directory.as_path();

        // Preconditions, before anything is touched
        let tag = options
            .tag
            .as_deref()
            .map(version_policy::sanitize_tag)
            .transpose()?;
        let guard = ManifestGuard::acquire(dir)?;

        let mut manifest = PackageManifest::load(dir).await?;
        if let Some(name) = &options.override_name {
            log::info!("Overriding package name: {}", name);
            manifest.set_name(name);
        }
        if let Some(version) = &options.override_version {
            log::info!("Overriding package version: {}", version);
            manifest.set_version(version);
        }
        let name = manifest.require_name()?.to_string();
        let current = manifest.require_version()?.to_string();
        context.package = Some(name.clone());

        for dep in manifest.resolve_local_dependencies().await {
            log::info!("Resolved {} {}: {} → {}", dep.section, dep.name, dep.from, dep.to);
        }
        manifest.save().await?;

        auth::configure(self.runner, dir, &options.auth, &options.registry, self.ci).await?;

        // Version policy
        let git = GitClient::new(self.runner, dir);
        let hash = if options.use_hash_in_version {
            git.short_sha().await
        } else {
            None
        };
        let version = version_policy::next_version(&VersionInputs {
            current: &current,
            hash: hash.as_deref(),
            tag: tag.as_deref(),
            use_tag_in_version: options.use_tag_in_version,
            use_hash_in_version: options.use_hash_in_version,
        });
        version_policy::validate_version(&version)?;
        let npm = NpmClient::new(self.runner, dir, &options.registry, &options.auth);
        if version != current {
            log::info!("Updating version {} → {}", current, version);
            npm.set_version(&version).await?;
        }
        context.version = Some(version.clone());

        if options.prepare_package {
            prepare_publish(self.runner, dir, options.library.as_deref()).await?;
        }

        self.notify_start(options, tokens, &name, &version, tag.as_deref())
            .await;

        let plan = PublishPlan {
            name: name.clone(),
            version: version.clone(),
            tag,
            access: options.access,
            provenance: options.auth.is_oidc() && self.ci.is_public_repository(),
            dry_run: options.dry_run,
        };
        let outcome = publisher::execute(&npm, &plan, machine).await?;
        context.published = Some(outcome.published_now);

        self.output.set("package-name", &name);
        self.output.set("package-version", &version);
        self.output
            .set("package-published", &outcome.published_now.to_string());

        let git_tag = match &options.git_tag_prefix {
            Some(_) if options.dry_run => {
                log::info!("Dry run, not creating a git tag");
                None
            }
            Some(prefix) => {
                let identity = GitIdentity::from_ci(self.ci);
                let report = create_release_tag(&git, prefix, &version, &identity).await?;
                Some(report.tag)
            }
            None => None,
        };

        guard.restore()?;

        let summary = match &options.llm_api_key {
            Some(key) if outcome.published_now => self.summarize_changes(&git, key).await,
            _ => None,
        };

        let report = PublishReport {
            package_name: name,
            version,
            dist_tag: outcome.dist_tag,
            published_now: outcome.published_now,
            already_published: outcome.already_published,
            dry_run: options.dry_run,
            git_tag,
            stages: Vec::new(),
            build_time: Utc::now(),
            summary,
        };
        self.notify_success(options, tokens, &report).await;
        Ok(report)
    }

    async fn notify_start(
        &self,
        options: &PublishOptions,
        tokens: &SecureTokenManager,
        name: &str,
        version: &str,
        tag: Option<&str>,
    ) {
        let mut message = format!("📦 Publishing **{}@{}**", name, version);
        if let Some(tag) = tag {
            message.push_str(&format!(" with tag `{}`", tag));
        }
        if options.dry_run {
            message.push_str(" (dry run)");
        }
        if let Some(commit) = self.event.head_commit_message().await {
            message.push_str(&format!("\n> {}", commit.lines().next().unwrap_or_default()));
        }
        if let Some(url) = self.event.html_url().await {
            message.push_str(&format!("\n{}", url));
        }
        send_masked(self.notifier, tokens, &message).await;
    }

    async fn notify_success(&self, options: &PublishOptions, tokens: &SecureTokenManager, report: &PublishReport) {
        let spec = format!("{}@{}", report.package_name, report.version);
        let mut message = if report.dry_run {
            format!("🧪 Dry run finished for **{}**", spec)
        } else if report.published_now {
            format!("✅ Published **{}**", spec)
        } else {
            format!("ℹ️ **{}** was already published", spec)
        };
        if let Some(tag) = &report.dist_tag {
            message.push_str(&format!(" (tag `{}`)", tag));
        }
        if report.published_now && options.registry == DEFAULT_REGISTRY {
            message.push_str(&format!(
                "\nhttps://www.npmjs.com/package/{}/v/{}",
                report.package_name, report.version
            ));
        }
        if let Some(tag) = &report.git_tag {
            message.push_str(&format!("\nGit tag: `{}`", tag));
        }
        if let Some(summary) = &report.summary {
            message.push_str("\n\n");
            message.push_str(summary);
        }

        if message.chars().count() > MAX_MESSAGE_CHARS {
            let (head, body) = message.split_once("\n\n").unwrap_or((message.as_str(), ""));
            send_masked(self.notifier, tokens, head).await;
            send_fenced(self.notifier, tokens, body).await;
        } else {
            send_masked(self.notifier, tokens, &message).await;
        }
    }

    async fn report_failure(
        &self,
        options: &PublishOptions,
        tokens: &SecureTokenManager,
        context: &RunContext,
        error: &PublishError,
    ) {
        let target = match (&context.package, &context.version) {
            (Some(name), Some(version)) => format!("{}@{}", name, version),
            (Some(name), None) => name.clone(),
            _ => options.directory.display().to_string(),
        };
        if context.published.is_some() {
            log::error!(
                "{} is on the registry, but a later step failed: {}",
                target,
                tokens.mask_tokens_in_string(&error.to_string())
            );
            let message = match error {
                PublishError::GitTagFailed { .. } => {
                    format!("⚠️ **{}** is on the registry, but the git tag failed: {}", target, error)
                }
                _ => format!("⚠️ **{}** is on the registry, but a later step failed: {}", target, error),
            };
            send_masked(self.notifier, tokens, &message).await;
            return;
        }

        log::error!("Publishing {} failed: {}", target, tokens.mask_tokens_in_string(&error.to_string()));
        let mut message = format!("❌ Publishing **{}** failed: {}", target, error);
        if error.is_precondition() {
            message.push_str("\nNothing was changed.");
        }
        send_masked(self.notifier, tokens, &message).await;

        if let PublishError::PublishFailed { package, output, .. } = error {
            send_fenced(self.notifier, tokens, output).await;

            let troubleshooting = TroubleshootingReport::new(output, &options.auth, package, &options.registry);
            if !troubleshooting.is_empty() {
                for line in &troubleshooting.lines {
                    log::error!("{}", line);
                }
                send_masked(
                    self.notifier,
                    tokens,
                    &format!("Troubleshooting ({} auth):\n{}", options.auth, troubleshooting),
                )
                .await;
            }
        }
    }

    /// Changelog of the pushed changes; failures only log
    async fn summarize_changes(&self, git: &GitClient<'_>, key: &SecretString) -> Option<String> {
        let source = DiffSource::select(None, None, self.ci);
        let diff = match collect_diff(git, &source).await {
            Ok(Some(diff)) => diff,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Could not collect changes for the summary: {}", e);
                return None;
            }
        };
        let summarizer = match Summarizer::new(Some(key)) {
            Ok(summarizer) => summarizer,
            Err(e) => {
                log::warn!("LLM summary disabled: {}", e);
                return None;
            }
        };
        match summarizer.summarize(&SummaryKind::Changelog, &diff).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::warn!("LLM summary failed: {}", e);
                None
            }
        }
    }
}

/// What the failure message can say about the run so far
#[derive(Debug, Default)]
struct RunContext {
    package: Option<String>,
    version: Option<String>,
    /// Set once the registry stages finished; `Some(published_now)`
    published: Option<bool>,
}

/// `prepare-publish`: sync npmdef files, build the library, compile TypeScript
pub async fn prepare_publish(
    runner: &dyn CommandRunner,
    dir: &std::path::Path,
    library: Option<&str>,
) -> Result<(), PublishError> {
    unity::update_npmdef(dir).await?;
    compile::compile_library(runner, dir, library).await?;
    compile::compile_typescript(runner, dir).await
}
