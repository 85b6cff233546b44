//! npm-publish-helper CLI
//!
//! Publishes npm packages from CI pipelines

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use npm_publish_helper::core::traits::Notifier;
use npm_publish_helper::github::{DispatchRequest, GITHUB_API_URL, dispatch_workflow};
use npm_publish_helper::notify::{notifier_for, send_masked};
use npm_publish_helper::npm::auth::AuthMode;
use npm_publish_helper::npm::{compile, unity};
use npm_publish_helper::orchestration::{DiffOptions, prepare_publish, report_diff};
use npm_publish_helper::{
    CiEnvironment, ConfigLoadOptions, ConfigLoader, NpmAccess, PackagePublisher, PublishConfig,
    PublishError, PublishOptions, SafeCommandExecutor, SecureTokenManager,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;

/// Publish npm packages from CI
#[derive(Parser)]
#[command(name = "npm-publish-helper")]
#[command(version)]
#[command(about = "Publish npm packages from CI pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the package in a directory
    Publish(PublishArgs),

    /// Build the package as a library with vite
    CompileLibrary {
        #[arg(value_name = "DIRECTORY")]
        directory: Option<PathBuf>,

        /// Library name (defaults to the last segment of the package name)
        #[arg(long)]
        library: Option<String>,
    },

    /// Sync version and name into unity/package.json and unity/*.npmdef
    UpdateNpmdef {
        #[arg(value_name = "DIRECTORY")]
        directory: Option<PathBuf>,
    },

    /// update-npmdef, compile-library and tsc
    PreparePublish {
        #[arg(value_name = "DIRECTORY")]
        directory: Option<PathBuf>,

        #[arg(long)]
        library: Option<String>,
    },

    /// Send one message to a webhook
    SendWebhookMessage {
        url: String,
        message: String,
    },

    /// Trigger a workflow_dispatch run
    RepositoryDispatch {
        /// GitHub token with actions: write
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        access_token: String,

        /// owner/repo (defaults to GITHUB_REPOSITORY)
        #[arg(long)]
        repository: Option<String>,

        /// Workflow file name or id
        #[arg(long)]
        workflow: String,

        #[arg(long = "ref", default_value = "main")]
        git_ref: String,

        /// Workflow inputs as a JSON object
        #[arg(long)]
        inputs: Option<String>,

        #[arg(long)]
        webhook: Option<String>,
    },

    /// Report the changes since the last push or in a time window
    Diff {
        #[arg(long)]
        directory: Option<PathBuf>,

        /// `git log --since` value
        #[arg(long)]
        start_time: Option<String>,

        /// `git log --until` value
        #[arg(long)]
        end_time: Option<String>,

        #[arg(long)]
        llm_api_key: Option<String>,

        #[arg(long)]
        webhook: Option<String>,
    },
}

/// Flags of `publish`
#[derive(Args, Debug)]
struct PublishArgs {
    /// Package directory (defaults to current directory)
    #[arg(value_name = "DIRECTORY")]
    directory: Option<PathBuf>,

    /// Registry URL
    #[arg(long)]
    registry: Option<String>,

    /// Dist-tag; git refs reduce to their last segment
    #[arg(long)]
    tag: Option<String>,

    /// Append the short commit hash to the version
    #[arg(long, alias = "version+hash")]
    version_hash: bool,

    /// Put the dist-tag into the version
    #[arg(long, alias = "version+tag")]
    version_tag: bool,

    /// Create and push a git tag, optionally with a prefix
    #[arg(long, value_name = "PREFIX", num_args = 0..=1, default_missing_value = "")]
    create_tag: Option<String>,

    /// Discord, Slack or Teams webhook URL
    #[arg(long)]
    webhook: Option<String>,

    /// npm access token
    #[arg(long, env = "NPM_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Use OIDC trusted publishing instead of a token
    #[arg(long)]
    oidc: bool,

    /// Run npm publish with --dry-run
    #[arg(long)]
    dry_run: bool,

    /// Publish under another package name
    #[arg(long)]
    override_name: Option<String>,

    /// Publish with another base version
    #[arg(long)]
    override_version: Option<String>,

    /// Key for the changelog summary (Anthropic, OpenRouter or DeepSeek)
    #[arg(long)]
    llm_api_key: Option<String>,

    /// Run prepare-publish before publishing
    #[arg(long)]
    prepare_package: bool,

    /// Library name for the build step
    #[arg(long)]
    library: Option<String>,

    /// Access level (public|restricted)
    #[arg(long, value_parser = ["public", "restricted"])]
    access: Option<String>,
}

impl PublishArgs {
    fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Flags as the highest-priority config layer; unset switches stay `None`
    fn to_config(&self) -> PublishConfig {
        PublishConfig {
            registry: self.registry.clone(),
            tag: self.tag.clone(),
            access: self.access.as_deref().map(parse_access),
            version_hash: self.version_hash.then_some(true),
            version_tag: self.version_tag.then_some(true),
            create_tag: self.create_tag.clone(),
            webhook: self.webhook.clone(),
            oidc: self.oidc.then_some(true),
            dry_run: self.dry_run.then_some(true),
            prepare_package: self.prepare_package.then_some(true),
        }
    }

    /// Resolve the final options from the merged config
    fn into_options(self, config: &PublishConfig, ci: &CiEnvironment) -> PublishOptions {
        let directory = self.directory();
        let auth = AuthMode::select(self.access_token.map(secret), config.oidc.unwrap_or(false));
        let mut options = PublishOptions::from_config(directory, config, auth);
        options.override_name = self.override_name;
        options.override_version = self.override_version;
        options.llm_api_key = self.llm_api_key.map(secret).or_else(|| ci.llm_api_key.clone());
        options.library = self.library;
        options
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{}", e);
            if let Some(publish_error) = e.downcast_ref::<PublishError>() {
                eprintln!("\nError code: {}", publish_error.code());
                eprintln!("Suggested actions:");
                for action in publish_error.suggested_actions() {
                    eprintln!("  - {}", action);
                }
            }
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let env: HashMap<String, String> = std::env::vars().collect();
    let ci = CiEnvironment::from_map(&env);
    log::debug!("{:?}", ci);

    match cli.command {
        Commands::Publish(args) => {
            let config = ConfigLoader::load(ConfigLoadOptions {
                project_path: args.directory(),
                cli_args: Some(args.to_config()),
                env,
            })
            .await?;
            check_config(&config)?;

            let options = args.into_options(&config, &ci);
            publish_command(&ci, options).await
        }
        Commands::CompileLibrary { directory, library } => {
            let directory = directory.unwrap_or_else(|| PathBuf::from("."));
            compile::compile_library(&SafeCommandExecutor::new(), &directory, library.as_deref()).await?;
            println!("✅ Library built");
            Ok(0)
        }
        Commands::UpdateNpmdef { directory } => {
            let directory = directory.unwrap_or_else(|| PathBuf::from("."));
            let update = unity::update_npmdef(&directory).await?;
            if let Some(path) = &update.package_json {
                println!("Updated {}", path.display());
            }
            for path in &update.npmdefs {
                println!("Updated {}", path.display());
            }
            Ok(0)
        }
        Commands::PreparePublish { directory, library } => {
            let directory = directory.unwrap_or_else(|| PathBuf::from("."));
            prepare_publish(&SafeCommandExecutor::new(), &directory, library.as_deref()).await?;
            println!("✅ Package prepared");
            Ok(0)
        }
        Commands::SendWebhookMessage { url, message } => {
            let report = notifier_for(Some(url.as_str())).send(&message).await;
            if report.is_success() {
                Ok(0)
            } else {
                eprintln!("❌ {}", report);
                Ok(1)
            }
        }
        Commands::RepositoryDispatch {
            access_token,
            repository,
            workflow,
            git_ref,
            inputs,
            webhook,
        } => {
            let Some(repository) = repository.or_else(|| ci.github_repository.clone()) else {
                bail!("--repository is required outside GitHub Actions");
            };
            let token = secret(access_token);
            let request = DispatchRequest::new(&repository, &workflow, Some(&git_ref), inputs.as_deref())?;
            let notifier = notifier_for(webhook.as_deref());
            dispatch_command(notifier.as_ref(), &token, &request).await
        }
        Commands::Diff {
            directory,
            start_time,
            end_time,
            llm_api_key,
            webhook,
        } => {
            let options = DiffOptions {
                directory: directory.unwrap_or_else(|| PathBuf::from(".")),
                start_time,
                end_time,
                llm_api_key: llm_api_key.map(secret).or_else(|| ci.llm_api_key.clone()),
            };
            let notifier = notifier_for(webhook.as_deref());
            match report_diff(&SafeCommandExecutor::new(), notifier.as_ref(), &ci, &options).await? {
                Some(report) => println!("{}", report.text),
                None => println!("No changes"),
            }
            Ok(0)
        }
    }
}

async fn publish_command(ci: &CiEnvironment, options: PublishOptions) -> Result<i32> {
    println!("\n📦 npm-publish-helper\n");

    let runner = SafeCommandExecutor::new();
    let notifier = notifier_for(options.webhook.as_deref());
    let publisher = PackagePublisher::new(&runner, notifier.as_ref(), ci);

    let report = publisher.publish(&options).await?;

    for record in &report.stages {
        println!("  {:?}: {:?}", record.stage, record.outcome);
    }
    let spec = format!("{}@{}", report.package_name, report.version);
    if report.dry_run {
        println!("\n✅ Dry run completed for {}", spec);
    } else if report.published_now {
        println!("\n✅ Published {}", spec);
    } else {
        println!("\nℹ️  {} was already published", spec);
    }
    if let Some(tag) = &report.dist_tag {
        println!("   dist-tag: {}", tag);
    }
    if let Some(tag) = &report.git_tag {
        println!("   git tag: {}", tag);
    }
    Ok(0)
}

async fn dispatch_command(
    notifier: &dyn Notifier,
    token: &SecretString,
    request: &DispatchRequest,
) -> Result<i32> {
    let mut tokens = SecureTokenManager::new();
    tokens.register(token);
    let target = format!("{} on {}@{}", request.workflow, request.repository, request.git_ref);

    match dispatch_workflow(GITHUB_API_URL, token, request).await {
        Ok(()) => {
            println!("✅ Triggered {}", target);
            send_masked(notifier, &tokens, &format!("🚀 Triggered workflow {}", target)).await;
            Ok(0)
        }
        Err(e) => {
            send_masked(notifier, &tokens, &format!("❌ Failed to trigger workflow {}: {}", target, e)).await;
            Err(e.into())
        }
    }
}

fn check_config(config: &PublishConfig) -> Result<()> {
    let validation = ConfigLoader::validate(config);
    for warning in &validation.warnings {
        log::warn!("{}: {}", warning.field, warning.message);
        if let Some(suggestion) = &warning.suggestion {
            log::warn!("  {}", suggestion);
        }
    }
    if !validation.valid {
        let message = validation
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PublishError::Config(message).into());
    }
    Ok(())
}

fn parse_access(value: &str) -> NpmAccess {
    match value {
        "restricted" => NpmAccess::Restricted,
        _ => NpmAccess::Public,
    }
}

fn secret(value: String) -> SecretString {
    SecretString::new(value.into())
}
