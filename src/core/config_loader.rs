//! Configuration file loader for npm-publish-helper
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::PublishError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration file name, looked up in the package directory
pub const CONFIG_FILENAME: &str = ".publish-config.yaml";

lazy_static! {
    /// Environment variable pattern (${VAR_NAME})
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Package directory to load the project config from
    pub project_path: PathBuf,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PublishConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "registry")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (<package>/.publish-config.yaml)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublishConfig, PublishError> {
        let mut configs: Vec<PublishConfig> = vec![PublishConfig::default()];

        if let Some(project_config) = Self::load_config_file(&options.project_path).await? {
            log::debug!(
                "Loaded {}",
                options.project_path.join(CONFIG_FILENAME).display()
            );
            configs.push(project_config);
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);
        Ok(Self::expand_env_vars(merged, &options.env))
    }

    /// Load configuration from the project YAML file
    async fn load_config_file(project_path: &Path) -> Result<Option<PublishConfig>, PublishError> {
        let file_path = project_path.join(CONFIG_FILENAME);
        if !file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&file_path).await.map_err(|e| {
            PublishError::Config(format!("Failed to read {}: {}", file_path.display(), e))
        })?;

        let config: PublishConfig = serde_yaml::from_str(&content).map_err(|e| {
            PublishError::Config(format!("Failed to parse {}: {}", file_path.display(), e))
        })?;

        Ok(Some(config))
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<PublishConfig> {
        let get = |name: &str| env.get(name).filter(|v| !v.trim().is_empty()).cloned();
        let flag = |name: &str| get(name).map(|v| v == "true" || v == "1");

        let config = PublishConfig {
            registry: get("PUBLISH_REGISTRY"),
            tag: get("PUBLISH_TAG"),
            webhook: get("PUBLISH_WEBHOOK"),
            dry_run: flag("PUBLISH_DRY_RUN"),
            ..Default::default()
        };

        if config == PublishConfig::default() {
            None
        } else {
            Some(config)
        }
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<PublishConfig>) -> PublishConfig {
        let mut result = PublishConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut PublishConfig, source: PublishConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if source.$field.is_some() {
                    target.$field = source.$field;
                })*
            };
        }

        take!(
            registry,
            tag,
            access,
            version_hash,
            version_tag,
            create_tag,
            webhook,
            oidc,
            dry_run,
            prepare_package
        );
    }

    /// Expand ${VAR} references in string fields that commonly hold secrets
    fn expand_env_vars(mut config: PublishConfig, env: &HashMap<String, String>) -> PublishConfig {
        if let Some(webhook) = &config.webhook {
            config.webhook = Some(Self::expand_string(webhook, env));
        }
        if let Some(registry) = &config.registry {
            config.registry = Some(Self::expand_string(registry, env));
        }
        config
    }

    /// Expand environment variables in a single string
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_PATTERN
            .replace_all(input, |cap: &regex::Captures| {
                let var_name = &cap[1];
                match env.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        log::warn!("Environment variable {} not found", var_name);
                        String::new()
                    }
                }
            })
            .to_string()
    }

    /// Validate configuration
    pub fn validate(config: &PublishConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let registry = config.registry_or_default();
        if !(registry.starts_with("https://") || registry.starts_with("http://")) {
            errors.push(ConfigValidationError {
                field: "registry".to_string(),
                message: format!("Registry must be an http(s) URL, got '{}'", registry),
            });
        }

        if let Some(tag) = &config.tag
            && crate::npm::version_policy::sanitize_tag(tag).is_err()
        {
            errors.push(ConfigValidationError {
                field: "tag".to_string(),
                message: format!("Tag '{}' has no non-empty path segment", tag),
            });
        }

        if let Some(webhook) = &config.webhook
            && crate::notify::WebhookProvider::detect(webhook).is_none()
        {
            warnings.push(ConfigValidationWarning {
                field: "webhook".to_string(),
                message: "Webhook URL does not belong to a supported provider".to_string(),
                suggestion: Some("Use a Discord, Slack or Microsoft Teams webhook URL".to_string()),
            });
        }

        if config.version_tag == Some(true) && config.tag.is_none() {
            warnings.push(ConfigValidationWarning {
                field: "versionTag".to_string(),
                message: "versionTag is set but no tag is configured".to_string(),
                suggestion: Some("Pass --tag <name>".to_string()),
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}
