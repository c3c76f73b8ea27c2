use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use crate::storage::schema::is_plain_identifier;
use regex::Regex;
use reqwest::Url;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML in '{}': {source}", path.display())]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Load, expand and validate a config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = parse_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load and expand a config file without validating it, so command line
/// overrides can fill in missing values first.
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let yaml_string = expand_env_vars(&yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|source| ConfigError::YamlParse {
        path: path.to_path_buf(),
        source,
    })?;

    expand_paths(&mut config);

    Ok(config)
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut unexpanded_vars: Vec<&str> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         \n\
         Either export them or replace the $env{{...}} references in the config file",
        unexpanded_vars.join(", ")
    )))
}

/// Expands tilde (~) in all path fields in the config.
pub fn expand_paths(config: &mut Config) {
    if let Some(token_file) = config.api.token_file.as_mut() {
        *token_file = expand_tilde(token_file);
    }
    if let Some(users_file) = config.sync.users_file.as_mut() {
        *users_file = expand_tilde(users_file);
    }
    config.storage.path = expand_tilde(&config.storage.path);
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.api.base_url.trim().is_empty() {
        errors.push("api.base_url is required (or pass --srv)".to_string());
    } else {
        match Url::parse(&config.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!(
                "api.base_url: unsupported scheme '{}', expected http or https",
                url.scheme()
            )),
            Err(e) => errors.push(format!("api.base_url '{}': {}", config.api.base_url, e)),
        }
    }

    if config.api.token_file.is_none() {
        errors.push("api.token_file is required (or pass --auth)".to_string());
    }

    if config.api.per_page == 0 {
        errors.push("api.per_page must be at least 1".to_string());
    }

    if config.sync.max_workers == 0 {
        errors.push("sync.max_workers must be at least 1".to_string());
    }

    if config.sync.progress_buffer == 0 {
        errors.push("sync.progress_buffer must be at least 1".to_string());
    }

    if config.sync.worker_threads == Some(0) {
        errors.push("sync.worker_threads must be at least 1 when set".to_string());
    }

    if config.sync.users_file.is_none() && config.sync.users.is_empty() {
        errors.push("no users configured: set sync.users_file or sync.users (or pass --users/--user)".to_string());
    }

    if !is_plain_identifier(&config.storage.table) {
        errors.push(format!(
            "storage.table '{}' must be a plain identifier (letters, digits, underscore)",
            config.storage.table
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
