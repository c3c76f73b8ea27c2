use crate::api::{CanvasClient, FetchError};
use crate::config::parse::expand_paths;
use crate::config::{parse_config, validate_config, Config, ConfigError};
use crate::storage::duckdb::DuckDbStorage;
use crate::storage::{Storage, StorageError};
use crate::sync::{Scheduler, SchedulerConfig, SyncReport};
use clap::Args;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API client error: {0}")]
    Client(#[from] FetchError),

    #[error("failed to read {what} '{}': {source}", path.display())]
    ReadFile {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token file '{}' is empty", .0.display())]
    EmptyToken(PathBuf),

    #[error("no user ids to sync")]
    NoUsers,

    #[error("{failed} of {total} users failed to sync")]
    UsersFailed { failed: usize, total: usize },
}

/// Command line settings that take precedence over the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// File containing the API bearer token
    #[arg(long, global = true, value_name = "FILE")]
    pub auth: Option<PathBuf>,

    /// Canvas base URL or host name
    #[arg(long, global = true, value_name = "URL")]
    pub srv: Option<String>,

    /// File of comma separated user ids
    #[arg(long = "users", global = true, value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    /// Sync this user id (repeatable)
    #[arg(long = "user", global = true, value_name = "ID")]
    pub users: Vec<String>,

    /// Maximum number of users synced concurrently
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Runtime worker threads
    #[arg(long, global = true)]
    pub max_procs: Option<usize>,

    /// DuckDB database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Debug logging, including the effective configuration
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(auth) = &self.auth {
            config.api.token_file = Some(auth.clone());
        }
        if let Some(srv) = &self.srv {
            config.api.base_url = normalize_base_url(srv);
        }
        if let Some(users_file) = &self.users_file {
            config.sync.users_file = Some(users_file.clone());
        }
        config.sync.users.extend(self.users.iter().cloned());
        if let Some(max_workers) = self.max_workers {
            config.sync.max_workers = max_workers;
        }
        if let Some(max_procs) = self.max_procs {
            config.sync.worker_threads = Some(max_procs);
        }
        if let Some(db) = &self.db {
            config.storage.path = db.clone();
        }
    }
}

/// A bare host such as `school.instructure.com` gets an https scheme.
fn normalize_base_url(srv: &str) -> String {
    let srv = srv.trim();
    if srv.contains("://") {
        srv.to_string()
    } else {
        format!("https://{}", srv)
    }
}

/// Build the effective configuration: config file (if any), then command
/// line overrides, then validation.
pub fn load_settings(config_path: Option<&Path>, overrides: &Overrides) -> Result<Config, RunError> {
    let mut config = match config_path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            parse_config(path)?
        }
        None => Config::default(),
    };

    overrides.apply(&mut config);
    expand_paths(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn read_token(path: &Path) -> Result<String, RunError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RunError::ReadFile {
        what: "token file",
        path: path.to_path_buf(),
        source,
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(RunError::EmptyToken(path.to_path_buf()));
    }
    Ok(token.to_string())
}

/// Split a users file into ids. Commas and line breaks both separate.
pub fn parse_user_list(text: &str) -> Vec<String> {
    text.split(|c| c == ',' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// All user ids to sync: the users file first, then inline ids, with
/// duplicates dropped.
pub fn collect_users(config: &Config) -> Result<Vec<String>, RunError> {
    let mut ids = Vec::new();
    if let Some(path) = &config.sync.users_file {
        let text = std::fs::read_to_string(path).map_err(|source| RunError::ReadFile {
            what: "users file",
            path: path.clone(),
            source,
        })?;
        ids.extend(parse_user_list(&text));
    }
    ids.extend(config.sync.users.iter().map(|id| id.trim().to_string()));

    let mut seen = HashSet::new();
    ids.retain(|id| !id.is_empty() && seen.insert(id.clone()));
    Ok(ids)
}

fn log_effective_config(config: &Config, users: usize) {
    debug!(
        base_url = %config.api.base_url,
        token = "<redacted>",
        per_page = config.api.per_page,
        request_timeout = ?config.api.request_timeout,
        users,
        max_workers = config.sync.max_workers,
        task_timeout = ?config.sync.task_timeout,
        ordering_check = config.sync.ordering_check,
        worker_threads = ?config.sync.worker_threads,
        db = %config.storage.path.display(),
        table = %config.storage.table,
        "Effective configuration"
    );
}

/// Sync every configured user once. Fails if setup fails or if any user
/// failed.
pub async fn run(config: Config) -> Result<SyncReport, RunError> {
    let token_file = config
        .api
        .token_file
        .as_deref()
        .ok_or_else(|| ConfigError::Validation("api.token_file is required".to_string()))?;
    let token = read_token(token_file)?;

    let users = collect_users(&config)?;
    if users.is_empty() {
        return Err(RunError::NoUsers);
    }
    log_effective_config(&config, users.len());

    info!(path = %config.storage.path.display(), "Initializing storage");
    let storage = Arc::new(DuckDbStorage::new(&config.storage.path, &config.storage.table)?);
    storage.init_schema().await?;

    let client = Arc::new(CanvasClient::new(&config.api, token)?);
    let scheduler = Scheduler::new(client, storage, SchedulerConfig::from(&config.sync));

    let cancel = scheduler.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, not starting any more users");
            cancel.cancel();
        }
    });

    let report = scheduler.run(&users).await;
    interrupt.abort();

    for failure in report.failures() {
        if let Some(e) = &failure.error {
            error!(
                user_id = %failure.user_id,
                kind = e.kind(),
                stage = ?failure.failed_in,
                error = %e,
                "User sync failed"
            );
        }
    }

    info!(
        users = report.results.len(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        rows = report.total_rows(),
        "Sync finished"
    );

    if report.failed() > 0 {
        return Err(RunError::UsersFailed {
            failed: report.failed(),
            total: report.results.len(),
        });
    }
    Ok(report)
}
