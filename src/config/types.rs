use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host of the Canvas instance, e.g. `https://canvas.instructure.com`
    #[serde(default)]
    pub base_url: String,
    /// File holding the bearer token
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_file: None,
            per_page: default_per_page(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_per_page() -> u32 {
    1000
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Comma or newline separated list of user ids
    pub users_file: Option<PathBuf>,
    /// Additional user ids listed inline
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default, with = "humantime_serde")]
    pub task_timeout: Option<Duration>,
    #[serde(default = "default_ordering_check")]
    pub ordering_check: bool,
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
    /// Tokio worker threads; defaults to the number of CPUs
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            users_file: None,
            users: Vec::new(),
            max_workers: default_max_workers(),
            task_timeout: None,
            ordering_check: default_ordering_check(),
            progress_buffer: default_progress_buffer(),
            worker_threads: None,
        }
    }
}

fn default_max_workers() -> usize {
    10
}

fn default_ordering_check() -> bool {
    true
}

fn default_progress_buffer() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            table: default_table(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("~/.local/share/pageviewsync/pageviews.duckdb")
}

fn default_table() -> String {
    "pageviews".to_string()
}
