use super::progress::{progress_channel, spawn_reporter};
use super::task::{SubjectResult, SubjectTask, TaskOptions};
use super::walker::WalkOptions;
use super::SyncError;
use crate::api::PageSource;
use crate::config::SyncConfig;
use crate::storage::Storage;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on users synced at once
    pub max_workers: usize,
    pub task_timeout: Option<Duration>,
    pub ordering_check: bool,
    pub progress_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            task_timeout: config.task_timeout,
            ordering_check: config.ordering_check,
            progress_buffer: config.progress_buffer,
        }
    }
}

/// Outcome of a whole run, one result per user in input order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<SubjectResult>,
    /// Progress notices the reporter logged
    pub notices: usize,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn total_rows(&self) -> usize {
        self.results.iter().map(|r| r.rows_inserted).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SubjectResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Runs one sync task per user with at most `max_workers` in flight.
pub struct Scheduler {
    source: Arc<dyn PageSource>,
    storage: Arc<dyn Storage>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(source: Arc<dyn PageSource>, storage: Arc<dyn Storage>, config: SchedulerConfig) -> Self {
        Self {
            source,
            storage,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling stops new users from being admitted. Tasks already running
    /// finish normally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sync every user and wait for all of them, including the progress
    /// reporter. Never fails as a whole; per-user errors are in the report.
    pub async fn run(&self, users: &[String]) -> SyncReport {
        let workers = self.config.max_workers.max(1);
        info!(users = users.len(), max_workers = workers, "Starting sync");

        let (tx, rx) = progress_channel(self.config.progress_buffer);
        let reporter = spawn_reporter(rx);
        let slots = Arc::new(Semaphore::new(workers));
        let options = TaskOptions {
            walk: WalkOptions {
                ordering_check: self.config.ordering_check,
            },
            deadline: self.config.task_timeout,
        };

        let mut handles: Vec<(String, Option<JoinHandle<SubjectResult>>)> = Vec::with_capacity(users.len());

        for user_id in users {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = slots.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                debug!(user_id = %user_id, "Not starting, run cancelled");
                handles.push((user_id.clone(), None));
                continue;
            };

            let task = SubjectTask::new(
                user_id.clone(),
                self.source.clone(),
                self.storage.clone(),
                tx.clone(),
                options,
            );
            let handle = tokio::spawn(async move {
                let _permit = permit;
                task.run().await
            });
            handles.push((user_id.clone(), Some(handle)));
        }

        // Tasks hold the remaining senders; the reporter ends once they finish
        drop(tx);

        let results = join_all(handles.into_iter().map(|(user_id, handle)| async move {
            match handle {
                None => SubjectResult::failed(user_id, SyncError::Cancelled),
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Sync task aborted");
                        SubjectResult::failed(user_id, SyncError::Join(e.to_string()))
                    }
                },
            }
        }))
        .await;

        let notices = match reporter.await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(error = %e, "Progress reporter aborted");
                0
            }
        };

        SyncReport { results, notices }
    }
}
