use super::cutoff::is_full_sync;
use super::progress::{Progress, ProgressSender};
use super::walker::{walk, WalkOptions};
use super::SyncError;
use crate::api::PageSource;
use crate::event::Event;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stages of one user's sync. Transitions are strictly sequential; any stage
/// can end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Start,
    CheckpointRead,
    Paginating,
    Persisting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskOptions {
    pub walk: WalkOptions,
    /// Upper bound on the whole task, fetches and database calls included
    pub deadline: Option<Duration>,
}

/// Terminal outcome of one user's sync.
#[derive(Debug)]
pub struct SubjectResult {
    pub user_id: String,
    /// `Done` or `Failed`
    pub state: TaskState,
    /// Stage the task was in when it failed
    pub failed_in: Option<TaskState>,
    pub rows_inserted: usize,
    pub pages: usize,
    pub error: Option<SyncError>,
    pub elapsed: Duration,
}

impl SubjectResult {
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Done
    }

    pub(crate) fn failed(user_id: impl Into<String>, error: SyncError) -> Self {
        Self {
            user_id: user_id.into(),
            state: TaskState::Failed,
            failed_in: Some(TaskState::Start),
            rows_inserted: 0,
            pages: 0,
            error: Some(error),
            elapsed: Duration::ZERO,
        }
    }
}

/// Syncs one user: read checkpoint, walk pages, commit new events.
pub struct SubjectTask {
    user_id: String,
    source: Arc<dyn PageSource>,
    storage: Arc<dyn Storage>,
    progress: ProgressSender,
    options: TaskOptions,
}

impl SubjectTask {
    pub fn new(
        user_id: impl Into<String>,
        source: Arc<dyn PageSource>,
        storage: Arc<dyn Storage>,
        progress: ProgressSender,
        options: TaskOptions,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            source,
            storage,
            progress,
            options,
        }
    }

    pub async fn run(self) -> SubjectResult {
        let started = Instant::now();
        self.notify(Progress::Started {
            user_id: self.user_id.clone(),
        })
        .await;

        let mut stage = TaskState::Start;
        let mut pages = 0usize;

        // The deadline covers the checkpoint read and the walk. A started
        // commit is always awaited.
        let collected = match self.options.deadline {
            Some(limit) => {
                match tokio::time::timeout(limit, self.collect(&mut stage, &mut pages)).await {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Timeout(limit)),
                }
            }
            None => self.collect(&mut stage, &mut pages).await,
        };

        let outcome = match collected {
            Ok(events) => {
                stage = TaskState::Persisting;
                self.storage
                    .commit(&self.user_id, &events)
                    .await
                    .map_err(SyncError::StorageWrite)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(rows) => {
                self.notify(Progress::Committed {
                    user_id: self.user_id.clone(),
                    rows,
                })
                .await;
                SubjectResult {
                    user_id: self.user_id,
                    state: TaskState::Done,
                    failed_in: None,
                    rows_inserted: rows,
                    pages,
                    error: None,
                    elapsed: started.elapsed(),
                }
            }
            Err(error) => {
                self.notify(Progress::Failed {
                    user_id: self.user_id.clone(),
                    kind: error.kind(),
                    error: error.to_string(),
                })
                .await;
                SubjectResult {
                    user_id: self.user_id,
                    state: TaskState::Failed,
                    failed_in: Some(stage),
                    rows_inserted: 0,
                    pages,
                    error: Some(error),
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    /// Reads the checkpoint and walks the feed, returning the new events.
    async fn collect(&self, stage: &mut TaskState, pages: &mut usize) -> Result<Vec<Event>, SyncError> {
        let checkpoint = self
            .storage
            .read_checkpoint(&self.user_id)
            .await
            .map_err(SyncError::StorageRead)?;
        *stage = TaskState::CheckpointRead;

        self.notify(Progress::CheckpointRead {
            user_id: self.user_id.clone(),
            checkpoint: checkpoint.clone(),
            full_sync: is_full_sync(&checkpoint),
        })
        .await;

        *stage = TaskState::Paginating;
        let first_url = self.source.first_page_url(&self.user_id)?;
        let walked = walk(self.source.as_ref(), first_url, &checkpoint, self.options.walk).await?;
        *pages = walked.pages;

        self.notify(Progress::Paginated {
            user_id: self.user_id.clone(),
            pages: walked.pages,
            new_events: walked.events.len(),
            cutoff_reached: walked.cutoff_reached,
        })
        .await;

        Ok(walked.events)
    }

    async fn notify(&self, notice: Progress) {
        // The reporter only goes away after every task has finished
        let _ = self.progress.send(notice).await;
    }
}
