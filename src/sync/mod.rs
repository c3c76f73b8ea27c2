pub mod cutoff;
pub mod progress;
pub mod scheduler;
pub mod task;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use progress::{progress_channel, spawn_reporter, Progress, ProgressReceiver, ProgressSender};
pub use scheduler::{Scheduler, SchedulerConfig, SyncReport};
pub use task::{SubjectResult, SubjectTask, TaskOptions, TaskState};
pub use walker::{walk, WalkOptions, WalkOutcome};

use crate::api::{DecodeError, FetchError};
use crate::event::TimeParseError;
use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Failure of one user's sync. Always scoped to that user; other users carry on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    TimeParse(#[from] TimeParseError),

    #[error("checkpoint read failed: {0}")]
    StorageRead(#[source] StorageError),

    #[error("commit failed: {0}")]
    StorageWrite(#[source] StorageError),

    #[error("feed is not newest-first: '{current_id}' ({current}) follows '{previous_id}' ({previous})")]
    OutOfOrder {
        previous_id: String,
        previous: i64,
        current_id: String,
        current: i64,
    },

    #[error("pagination revisited {0}")]
    PaginationLoop(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("task aborted: {0}")]
    Join(String),

    #[error("cancelled before it started")]
    Cancelled,
}

impl SyncError {
    /// Short machine-readable name for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(_) => "transport",
            SyncError::Decode(_) => "decode",
            SyncError::TimeParse(_) => "time_parse",
            SyncError::StorageRead(_) => "storage_read",
            SyncError::StorageWrite(StorageError::Time(_)) => "time_parse",
            SyncError::StorageWrite(_) => "storage_write",
            SyncError::OutOfOrder { .. } => "out_of_order",
            SyncError::PaginationLoop(_) => "pagination_loop",
            SyncError::Timeout(_) => "timeout",
            SyncError::Join(_) => "join",
            SyncError::Cancelled => "cancelled",
        }
    }
}
