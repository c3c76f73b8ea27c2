use crate::storage::Checkpoint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Progress notice emitted by a user's sync task.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Started {
        user_id: String,
    },
    CheckpointRead {
        user_id: String,
        checkpoint: Checkpoint,
        full_sync: bool,
    },
    Paginated {
        user_id: String,
        pages: usize,
        new_events: usize,
        cutoff_reached: bool,
    },
    Committed {
        user_id: String,
        rows: usize,
    },
    Failed {
        user_id: String,
        kind: &'static str,
        error: String,
    },
}

pub type ProgressSender = mpsc::Sender<Progress>;
pub type ProgressReceiver = mpsc::Receiver<Progress>;

/// Create a bounded progress channel. Senders wait when the reporter falls
/// behind.
pub fn progress_channel(buffer_size: usize) -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(buffer_size.max(1))
}

/// Log every notice until all senders are dropped, then return how many were
/// seen. Awaiting the handle guarantees the queue has been fully drained.
pub fn spawn_reporter(mut rx: ProgressReceiver) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0usize;
        while let Some(notice) = rx.recv().await {
            seen += 1;
            report(&notice);
        }
        debug!(notices = seen, "Progress reporter drained");
        seen
    })
}

fn report(notice: &Progress) {
    match notice {
        Progress::Started { user_id } => {
            debug!(user_id = %user_id, "Sync started");
        }
        Progress::CheckpointRead {
            user_id,
            checkpoint,
            full_sync,
        } => {
            info!(
                user_id = %user_id,
                last_request_id = %checkpoint.request_id,
                last_epoch = checkpoint.epoch,
                full_sync,
                "Checkpoint read"
            );
        }
        Progress::Paginated {
            user_id,
            pages,
            new_events,
            cutoff_reached,
        } => {
            info!(user_id = %user_id, pages, new_events, cutoff_reached, "Pagination finished");
        }
        Progress::Committed { user_id, rows } => {
            info!(user_id = %user_id, rows, "Updated");
        }
        Progress::Failed { user_id, kind, error } => {
            warn!(user_id = %user_id, kind, error = %error, "Terminating");
        }
    }
}
