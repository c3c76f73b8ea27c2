//! Decides where new data ends in a newest-first feed.
//!
//! An identifier match takes precedence. The timestamp comparison only
//! applies when the checkpoint has no identifier to match against.

use crate::storage::Checkpoint;

/// No prior rows: keep everything on every page.
pub fn is_full_sync(checkpoint: &Checkpoint) -> bool {
    checkpoint.is_empty()
}

/// True when the event at (`request_id`, `epoch`) was already synced, which
/// ends the walk for this user.
pub fn should_stop(request_id: &str, epoch: i64, checkpoint: &Checkpoint) -> bool {
    if checkpoint.request_id.is_empty() {
        epoch <= checkpoint.epoch
    } else {
        request_id == checkpoint.request_id
    }
}
