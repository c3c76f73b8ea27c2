use super::checkpoint::Checkpoint;
use crate::event::{Event, TimeParseError};
use async_trait::async_trait;

/// Relational store of synced page views.
///
/// Checkpoints are never stored separately; they are derived from the rows
/// already committed for a user.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn init_schema(&self) -> Result<(), StorageError>;

    /// Identifier and epoch of the user's newest stored row (highest epoch,
    /// ties broken by insertion order). Empty when the user has no rows.
    async fn read_checkpoint(&self, user_id: &str) -> Result<Checkpoint, StorageError>;

    /// Insert all events for one user in a single transaction. Either every
    /// row is committed or none is. Returns the number of rows inserted.
    async fn commit(&self, user_id: &str, events: &[Event]) -> Result<usize, StorageError>;

    async fn count_rows(&self, user_id: &str) -> Result<u64, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("field name '{0}' cannot be used as a column name")]
    InvalidColumn(String),

    #[error("field '{0}' collides with a derived column")]
    ReservedColumn(String),

    #[error("derived column: {0}")]
    Time(#[from] TimeParseError),

    #[error("storage error: {0}")]
    Internal(String),
}

impl From<duckdb::Error> for StorageError {
    fn from(e: duckdb::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}
