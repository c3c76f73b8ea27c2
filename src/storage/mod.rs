pub mod checkpoint;
pub mod duckdb;
pub mod schema;
pub mod traits;

pub use checkpoint::Checkpoint;
pub use traits::{Storage, StorageError};
