/// Position of the newest synced page view for one user.
///
/// An empty checkpoint (no identifier, epoch 0) means nothing has been synced
/// and forces a full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub request_id: String,
    pub epoch: i64,
}

impl Checkpoint {
    pub fn new(request_id: impl Into<String>, epoch: i64) -> Self {
        Self {
            request_id: request_id.into(),
            epoch,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.request_id.is_empty() && self.epoch == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, FieldValue};
    use crate::storage::duckdb::DuckDbStorage;
    use crate::storage::traits::Storage;
    use std::sync::Arc;

    async fn setup_storage() -> Arc<dyn Storage> {
        let storage = DuckDbStorage::in_memory().unwrap();
        storage.init_schema().await.unwrap();
        Arc::new(storage) as Arc<dyn Storage>
    }

    fn view(id: &str, created_at: &str) -> Event {
        Event::new()
            .with_field("request_id", FieldValue::Text(id.to_string()))
            .with_field("created_at", FieldValue::Text(created_at.to_string()))
    }

    #[tokio::test]
    async fn test_checkpoint_no_rows_is_empty() {
        let storage = setup_storage().await;
        let checkpoint = storage.read_checkpoint("1").await.unwrap();
        assert!(checkpoint.is_empty());
        assert_eq!(checkpoint, Checkpoint::empty());
    }

    #[tokio::test]
    async fn test_checkpoint_is_newest_row() {
        let storage = setup_storage().await;
        let events = vec![
            view("r3", "2021-03-01T10:02:00Z"),
            view("r2", "2021-03-01T10:01:00Z"),
            view("r1", "2021-03-01T10:00:00Z"),
        ];
        storage.commit("1", &events).await.unwrap();

        let checkpoint = storage.read_checkpoint("1").await.unwrap();
        assert_eq!(checkpoint.request_id, "r3");
        assert_eq!(checkpoint.epoch, 1_614_592_920);
    }

    #[tokio::test]
    async fn test_checkpoint_tie_breaks_on_newest_in_stream() {
        let storage = setup_storage().await;
        // Same second; the API lists "b" first so it is the newer one
        let events = vec![
            view("b", "2021-03-01T10:00:00Z"),
            view("a", "2021-03-01T10:00:00Z"),
        ];
        storage.commit("1", &events).await.unwrap();

        let checkpoint = storage.read_checkpoint("1").await.unwrap();
        assert_eq!(checkpoint.request_id, "b");
    }

    #[tokio::test]
    async fn test_checkpoint_scoped_per_user() {
        let storage = setup_storage().await;
        storage
            .commit("1", &[view("u1", "2021-03-01T10:00:00Z")])
            .await
            .unwrap();
        storage
            .commit("2", &[view("u2", "2022-03-01T10:00:00Z")])
            .await
            .unwrap();

        assert_eq!(storage.read_checkpoint("1").await.unwrap().request_id, "u1");
        assert_eq!(storage.read_checkpoint("2").await.unwrap().request_id, "u2");
        assert!(storage.read_checkpoint("3").await.unwrap().is_empty());
    }

    #[test]
    fn test_checkpoint_with_only_epoch_is_not_empty() {
        assert!(!Checkpoint::new("", 1000).is_empty());
        assert!(!Checkpoint::new("r1", 0).is_empty());
    }
}
