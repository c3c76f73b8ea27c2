//! In-memory page feed and storage wrapper for exercising the sync engine
//! without HTTP.

use crate::api::{FetchError, PageSource, RawPage};
use crate::event::Event;
use crate::storage::{Checkpoint, Storage, StorageError};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn wire_time(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .expect("epoch in range")
        .to_rfc3339()
}

pub(crate) fn view_json(id: &str, epoch: i64) -> Value {
    json!({
        "request_id": id,
        "user_id": 1,
        "url": format!("https://canvas.test/courses/1/pages/{}", id),
        "created_at": wire_time(epoch),
        "updated_at": wire_time(epoch),
    })
}

#[derive(Default)]
pub(crate) struct FakeFeed {
    pages: HashMap<String, Result<RawPage, u16>>,
    delay: Option<Duration>,
    fetched: Mutex<Vec<String>>,
}

impl FakeFeed {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page_url(user_id: &str, page: usize) -> String {
        format!("fake://users/{}/page_views?page={}", user_id, page)
    }

    /// Serve `pages` for `user_id`, each page a list of (request_id, epoch),
    /// linked in order.
    pub(crate) fn with_user(mut self, user_id: &str, pages: Vec<Vec<(&str, i64)>>) -> Self {
        let count = pages.len();
        for (index, page) in pages.into_iter().enumerate() {
            let body: Vec<Value> = page.into_iter().map(|(id, epoch)| view_json(id, epoch)).collect();
            self = self.with_raw_page(
                &Self::page_url(user_id, index + 1),
                Value::Array(body).to_string(),
                (index + 1 < count).then(|| Self::page_url(user_id, index + 2)),
            );
        }
        self
    }

    pub(crate) fn with_raw_page(mut self, url: &str, body: String, next: Option<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(RawPage {
                body: body.into_bytes(),
                next,
            }),
        );
        self
    }

    pub(crate) fn with_status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), Err(status));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for FakeFeed {
    async fn fetch_page(&self, url: &str) -> Result<RawPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.pages.get(url) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(status)) => Err(FetchError::Status {
                status: *status,
                url: url.to_string(),
                body: String::new(),
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
                body: "no such page".to_string(),
            }),
        }
    }

    fn first_page_url(&self, user_id: &str) -> Result<String, FetchError> {
        Ok(Self::page_url(user_id, 1))
    }
}

/// Storage wrapper that counts tasks between their checkpoint read and the
/// end of their commit, with an optional slow commit.
pub(crate) struct TrackingStorage {
    inner: Arc<dyn Storage>,
    commit_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl TrackingStorage {
    pub(crate) fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            commit_delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for TrackingStorage {
    async fn init_schema(&self) -> Result<(), StorageError> {
        self.inner.init_schema().await
    }

    async fn read_checkpoint(&self, user_id: &str) -> Result<Checkpoint, StorageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.inner.read_checkpoint(user_id).await
    }

    async fn commit(&self, user_id: &str, events: &[Event]) -> Result<usize, StorageError> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.commit(user_id, events).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn count_rows(&self, user_id: &str) -> Result<u64, StorageError> {
        self.inner.count_rows(user_id).await
    }
}
