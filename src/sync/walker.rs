use super::cutoff::{is_full_sync, should_stop};
use super::SyncError;
use crate::api::{decode_page, PageSource};
use crate::event::{Event, FieldValue, CREATED_AT};
use crate::storage::Checkpoint;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Fail when an event is newer than the one before it
    pub ordering_check: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            ordering_check: true,
        }
    }
}

/// New events for one user, newest first as received.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub events: Vec<Event>,
    pub pages: usize,
    /// True when the walk ended on an already-synced event rather than the
    /// last page
    pub cutoff_reached: bool,
}

/// Walks the feed from `first_url`, page by page, keeping events until the
/// checkpoint is reached or the pages run out.
///
/// Pages are fetched strictly one after another: each URL comes from the
/// previous response.
pub async fn walk<S>(
    source: &S,
    first_url: String,
    checkpoint: &Checkpoint,
    options: WalkOptions,
) -> Result<WalkOutcome, SyncError>
where
    S: PageSource + ?Sized,
{
    let full_sync = is_full_sync(checkpoint);
    let needs_epoch = options.ordering_check || !full_sync;

    let mut outcome = WalkOutcome::default();
    let mut visited = HashSet::new();
    let mut previous: Option<(String, i64)> = None;
    let mut url = Some(first_url);

    while let Some(current) = url.take() {
        if !visited.insert(current.clone()) {
            return Err(SyncError::PaginationLoop(current));
        }

        let page = source.fetch_page(&current).await?;
        let events = decode_page(&page.body)?;
        outcome.pages += 1;

        debug!(
            url = %current,
            page = outcome.pages,
            events = events.len(),
            next = page.next.as_deref().unwrap_or(""),
            "Fetched page"
        );

        for event in events {
            let epoch = if needs_epoch {
                event_epoch(&event, full_sync, checkpoint)?
            } else {
                None
            };

            if options.ordering_check {
                if let Some(epoch) = epoch {
                    if let Some((previous_id, previous_epoch)) = &previous {
                        if epoch > *previous_epoch {
                            return Err(SyncError::OutOfOrder {
                                previous_id: previous_id.clone(),
                                previous: *previous_epoch,
                                current_id: event.request_id().to_string(),
                                current: epoch,
                            });
                        }
                    }
                    previous = Some((event.request_id().to_string(), epoch));
                }
            }

            // Without a timestamp only the identifier match can end the walk
            let stop = match epoch {
                Some(epoch) => should_stop(event.request_id(), epoch, checkpoint),
                None => !checkpoint.request_id.is_empty() && event.request_id() == checkpoint.request_id,
            };
            if !full_sync && stop {
                debug!(
                    request_id = event.request_id(),
                    epoch = ?epoch,
                    kept = outcome.events.len(),
                    "Reached previously synced event"
                );
                outcome.cutoff_reached = true;
                return Ok(outcome);
            }

            outcome.events.push(event);
        }

        url = page.next.filter(|next| !next.is_empty());
    }

    Ok(outcome)
}

/// `created_at` of `event` in epoch seconds. An absent or null timestamp
/// carries no ordering information and yields `None`, unless the cutoff
/// depends on it (incremental walk against a checkpoint without an
/// identifier).
fn event_epoch(event: &Event, full_sync: bool, checkpoint: &Checkpoint) -> Result<Option<i64>, SyncError> {
    let absent = event.get(CREATED_AT).map_or(true, FieldValue::is_null);
    if absent && (full_sync || !checkpoint.request_id.is_empty()) {
        return Ok(None);
    }
    Ok(Some(event.created_at_unix()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeFeed;

    fn ids(outcome: &WalkOutcome) -> Vec<&str> {
        outcome.events.iter().map(|e| e.request_id()).collect()
    }

    #[tokio::test]
    async fn test_incremental_stops_at_checkpoint() {
        let feed = FakeFeed::new().with_user(
            "1",
            vec![
                vec![("r45", 1100), ("r44", 1050), ("r42", 1000), ("r41", 900)],
                vec![("r40", 800)],
            ],
        );
        let checkpoint = Checkpoint::new("r42", 1000);

        let outcome = walk(&feed, FakeFeed::page_url("1", 1), &checkpoint, WalkOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec!["r45", "r44"]);
        assert!(outcome.cutoff_reached);
        assert_eq!(outcome.pages, 1);
        assert_eq!(feed.fetched(), vec![FakeFeed::page_url("1", 1)]);
    }

    #[tokio::test]
    async fn test_full_sync_keeps_every_page() {
        let feed = FakeFeed::new().with_user(
            "1",
            vec![
                vec![("c", 300), ("b", 200)],
                vec![],
                vec![("a", 100)],
            ],
        );

        let outcome = walk(&feed, FakeFeed::page_url("1", 1), &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&outcome), vec!["c", "b", "a"]);
        assert_eq!(outcome.pages, 3);
        assert!(!outcome.cutoff_reached);
    }

    #[tokio::test]
    async fn test_full_sync_ignores_ids_and_times() {
        // With ordering checks off nothing about the events is inspected
        let feed = FakeFeed::new().with_user("1", vec![vec![("", 100), ("x", 900)]]);
        let options = WalkOptions {
            ordering_check: false,
        };

        let outcome = walk(&feed, FakeFeed::page_url("1", 1), &Checkpoint::empty(), options)
            .await
            .unwrap();
        assert_eq!(outcome.events.len(), 2);
    }

    #[tokio::test]
    async fn test_cutoff_on_later_page() {
        let feed = FakeFeed::new().with_user(
            "1",
            vec![vec![("r5", 500), ("r4", 400)], vec![("r3", 300), ("r2", 200)]],
        );

        let outcome = walk(
            &feed,
            FakeFeed::page_url("1", 1),
            &Checkpoint::new("r2", 200),
            WalkOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(ids(&outcome), vec!["r5", "r4", "r3"]);
        assert_eq!(outcome.pages, 2);
    }

    #[tokio::test]
    async fn test_checkpoint_missing_from_feed_keeps_all() {
        let feed = FakeFeed::new().with_user("1", vec![vec![("r5", 500), ("r4", 400)]]);

        let outcome = walk(
            &feed,
            FakeFeed::page_url("1", 1),
            &Checkpoint::new("gone", 450),
            WalkOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(ids(&outcome), vec!["r5", "r4"]);
        assert!(!outcome.cutoff_reached);
    }

    #[tokio::test]
    async fn test_timestamp_fallback_when_checkpoint_has_no_id() {
        let feed = FakeFeed::new().with_user("1", vec![vec![("r5", 500), ("r4", 400), ("r3", 300)]]);

        let outcome = walk(
            &feed,
            FakeFeed::page_url("1", 1),
            &Checkpoint::new("", 400),
            WalkOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(ids(&outcome), vec!["r5"]);
    }

    #[tokio::test]
    async fn test_out_of_order_page_fails_loudly() {
        let feed = FakeFeed::new().with_user("1", vec![vec![("r1", 100)], vec![("r2", 200)]]);

        let err = walk(&feed, FakeFeed::page_url("1", 1), &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::OutOfOrder { ref previous_id, ref current_id, .. }
                if previous_id == "r1" && current_id == "r2"
        ));
    }

    #[tokio::test]
    async fn test_equal_timestamps_are_in_order() {
        let feed = FakeFeed::new().with_user("1", vec![vec![("b", 100), ("a", 100)]]);
        let outcome = walk(&feed, FakeFeed::page_url("1", 1), &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.events.len(), 2);
    }

    #[tokio::test]
    async fn test_non_array_page_is_decode_error() {
        let url = FakeFeed::page_url("1", 1);
        let feed = FakeFeed::new().with_raw_page(&url, r#"{"status":"unauthenticated"}"#.to_string(), None);

        let err = walk(&feed, url, &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let url = FakeFeed::page_url("1", 1);
        let feed = FakeFeed::new().with_status(&url, 500);

        let err = walk(&feed, url, &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_malformed_timestamp_in_incremental_walk() {
        let url = FakeFeed::page_url("1", 1);
        let body = r#"[{"request_id":"r9","created_at":"last tuesday"}]"#.to_string();
        let feed = FakeFeed::new().with_raw_page(&url, body, None);

        let err = walk(&feed, url, &Checkpoint::new("r1", 10), WalkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TimeParse(_)));
    }

    #[tokio::test]
    async fn test_empty_next_link_ends_walk() {
        let url = FakeFeed::page_url("1", 1);
        let feed = FakeFeed::new().with_raw_page(&url, "[]".to_string(), Some(String::new()));

        let outcome = walk(&feed, url, &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.pages, 1);
    }

    #[tokio::test]
    async fn test_full_sync_keeps_events_without_timestamp() {
        let url = FakeFeed::page_url("1", 1);
        let body = r#"[
            {"request_id":"r3","created_at":"2021-03-01T10:02:00Z"},
            {"request_id":"r2","created_at":null},
            {"request_id":"r1"},
            {"request_id":"r0","created_at":"2021-03-01T10:00:00Z"}
        ]"#;
        let feed = FakeFeed::new().with_raw_page(&url, body.to_string(), None);

        let outcome = walk(&feed, url, &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&outcome), vec!["r3", "r2", "r1", "r0"]);
    }

    #[tokio::test]
    async fn test_incremental_matches_id_of_event_without_timestamp() {
        let url = FakeFeed::page_url("1", 1);
        let body = r#"[
            {"request_id":"r3","created_at":"2021-03-01T10:02:00Z"},
            {"request_id":"r2","created_at":null},
            {"request_id":"r1","created_at":"2021-03-01T10:00:00Z"}
        ]"#;
        let feed = FakeFeed::new().with_raw_page(&url, body.to_string(), None);

        let outcome = walk(&feed, url, &Checkpoint::new("r2", 0), WalkOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&outcome), vec!["r3"]);
        assert!(outcome.cutoff_reached);
    }

    #[tokio::test]
    async fn test_pagination_loop_detected() {
        let url = FakeFeed::page_url("1", 1);
        let feed = FakeFeed::new().with_raw_page(&url, "[]".to_string(), Some(url.clone()));

        let err = walk(&feed, url, &Checkpoint::empty(), WalkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PaginationLoop(_)));
    }
}
