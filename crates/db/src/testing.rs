//! A hand-rolled, in-memory [`RecordSource`]/[`RecordQueue`] fake standing
//! in for the relational source database in tests. Mirrors the "toy
//! domain" style of fake used for testing elsewhere in this codebase
//! rather than a mocking framework.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use score_indexer_core::{CursorValue, Error, RecordDescriptor, ScoreRecord};

use crate::traits::{RecordQueue, RecordSource};

#[derive(Clone, Copy, PartialEq, Eq)]
enum QueueStatus {
    Pending,
    Done,
}

struct QueueEntry {
    mode: String,
    status: QueueStatus,
}

#[derive(Default)]
struct State {
    /// The scored-table rows, keyed by id.
    rows: HashMap<CursorValue, ScoreRecord>,
    /// The work-queue table, keyed by id.
    queue: HashMap<CursorValue, QueueEntry>,
}

/// An in-memory stand-in for both the cursor-scanned score table and the
/// work-queue table. One instance backs both the `RecordSource` and
/// `RecordQueue` collaborators in a test, the way a single Postgres
/// database backs both in production.
#[derive(Default)]
pub struct FakeRecordSource {
    state: Mutex<State>,
}

impl FakeRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row directly into the scored table.
    pub fn seed_row(&self, record: ScoreRecord) {
        self.state.lock().unwrap().rows.insert(record.id, record);
    }

    /// Seeds a pending work-queue entry for `mode`.
    pub fn seed_pending(&self, id: CursorValue, mode: &str) {
        self.state.lock().unwrap().queue.insert(
            id,
            QueueEntry {
                mode: mode.to_string(),
                status: QueueStatus::Pending,
            },
        );
    }

    /// Seeds a completed work-queue entry for `mode`.
    pub fn seed_done(&self, id: CursorValue, mode: &str) {
        self.state.lock().unwrap().queue.insert(
            id,
            QueueEntry {
                mode: mode.to_string(),
                status: QueueStatus::Done,
            },
        );
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}

#[async_trait]
impl RecordSource for FakeRecordSource {
    async fn read_max(&self, _descriptor: &dyn RecordDescriptor) -> Result<CursorValue, Error> {
        Ok(self.state.lock().unwrap().rows.keys().copied().max().unwrap_or(0))
    }

    async fn scan_page(
        &self,
        _descriptor: &dyn RecordDescriptor,
        last: CursorValue,
        max: CursorValue,
        batch_size: i64,
    ) -> Result<Vec<ScoreRecord>, Error> {
        let state = self.state.lock().unwrap();
        let mut page: Vec<ScoreRecord> = state
            .rows
            .values()
            .filter(|r| r.id > last && r.id <= max)
            .cloned()
            .collect();
        page.sort_by_key(|r| r.id);
        page.truncate(batch_size.max(0) as usize);
        Ok(page)
    }
}

#[async_trait]
impl RecordQueue for FakeRecordSource {
    async fn poll_pending(&self, mode: &str, batch_size: i64) -> Result<Vec<CursorValue>, Error> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<CursorValue> = state
            .queue
            .iter()
            .filter(|(_, entry)| entry.mode == mode && entry.status == QueueStatus::Pending)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.truncate(batch_size.max(0) as usize);
        Ok(ids)
    }

    async fn fetch_records(
        &self,
        _descriptor: &dyn RecordDescriptor,
        ids: &[CursorValue],
    ) -> Result<Vec<ScoreRecord>, Error> {
        let state = self.state.lock().unwrap();
        Ok(ids.iter().filter_map(|id| state.rows.get(id).cloned()).collect())
    }

    async fn ack(&self, ids: &[CursorValue]) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        for id in ids {
            if let Some(entry) = state.queue.get_mut(id) {
                entry.status = QueueStatus::Done;
            }
        }
        Ok(())
    }

    async fn highest_completed(&self, mode: &str) -> Result<Option<CursorValue>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .queue
            .iter()
            .filter(|(_, entry)| entry.mode == mode && entry.status == QueueStatus::Done)
            .map(|(id, _)| *id)
            .max())
    }

    async fn rewind_to(&self, mode: &str, id: CursorValue) -> Result<u64, Error> {
        let mut state = self.state.lock().unwrap();
        let mut count = 0;
        for (entry_id, entry) in state.queue.iter_mut() {
            if entry.mode == mode && *entry_id > id {
                entry.status = QueueStatus::Pending;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn enqueue_all(
        &self,
        _descriptor: &dyn RecordDescriptor,
        mode: &str,
        from_id: Option<CursorValue>,
    ) -> Result<u64, Error> {
        let from_id = from_id.unwrap_or(0);
        let mut state = self.state.lock().unwrap();
        let ids: Vec<CursorValue> = state.rows.keys().copied().filter(|id| *id > from_id).collect();
        let count = ids.len() as u64;
        for id in ids {
            state.queue.insert(
                id,
                QueueEntry {
                    mode: mode.to_string(),
                    status: QueueStatus::Pending,
                },
            );
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: CursorValue) -> ScoreRecord {
        ScoreRecord {
            id,
            ruleset: "osu".into(),
            active: true,
            payload: serde_json::Value::Null,
        }
    }

    struct NoopDescriptor;

    impl RecordDescriptor for NoopDescriptor {
        fn type_name(&self) -> &'static str {
            "osu"
        }
        fn cursor_column(&self) -> &'static str {
            "id"
        }
        fn select_clause(&self) -> &'static str {
            "*"
        }
        fn max_expression(&self) -> &'static str {
            "MAX(id)"
        }
        fn queue_mode(&self) -> &'static str {
            "osu"
        }
        fn table(&self) -> &'static str {
            "scores"
        }
        fn decode(&self, _row: &score_indexer_core::RawRow) -> Result<ScoreRecord, Error> {
            unreachable!("not exercised by these tests")
        }
    }

    #[tokio::test]
    async fn scan_page_respects_cursor_bounds_and_batch_size() {
        let source = FakeRecordSource::new();
        for id in 1..=10 {
            source.seed_row(record(id));
        }

        let page = source.scan_page(&NoopDescriptor, 2, 10, 3).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn ack_then_rewind_makes_entries_pending_again() {
        let source = FakeRecordSource::new();
        source.seed_row(record(1));
        source.seed_pending(1, "osu");

        source.ack(&[1]).await.unwrap();
        assert_eq!(source.highest_completed("osu").await.unwrap(), Some(1));
        assert!(source.poll_pending("osu", 10).await.unwrap().is_empty());

        let rewound = source.rewind_to("osu", 0).await.unwrap();
        assert_eq!(rewound, 1);
        assert_eq!(source.poll_pending("osu", 10).await.unwrap(), vec![1]);
    }
}
