use async_trait::async_trait;
use score_indexer_core::{CursorValue, Error, RecordDescriptor, ScoreRecord};

/// The cursor-scanned side of the relational source: read once at rebuild
/// startup to bound the scan, then paged through in cursor order.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// `SELECT {max_expression} FROM {table}`, read once per rebuild to
    /// bound the scan.
    async fn read_max(&self, descriptor: &dyn RecordDescriptor) -> Result<CursorValue, Error>;

    /// One page of the cursor scan, `last` exclusive through `max`
    /// inclusive. Returns an empty vec when the scan has caught up to
    /// `max`.
    async fn scan_page(
        &self,
        descriptor: &dyn RecordDescriptor,
        last: CursorValue,
        max: CursorValue,
        batch_size: i64,
    ) -> Result<Vec<ScoreRecord>, Error>;
}

/// The work-queue side of the relational source: polled by live-mode
/// readers, rewound on alias commit, and written wholesale by `pump`.
#[async_trait]
pub trait RecordQueue: Send + Sync {
    /// Pending entries for `mode`, oldest first, up to `batch_size`.
    async fn poll_pending(&self, mode: &str, batch_size: i64) -> Result<Vec<CursorValue>, Error>;

    /// The records behind a page of queued ids, filtered by
    /// [`score_indexer_core::Record::should_index`] — callers emit a
    /// delete for any id with no returned record.
    async fn fetch_records(
        &self,
        descriptor: &dyn RecordDescriptor,
        ids: &[CursorValue],
    ) -> Result<Vec<ScoreRecord>, Error>;

    /// Marks queue ids completed.
    async fn ack(&self, ids: &[CursorValue]) -> Result<(), Error>;

    /// Highest completed id for `mode`, used to bootstrap `reset_queue_to`
    /// on a fresh rebuild.
    async fn highest_completed(&self, mode: &str) -> Result<Option<CursorValue>, Error>;

    /// Rewinds the queue so every entry for `mode` past `id` is replayed —
    /// used on alias commit when `reset_queue_to` is set.
    async fn rewind_to(&self, mode: &str, id: CursorValue) -> Result<u64, Error>;

    /// `pump all [--from N]`: enqueues every existing row for `mode` (past
    /// `from_id` if given) as a fresh pending entry.
    async fn enqueue_all(
        &self,
        descriptor: &dyn RecordDescriptor,
        mode: &str,
        from_id: Option<CursorValue>,
    ) -> Result<u64, Error>;
}
