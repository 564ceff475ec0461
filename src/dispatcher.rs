//! BulkDispatcher stage: ships chunks to the search cluster in bulk
//! requests with adaptive throttling, whole-chunk retry, and an
//! index-closed bail-out.
//!
//! A single gasket `Stage` fans concurrent work out to spawned tokio tasks,
//! one per in-flight bulk request, bounded by a semaphore. `schedule`
//! prefers a retry channel over fresh input via `tokio::select!`, so a
//! chunk that needs to be resent never waits behind new work.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gasket::framework::*;
use score_indexer_core::{Chunk, CursorValue, IndexName, ScoreRecord};
use score_indexer_search::SearchClient;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub type UpstreamPort = gasket::messaging::tokio::InputPort<Chunk<ScoreRecord>>;

const DELAY_CAP: i64 = 30;

#[derive(Stage)]
#[stage(name = "dispatcher", unit = "Chunk<ScoreRecord>", worker = "Worker")]
pub struct Stage {
    index: IndexName,
    search: Arc<dyn SearchClient>,

    retry_tx: mpsc::Sender<Chunk<ScoreRecord>>,
    retry_rx: std::sync::Mutex<Option<mpsc::Receiver<Chunk<ScoreRecord>>>>,

    /// Reported to the Indexer's serialized Metadata writer.
    completion_tx: mpsc::Sender<CursorValue>,

    workers: Arc<Semaphore>,
    inflight: Arc<Semaphore>,
    delay: Arc<AtomicI64>,

    /// Set when the search cluster reports `index_closed_exception`; tells
    /// the reader to stop without a back-reference to the Indexer.
    pub index_closed: Arc<AtomicBool>,
    stop: CancellationToken,

    pub upstream: UpstreamPort,

    #[metric]
    chunks_dispatched: gasket::metrics::Counter,
}

impl Stage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: IndexName,
        search: Arc<dyn SearchClient>,
        max_parallel_dispatch: usize,
        queue_capacity: usize,
        completion_tx: mpsc::Sender<CursorValue>,
        index_closed: Arc<AtomicBool>,
        stop: CancellationToken,
    ) -> Self {
        let (retry_tx, retry_rx) = mpsc::channel(queue_capacity.max(1));

        Self {
            index,
            search,
            retry_tx,
            retry_rx: std::sync::Mutex::new(Some(retry_rx)),
            completion_tx,
            workers: Arc::new(Semaphore::new(max_parallel_dispatch.max(1))),
            inflight: Arc::new(Semaphore::new((queue_capacity.max(1)) * 2)),
            delay: Arc::new(AtomicI64::new(0)),
            index_closed,
            stop,
            upstream: Default::default(),
            chunks_dispatched: Default::default(),
        }
    }
}

enum Next {
    Chunk(Chunk<ScoreRecord>),
    Done,
}

pub struct Worker {
    retry_rx: mpsc::Receiver<Chunk<ScoreRecord>>,
    tasks: JoinSet<()>,
    upstream_closed: bool,
}

#[async_trait::async_trait(?Send)]
impl gasket::framework::Worker<Stage> for Worker {
    async fn bootstrap(stage: &Stage) -> Result<Self, WorkerError> {
        let retry_rx = stage
            .retry_rx
            .lock()
            .expect("not poisoned")
            .take()
            .expect("bootstrap runs exactly once");

        Ok(Self {
            retry_rx,
            tasks: JoinSet::new(),
            upstream_closed: false,
        })
    }

    async fn schedule(
        &mut self,
        stage: &mut Stage,
    ) -> Result<WorkSchedule<Chunk<ScoreRecord>>, WorkerError> {
        // Reap finished dispatch tasks without blocking on them.
        while self.tasks.try_join_next().is_some() {}

        loop {
            if let Ok(chunk) = self.retry_rx.try_recv() {
                return Ok(WorkSchedule::Unit(chunk));
            }

            if self.upstream_closed && self.tasks.is_empty() {
                return Ok(WorkSchedule::Done);
            }

            if self.upstream_closed {
                // Draining: wait for outstanding dispatches, then retry the
                // empty-retry-channel-and-no-tasks check above.
                self.tasks.join_next().await;
                continue;
            }

            tokio::select! {
                biased;
                Some(chunk) = self.retry_rx.recv() => return Ok(WorkSchedule::Unit(chunk)),
                msg = stage.upstream.recv() => {
                    match msg {
                        Ok(msg) => return Ok(WorkSchedule::Unit(msg.payload)),
                        Err(_) => {
                            self.upstream_closed = true;
                        }
                    }
                }
            }
        }
    }

    async fn execute(
        &mut self,
        unit: &Chunk<ScoreRecord>,
        stage: &mut Stage,
    ) -> Result<(), WorkerError> {
        let chunk = unit.clone();
        if chunk.is_empty() {
            return Ok(());
        }

        let delay_ticks = stage.delay.load(Ordering::SeqCst);
        if delay_ticks > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ticks as u64 * 100)).await;
        }

        let workers_permit = stage
            .workers
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        let inflight_permit = stage
            .inflight
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");

        let search = stage.search.clone();
        let index = stage.index.clone();
        let retry_tx = stage.retry_tx.clone();
        let completion_tx = stage.completion_tx.clone();
        let delay = stage.delay.clone();
        let index_closed = stage.index_closed.clone();
        let stop = stage.stop.clone();

        stage.chunks_dispatched.inc(1);

        self.tasks.spawn(async move {
            dispatch_one(search, index, chunk, retry_tx, completion_tx, delay, index_closed, stop).await;
            drop(workers_permit);
            drop(inflight_permit);
        });

        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_one(
    search: Arc<dyn SearchClient>,
    index: IndexName,
    chunk: Chunk<ScoreRecord>,
    retry_tx: mpsc::Sender<Chunk<ScoreRecord>>,
    completion_tx: mpsc::Sender<CursorValue>,
    delay: Arc<AtomicI64>,
    index_closed: Arc<AtomicBool>,
    stop: CancellationToken,
) {
    let result = search.bulk(&index, chunk.adds(), chunk.delete_ids()).await;

    match result {
        Ok(r) if r.has_index_closed() => {
            error!(%index, "search cluster reports index closed, abandoning run");
            index_closed.store(true, Ordering::SeqCst);
            stop.cancel();
        }
        Ok(r) if r.has_reject_retry() => {
            let prev = delay.fetch_add(1, Ordering::SeqCst);
            if prev + 1 > DELAY_CAP {
                delay.store(DELAY_CAP, Ordering::SeqCst);
            }
            warn!(%index, "bulk request rejected, requeueing whole chunk");
            let _ = retry_tx.send(chunk).await;
        }
        Ok(r) => {
            for item in &r.other {
                error!(%index, status = item.status, error = ?item.error, "bulk item error, not retried");
            }

            if let Some(last) = chunk.last_cursor_value() {
                let _ = completion_tx.send(last).await;
            }

            let mut cur = delay.load(Ordering::SeqCst);
            while cur > 0 {
                match delay.compare_exchange(cur, cur - 1, Ordering::SeqCst, Ordering::SeqCst) {
                    Ok(_) => break,
                    Err(observed) => cur = observed,
                }
            }
        }
        Err(err) => {
            error!(%index, %err, "bulk request failed, requeueing whole chunk");
            let _ = retry_tx.send(chunk).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use score_indexer_core::{Alias, Record};
    use score_indexer_search::testing::{BulkOutcome, FakeSearchClient};

    fn one_add_chunk() -> Chunk<ScoreRecord> {
        Chunk::Adds(vec![ScoreRecord {
            id: 7,
            ruleset: "osu".into(),
            active: true,
            payload: serde_json::Value::Null,
        }])
    }

    async fn run_dispatch_one(
        search: Arc<dyn SearchClient>,
        chunk: Chunk<ScoreRecord>,
        delay: Arc<AtomicI64>,
    ) -> (Option<CursorValue>, Option<Chunk<ScoreRecord>>, bool) {
        let index = IndexName::new(&Alias::new("scores_osu"), Utc::now());
        let (retry_tx, mut retry_rx) = mpsc::channel(4);
        let (completion_tx, mut completion_rx) = mpsc::channel(4);
        let index_closed = Arc::new(AtomicBool::new(false));
        let stop = CancellationToken::new();

        dispatch_one(
            search,
            index,
            chunk,
            retry_tx,
            completion_tx,
            delay,
            index_closed.clone(),
            stop,
        )
        .await;

        (
            completion_rx.try_recv().ok(),
            retry_rx.try_recv().ok(),
            index_closed.load(Ordering::SeqCst),
        )
    }

    #[tokio::test]
    async fn successful_dispatch_reports_completion_and_decrements_delay() {
        let search = Arc::new(FakeSearchClient::new());
        let delay = Arc::new(AtomicI64::new(3));

        let (completed, retried, closed) =
            run_dispatch_one(search.clone(), one_add_chunk(), delay.clone()).await;

        assert_eq!(completed, Some(7));
        assert!(retried.is_none());
        assert!(!closed);
        assert_eq!(delay.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reject_retry_requeues_whole_chunk_and_raises_delay() {
        let search = Arc::new(FakeSearchClient::new());
        search.script_bulk([BulkOutcome::RejectRetry]);
        let delay = Arc::new(AtomicI64::new(0));

        let (completed, retried, closed) =
            run_dispatch_one(search.clone(), one_add_chunk(), delay.clone()).await;

        assert!(completed.is_none());
        assert!(retried.is_some());
        assert_eq!(retried.unwrap().adds()[0].cursor_value(), 7);
        assert!(!closed);
        assert_eq!(delay.load(Ordering::SeqCst), 1);
    }

    /// Models S3: a 429 on the first attempt, success on the retry — the
    /// chunk is eventually delivered and `delay` returns to its floor.
    #[tokio::test]
    async fn retry_convergence_after_one_rejection() {
        let search = Arc::new(FakeSearchClient::new());
        search.script_bulk([BulkOutcome::RejectRetry]);
        let delay = Arc::new(AtomicI64::new(0));

        let (completed, retried, _) =
            run_dispatch_one(search.clone(), one_add_chunk(), delay.clone()).await;
        assert!(completed.is_none());
        assert_eq!(delay.load(Ordering::SeqCst), 1);

        let requeued = retried.expect("first attempt requeues");
        let (completed, retried, closed) = run_dispatch_one(search, requeued, delay.clone()).await;

        assert_eq!(completed, Some(7));
        assert!(retried.is_none());
        assert!(!closed);
        assert_eq!(delay.load(Ordering::SeqCst), 0);
    }

    /// Models S4: an index-closed response sets the shared flag and
    /// cancels the stop token without requeueing or reporting completion.
    #[tokio::test]
    async fn index_closed_sets_flag_and_cancels_without_retry() {
        let search = Arc::new(FakeSearchClient::new());
        search.script_bulk([BulkOutcome::IndexClosed]);
        let delay = Arc::new(AtomicI64::new(0));

        let index = IndexName::new(&Alias::new("scores_osu"), Utc::now());
        let (retry_tx, mut retry_rx) = mpsc::channel(4);
        let (completion_tx, mut completion_rx) = mpsc::channel(4);
        let index_closed = Arc::new(AtomicBool::new(false));
        let stop = CancellationToken::new();

        dispatch_one(
            search,
            index,
            one_add_chunk(),
            retry_tx,
            completion_tx,
            delay,
            index_closed.clone(),
            stop.clone(),
        )
        .await;

        assert!(index_closed.load(Ordering::SeqCst));
        assert!(stop.is_cancelled());
        assert!(completion_rx.try_recv().is_err());
        assert!(retry_rx.try_recv().is_err());
    }
}
