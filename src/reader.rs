//! SourceReader stage: produces ordered [`Chunk`]s either from a
//! cursor-scanned database table (rebuild) or the work queue (live).
//!
//! Follows the usual `bootstrap`/`schedule`/`execute` gasket shape;
//! `or_restart()` on the scan/poll queries retries transient source errors
//! locally without advancing the cursor.

use std::sync::Arc;
use std::time::Duration;

use gasket::framework::*;
use score_indexer_core::{Chunk, CursorValue, DescriptorRegistry, Error, ScoreRecord};
use score_indexer_db::{RecordQueue, RecordSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type DownstreamPort = gasket::messaging::tokio::OutputPort<Chunk<ScoreRecord>>;

/// Selects which of the two reading strategies a [`Stage`] runs.
pub enum Mode {
    /// Cursor-scan the source table up to a `max` read once at startup.
    Rebuild { max: CursorValue },
    /// Poll the work queue for `ruleset`-tagged entries.
    Live,
}

pub enum WorkUnit {
    Scan,
    Poll,
}

#[derive(Stage)]
#[stage(name = "reader", unit = "WorkUnit", worker = "Worker")]
pub struct Stage {
    source: Option<Arc<dyn RecordSource>>,
    queue: Option<Arc<dyn RecordQueue>>,
    ruleset: String,
    batch_size: i64,
    read_delay: Duration,
    registry: Arc<DescriptorRegistry>,
    mode: Mode,
    last_id: CursorValue,
    stop: CancellationToken,

    pub downstream: DownstreamPort,

    #[metric]
    chunks_emitted: gasket::metrics::Counter,

    #[metric]
    records_emitted: gasket::metrics::Counter,
}

impl Stage {
    pub fn new_rebuild(
        source: Arc<dyn RecordSource>,
        ruleset: String,
        batch_size: i64,
        last_id: CursorValue,
        max: CursorValue,
        registry: Arc<DescriptorRegistry>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            source: Some(source),
            queue: None,
            ruleset,
            batch_size,
            read_delay: Duration::ZERO,
            registry,
            mode: Mode::Rebuild { max },
            last_id,
            stop,
            downstream: Default::default(),
            chunks_emitted: Default::default(),
            records_emitted: Default::default(),
        }
    }

    pub fn new_live(
        queue: Arc<dyn RecordQueue>,
        ruleset: String,
        batch_size: i64,
        read_delay: Duration,
        registry: Arc<DescriptorRegistry>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            source: None,
            queue: Some(queue),
            ruleset,
            batch_size,
            read_delay,
            registry,
            mode: Mode::Live,
            last_id: 0,
            stop,
            downstream: Default::default(),
            chunks_emitted: Default::default(),
            records_emitted: Default::default(),
        }
    }

    fn caught_up(&self) -> bool {
        matches!(self.mode, Mode::Rebuild { max } if self.last_id >= max)
    }
}

/// Holds the [`RecordSource`]/[`RecordQueue`] handles cloned out of the
/// `Stage`. Bootstrap is infallible since the collaborator is already
/// connected by the time the stage is spawned.
pub struct Worker {
    source: Option<Arc<dyn RecordSource>>,
    queue: Option<Arc<dyn RecordQueue>>,
}

#[async_trait::async_trait(?Send)]
impl gasket::framework::Worker<Stage> for Worker {
    async fn bootstrap(stage: &Stage) -> Result<Self, WorkerError> {
        Ok(Self {
            source: stage.source.clone(),
            queue: stage.queue.clone(),
        })
    }

    async fn schedule(&mut self, stage: &mut Stage) -> Result<WorkSchedule<WorkUnit>, WorkerError> {
        if stage.stop.is_cancelled() {
            return Ok(WorkSchedule::Done);
        }

        if stage.caught_up() {
            info!(ruleset = %stage.ruleset, last_id = stage.last_id, "cursor scan caught up");
            return Ok(WorkSchedule::Done);
        }

        match stage.mode {
            Mode::Rebuild { .. } => Ok(WorkSchedule::Unit(WorkUnit::Scan)),
            Mode::Live => {
                if !stage.read_delay.is_zero() {
                    tokio::time::sleep(stage.read_delay).await;
                }
                Ok(WorkSchedule::Unit(WorkUnit::Poll))
            }
        }
    }

    async fn execute(&mut self, unit: &WorkUnit, stage: &mut Stage) -> Result<(), WorkerError> {
        match unit {
            WorkUnit::Scan => self.execute_scan(stage).await,
            WorkUnit::Poll => self.execute_poll(stage).await,
        }
    }
}

impl Worker {
    async fn execute_scan(&mut self, stage: &mut Stage) -> Result<(), WorkerError> {
        let Mode::Rebuild { max } = stage.mode else {
            unreachable!("execute_scan only runs in rebuild mode")
        };

        let source = self.source.as_ref().expect("bootstrapped in rebuild mode");
        let descriptor = stage
            .registry
            .get(&stage.ruleset)
            .ok_or_else(|| Error::message(format!("no descriptor registered for {}", stage.ruleset)))
            .or_panic()?;

        let last = stage.last_id;
        let batch_size = stage.batch_size;

        let records = source.scan_page(descriptor, last, max, batch_size).await.or_restart()?;

        if records.is_empty() {
            debug!(ruleset = %stage.ruleset, last, max, "scan page empty, caught up");
            stage.last_id = max;
            return Ok(());
        }

        let last_cursor = records
            .iter()
            .map(|r| r.id)
            .max()
            .expect("non-empty checked above");

        stage.chunks_emitted.inc(1);
        stage.records_emitted.inc(records.len() as u64);

        stage
            .downstream
            .send(Chunk::Adds(records).into())
            .await
            .or_panic()?;

        stage.last_id = last_cursor;

        Ok(())
    }

    async fn execute_poll(&mut self, stage: &mut Stage) -> Result<(), WorkerError> {
        let queue = self.queue.as_ref().expect("bootstrapped in live mode");
        let descriptor = stage
            .registry
            .get(&stage.ruleset)
            .ok_or_else(|| Error::message(format!("no descriptor registered for {}", stage.ruleset)))
            .or_panic()?;

        let ruleset = stage.ruleset.clone();
        let batch_size = stage.batch_size;

        let ids = queue.poll_pending(&ruleset, batch_size).await.or_restart()?;

        if ids.is_empty() {
            return Ok(());
        }

        let records = queue.fetch_records(descriptor, &ids).await.or_restart()?;

        let (adds, deletes) = split_adds_and_deletes(&ids, records);

        queue.ack(&ids).await.or_restart()?;

        if adds.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        stage.chunks_emitted.inc(1);
        stage.records_emitted.inc((adds.len() + deletes.len()) as u64);

        if !deletes.is_empty() {
            warn!(ruleset = %stage.ruleset, count = deletes.len(), "emitting deletes for queued ids with no record");
        }

        stage
            .downstream
            .send(Chunk::Mixed { adds, deletes }.into())
            .await
            .or_panic()?;

        Ok(())
    }
}

/// Splits a page of fetched records into adds and deletes: a record is an
/// add when `should_index()` is true, a delete otherwise, and any queued id
/// absent from `records` entirely is also a delete (the source table no
/// longer has a row for it).
fn split_adds_and_deletes(
    ids: &[CursorValue],
    records: Vec<ScoreRecord>,
) -> (Vec<ScoreRecord>, Vec<CursorValue>) {
    let (adds, rejected): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| score_indexer_core::Record::should_index(r));

    let returned_ids: std::collections::HashSet<CursorValue> = adds
        .iter()
        .map(|r| r.id)
        .chain(rejected.iter().map(|r| r.id))
        .collect();

    let mut deletes: Vec<CursorValue> = rejected.iter().map(|r| r.id).collect();
    deletes.extend(ids.iter().copied().filter(|id| !returned_ids.contains(id)));

    (adds, deletes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: CursorValue, active: bool) -> ScoreRecord {
        ScoreRecord {
            id,
            ruleset: "osu".into(),
            active,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn missing_record_becomes_a_delete() {
        let ids = vec![1, 2, 3];
        let records = vec![record(1, true), record(2, true)];

        let (adds, deletes) = split_adds_and_deletes(&ids, records);

        assert_eq!(adds.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(deletes, vec![3]);
    }

    #[test]
    fn record_failing_should_index_becomes_a_delete() {
        let ids = vec![42];
        let records = vec![record(42, false)];

        let (adds, deletes) = split_adds_and_deletes(&ids, records);

        assert!(adds.is_empty());
        assert_eq!(deletes, vec![42]);
    }

    #[test]
    fn mixed_page_sorts_each_id_into_exactly_one_bucket() {
        let ids = vec![1, 2, 3, 4];
        let records = vec![record(1, true), record(2, false), record(3, true)];

        let (adds, deletes) = split_adds_and_deletes(&ids, records);

        assert_eq!(adds.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        let mut deletes = deletes;
        deletes.sort_unstable();
        assert_eq!(deletes, vec![2, 4]);
    }
}
