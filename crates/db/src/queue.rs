use std::sync::Mutex;

use async_trait::async_trait;
use postgres::{Client, NoTls};
use score_indexer_core::{CursorValue, Error, RecordDescriptor, ScoreRecord};

use crate::row::row_to_raw;
use crate::traits::RecordQueue;

const QUEUE_TABLE: &str = "score_process_queue";

const STATUS_PENDING: i32 = 1;
const STATUS_DONE: i32 = 2;

/// The work queue: a `(score_id, status, mode)` table polled by live-mode
/// readers and written by `pump`. `postgres::Client` is synchronous, so
/// every call into it runs inside `tokio::task::block_in_place`.
pub struct WorkQueue {
    client: Mutex<Client>,
}

impl WorkQueue {
    pub fn connect(connection_string: &str) -> Result<Self, Error> {
        let client = Client::connect(connection_string, NoTls).map_err(Error::storage)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl RecordQueue for WorkQueue {
    async fn poll_pending(&self, mode: &str, batch_size: i64) -> Result<Vec<CursorValue>, Error> {
        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            let rows = client
                .query(
                    &format!(
                        "SELECT score_id FROM {QUEUE_TABLE} WHERE status = $1 AND mode = $2 ORDER BY score_id ASC LIMIT $3"
                    ),
                    &[&STATUS_PENDING, &mode, &batch_size],
                )
                .map_err(Error::storage)?;

            rows.iter()
                .map(|row| row.try_get::<_, i64>("score_id").map_err(Error::storage))
                .collect()
        })
    }

    async fn fetch_records(
        &self,
        descriptor: &dyn RecordDescriptor,
        ids: &[CursorValue],
    ) -> Result<Vec<ScoreRecord>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {select} FROM {table} WHERE {cursor} = ANY($1)",
            select = descriptor.select_clause(),
            table = descriptor.table(),
            cursor = descriptor.cursor_column(),
        );

        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            let rows = client.query(&query, &[&ids]).map_err(Error::storage)?;

            rows.iter()
                .map(|row| descriptor.decode(&row_to_raw(row)))
                .collect()
        })
    }

    async fn ack(&self, ids: &[CursorValue]) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }
        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            client
                .execute(
                    &format!("UPDATE {QUEUE_TABLE} SET status = $1 WHERE score_id = ANY($2)"),
                    &[&STATUS_DONE, &ids],
                )
                .map_err(Error::storage)?;
            Ok(())
        })
    }

    async fn highest_completed(&self, mode: &str) -> Result<Option<CursorValue>, Error> {
        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            let row = client
                .query_one(
                    &format!("SELECT MAX(score_id) AS max_id FROM {QUEUE_TABLE} WHERE status = $1 AND mode = $2"),
                    &[&STATUS_DONE, &mode],
                )
                .map_err(Error::storage)?;
            row.try_get("max_id").map_err(Error::storage)
        })
    }

    async fn rewind_to(&self, mode: &str, id: CursorValue) -> Result<u64, Error> {
        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            client
                .execute(
                    &format!("UPDATE {QUEUE_TABLE} SET status = $1 WHERE mode = $2 AND score_id > $3"),
                    &[&STATUS_PENDING, &mode, &id],
                )
                .map_err(Error::storage)
        })
    }

    async fn enqueue_all(
        &self,
        descriptor: &dyn RecordDescriptor,
        mode: &str,
        from_id: Option<CursorValue>,
    ) -> Result<u64, Error> {
        let query = format!(
            "INSERT INTO {QUEUE_TABLE} (score_id, status, mode) \
             SELECT {cursor}, $1, $2 FROM {table} WHERE {cursor} > $3 \
             ON CONFLICT (score_id, mode) DO UPDATE SET status = $1",
            cursor = descriptor.cursor_column(),
            table = descriptor.table(),
        );

        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            client
                .execute(&query, &[&STATUS_PENDING, &mode, &from_id.unwrap_or(0)])
                .map_err(Error::storage)
        })
    }
}
