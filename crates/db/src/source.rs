use std::sync::Mutex;

use async_trait::async_trait;
use postgres::{Client, NoTls};
use score_indexer_core::{CursorValue, Error, RecordDescriptor, ScoreRecord};

use crate::row::row_to_raw;
use crate::traits::RecordSource;

/// A connection to the relational source of truth. One per reader
/// activity, not a pool. `postgres::Client` is synchronous, so every call
/// into it runs inside `tokio::task::block_in_place`; the `Mutex` only
/// exists to give the trait's `&self` methods somewhere to put it.
pub struct SourceDb {
    client: Mutex<Client>,
}

impl SourceDb {
    pub fn connect(connection_string: &str) -> Result<Self, Error> {
        let client = Client::connect(connection_string, NoTls).map_err(Error::storage)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl RecordSource for SourceDb {
    async fn read_max(&self, descriptor: &dyn RecordDescriptor) -> Result<CursorValue, Error> {
        let query = format!(
            "SELECT {} AS max_value FROM {}",
            descriptor.max_expression(),
            descriptor.table()
        );
        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            let row = client.query_one(&query, &[]).map_err(Error::storage)?;
            let max_value: Option<i64> = row.try_get("max_value").map_err(Error::storage)?;
            Ok(max_value.unwrap_or(0))
        })
    }

    /// `SELECT {select_clause} FROM {table} WHERE {cursor_column} > $1 AND
    /// {cursor_column} <= $2 [AND {extra_where}] ORDER BY {cursor_column}
    /// ASC LIMIT $3`.
    ///
    /// Callers should not advance their cursor on error (transient driver
    /// failures are the caller's responsibility to retry).
    async fn scan_page(
        &self,
        descriptor: &dyn RecordDescriptor,
        last: CursorValue,
        max: CursorValue,
        batch_size: i64,
    ) -> Result<Vec<ScoreRecord>, Error> {
        let extra_where = descriptor
            .extra_where()
            .map(|clause| format!(" AND {clause}"))
            .unwrap_or_default();

        let query = format!(
            "SELECT {select} FROM {table} WHERE {cursor} > $1 AND {cursor} <= $2{extra} ORDER BY {cursor} ASC LIMIT $3",
            select = descriptor.select_clause(),
            table = descriptor.table(),
            cursor = descriptor.cursor_column(),
            extra = extra_where,
        );

        tokio::task::block_in_place(|| {
            let mut client = self.client.lock().unwrap();
            let rows = client
                .query(&query, &[&last, &max, &batch_size])
                .map_err(Error::storage)?;

            rows.iter()
                .map(|row| descriptor.decode(&row_to_raw(row)))
                .collect()
        })
    }
}
