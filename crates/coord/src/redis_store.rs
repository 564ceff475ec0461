use async_trait::async_trait;
use redis::AsyncCommands;
use score_indexer_core::Error;

use crate::CoordinationStore;

/// Redis-backed coordination store. Pool/connection handling mirrors the
/// rest of this codebase's Redis-backed stores: a `deadpool_redis::Pool`
/// created once at startup, one connection checked out per operation.
pub struct RedisCoordinationStore {
    pool: deadpool_redis::Pool,
    key_prefix: String,
}

impl RedisCoordinationStore {
    pub fn open(url: &str, key_prefix: impl Into<String>) -> Result<Self, Error> {
        let cfg = deadpool_redis::Config::from_url(url);
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(Error::client)?;

        Ok(Self {
            pool,
            key_prefix: key_prefix.into(),
        })
    }

    fn current_schema_key(&self) -> String {
        format!("{}:current_schema", self.key_prefix)
    }

    fn active_schemas_key(&self) -> String {
        format!("{}:active_schemas", self.key_prefix)
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn get_current_schema(&self) -> Result<Option<String>, Error> {
        let mut conn = self.pool.get().await.map_err(Error::client)?;
        conn.get(self.current_schema_key()).await.map_err(Error::client)
    }

    async fn set_current_schema(&self, schema: &str) -> Result<(), Error> {
        let mut conn = self.pool.get().await.map_err(Error::client)?;
        conn.set(self.current_schema_key(), schema).await.map_err(Error::client)
    }

    async fn clear_current_schema(&self) -> Result<(), Error> {
        let mut conn = self.pool.get().await.map_err(Error::client)?;
        conn.del(self.current_schema_key()).await.map_err(Error::client)
    }

    async fn add_active_schema(&self, index_name: &str) -> Result<(), Error> {
        let mut conn = self.pool.get().await.map_err(Error::client)?;
        conn.sadd(self.active_schemas_key(), index_name)
            .await
            .map_err(Error::client)
    }

    async fn remove_active_schema(&self, index_name: &str) -> Result<(), Error> {
        let mut conn = self.pool.get().await.map_err(Error::client)?;
        conn.srem(self.active_schemas_key(), index_name)
            .await
            .map_err(Error::client)
    }

    async fn active_schemas(&self) -> Result<Vec<String>, Error> {
        let mut conn = self.pool.get().await.map_err(Error::client)?;
        conn.smembers(self.active_schemas_key()).await.map_err(Error::client)
    }
}
