//! Thin contract over the shared key-value coordination store: a single
//! `current_schema` string and an `active_schemas` set, used to coordinate
//! alias switchover across concurrent indexer processes.

pub mod redis_store;

#[cfg(feature = "testing")]
pub mod testing;

use async_trait::async_trait;
use score_indexer_core::Error;

pub use redis_store::RedisCoordinationStore;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get_current_schema(&self) -> Result<Option<String>, Error>;
    async fn set_current_schema(&self, schema: &str) -> Result<(), Error>;
    async fn clear_current_schema(&self) -> Result<(), Error>;

    async fn add_active_schema(&self, index_name: &str) -> Result<(), Error>;
    async fn remove_active_schema(&self, index_name: &str) -> Result<(), Error>;
    async fn active_schemas(&self) -> Result<Vec<String>, Error>;
}
