use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use score_indexer_core::Error;

use crate::CoordinationStore;

#[derive(Default)]
struct State {
    current_schema: Option<String>,
    active_schemas: HashSet<String>,
}

/// An in-memory [`CoordinationStore`] fake for tests.
#[derive(Default)]
pub struct FakeCoordinationStore {
    state: Mutex<State>,
}

impl FakeCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for FakeCoordinationStore {
    async fn get_current_schema(&self) -> Result<Option<String>, Error> {
        Ok(self.state.lock().unwrap().current_schema.clone())
    }

    async fn set_current_schema(&self, schema: &str) -> Result<(), Error> {
        self.state.lock().unwrap().current_schema = Some(schema.to_string());
        Ok(())
    }

    async fn clear_current_schema(&self) -> Result<(), Error> {
        self.state.lock().unwrap().current_schema = None;
        Ok(())
    }

    async fn add_active_schema(&self, index_name: &str) -> Result<(), Error> {
        self.state.lock().unwrap().active_schemas.insert(index_name.to_string());
        Ok(())
    }

    async fn remove_active_schema(&self, index_name: &str) -> Result<(), Error> {
        self.state.lock().unwrap().active_schemas.remove(index_name);
        Ok(())
    }

    async fn active_schemas(&self) -> Result<Vec<String>, Error> {
        Ok(self.state.lock().unwrap().active_schemas.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_current_schema() {
        let store = FakeCoordinationStore::new();
        assert_eq!(store.get_current_schema().await.unwrap(), None);
        store.set_current_schema("v7").await.unwrap();
        assert_eq!(store.get_current_schema().await.unwrap(), Some("v7".to_string()));
        store.clear_current_schema().await.unwrap();
        assert_eq!(store.get_current_schema().await.unwrap(), None);
    }

    #[tokio::test]
    async fn active_schemas_set_semantics() {
        let store = FakeCoordinationStore::new();
        store.add_active_schema("scores_v7").await.unwrap();
        store.add_active_schema("scores_v8").await.unwrap();
        let mut schemas = store.active_schemas().await.unwrap();
        schemas.sort();
        assert_eq!(schemas, vec!["scores_v7".to_string(), "scores_v8".to_string()]);

        store.remove_active_schema("scores_v7").await.unwrap();
        assert_eq!(store.active_schemas().await.unwrap(), vec!["scores_v8".to_string()]);
    }
}
