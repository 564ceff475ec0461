//! A hand-rolled, in-memory [`SearchClient`] fake for exercising the
//! pipeline without a real search cluster. Mirrors the "toy domain" style of
//! fake used for testing elsewhere in this codebase rather than a mocking
//! framework.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use score_indexer_core::{Alias, CursorValue, Error, IndexName, ScoreRecord};

use crate::bulk::{BulkItemResult, BulkResult};
use crate::client::SearchClient;

/// A scripted outcome for the next `bulk()` call. Defaults to `Success` when
/// the script is exhausted.
#[derive(Debug, Clone, Copy)]
pub enum BulkOutcome {
    Success,
    RejectRetry,
    IndexClosed,
}

#[derive(Default)]
struct State {
    metas: HashMap<IndexName, serde_json::Value>,
    created: HashSet<IndexName>,
    aliases: HashMap<String, Vec<IndexName>>,
    closed: HashSet<IndexName>,
    bulk_script: VecDeque<BulkOutcome>,
    bulk_calls: Vec<(IndexName, usize, usize)>,
}

pub struct FakeSearchClient {
    state: Mutex<State>,
}

impl Default for FakeSearchClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl FakeSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next N `bulk()` calls, in order.
    pub fn script_bulk(&self, outcomes: impl IntoIterator<Item = BulkOutcome>) {
        self.state.lock().unwrap().bulk_script.extend(outcomes);
    }

    pub fn is_closed(&self, index: &IndexName) -> bool {
        self.state.lock().unwrap().closed.contains(index)
    }

    pub fn was_created(&self, index: &IndexName) -> bool {
        self.state.lock().unwrap().created.contains(index)
    }

    pub fn bulk_call_count(&self) -> usize {
        self.state.lock().unwrap().bulk_calls.len()
    }
}

#[async_trait]
impl SearchClient for FakeSearchClient {
    async fn create_index(&self, name: &IndexName, _mapping_path: &Path) -> Result<(), Error> {
        self.state.lock().unwrap().created.insert(name.clone());
        Ok(())
    }

    async fn bulk(
        &self,
        index: &IndexName,
        adds: &[ScoreRecord],
        deletes: &[CursorValue],
    ) -> Result<BulkResult, Error> {
        let mut state = self.state.lock().unwrap();
        state
            .bulk_calls
            .push((index.clone(), adds.len(), deletes.len()));

        let outcome = state.bulk_script.pop_front().unwrap_or(BulkOutcome::Success);

        let item = |status: u16, kind: Option<&str>| BulkItemResult {
            _id: None,
            status,
            error: kind.map(|k| crate::bulk::BulkItemError {
                kind: k.to_string(),
                reason: None,
            }),
        };

        let result = match outcome {
            BulkOutcome::Success => BulkResult::default(),
            BulkOutcome::RejectRetry => BulkResult {
                reject_retry: vec![item(429, Some("es_rejected_execution_exception"))],
                ..Default::default()
            },
            BulkOutcome::IndexClosed => BulkResult {
                index_closed: vec![item(400, Some("index_closed_exception"))],
                ..Default::default()
            },
        };

        Ok(result)
    }

    async fn update_alias(
        &self,
        alias: &Alias,
        new_index: &IndexName,
        remove_from: &[IndexName],
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let targets = state.aliases.entry(alias.as_str().to_string()).or_default();
        targets.retain(|t| !remove_from.contains(t));
        if !targets.contains(new_index) {
            targets.push(new_index.clone());
        }
        Ok(())
    }

    async fn close_index(&self, index: &IndexName) -> Result<(), Error> {
        self.state.lock().unwrap().closed.insert(index.clone());
        Ok(())
    }

    async fn alias_targets(&self, alias: &Alias) -> Result<Vec<IndexName>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .aliases
            .get(alias.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn list_indices(&self, alias: &Alias) -> Result<Vec<IndexName>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|name| name.belongs_to(alias))
            .cloned()
            .collect())
    }

    async fn get_mapping_meta(&self, index: &IndexName) -> Result<Option<serde_json::Value>, Error> {
        Ok(self.state.lock().unwrap().metas.get(index).cloned())
    }

    async fn put_mapping_meta(&self, index: &IndexName, meta: &serde_json::Value) -> Result<(), Error> {
        self.state
            .lock()
            .unwrap()
            .metas
            .insert(index.clone(), meta.clone());
        Ok(())
    }
}
