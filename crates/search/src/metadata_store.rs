use std::sync::Arc;

use score_indexer_core::{Error, IndexName, Metadata};

use crate::client::SearchClient;

/// Reads and writes per-index [`Metadata`], persisted inside the index's
/// mapping `_meta`. Layered on [`SearchClient`] rather than a separate
/// store, since the search cluster is where this state actually lives.
pub struct MetadataStore {
    search: Arc<dyn SearchClient>,
}

impl MetadataStore {
    pub fn new(search: Arc<dyn SearchClient>) -> Self {
        Self { search }
    }

    /// `None` when the index has no `_meta` at all. A `_meta` missing its
    /// `schema` key still decodes (`schema` defaults to `""`), so a stray
    /// or legacy index never aborts a caller enumerating candidates — it
    /// just never matches a real `schema_tag`.
    pub async fn load(&self, index: &IndexName) -> Result<Option<Metadata>, Error> {
        let Some(raw) = self.search.get_mapping_meta(index).await? else {
            return Ok(None);
        };
        if raw.is_null() {
            return Ok(None);
        }
        let meta: Metadata = serde_json::from_value(raw).map_err(Error::parse)?;
        Ok(Some(meta))
    }

    /// Writes `metadata` as the index's `_meta`. Mapping updates in the
    /// search cluster merge by key, so this never clobbers field mappings.
    pub async fn save(&self, index: &IndexName, metadata: &Metadata) -> Result<(), Error> {
        let raw = serde_json::to_value(metadata).map_err(Error::parse)?;
        self.search.put_mapping_meta(index, &raw).await
    }
}
