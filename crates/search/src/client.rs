use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use score_indexer_core::{Alias, CursorValue, Error, IndexName, Metadata, ScoreRecord};
use serde_json::json;

use crate::bulk::{BulkResult, RawBulkResponse};
use crate::metadata_store::MetadataStore;

/// Typed wrapper over the search cluster. Implementations talk HTTP/JSON;
/// tests use a hand-rolled in-memory fake instead of mocking this trait.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn create_index(&self, name: &IndexName, mapping_path: &Path) -> Result<(), Error>;

    async fn bulk(
        &self,
        index: &IndexName,
        adds: &[ScoreRecord],
        deletes: &[CursorValue],
    ) -> Result<BulkResult, Error>;

    /// Atomically remove the alias from every current target and add it to
    /// `new_index`, in one request, so readers never observe a zero-target
    /// window.
    async fn update_alias(
        &self,
        alias: &Alias,
        new_index: &IndexName,
        remove_from: &[IndexName],
    ) -> Result<(), Error>;

    async fn close_index(&self, index: &IndexName) -> Result<(), Error>;

    /// Indices the alias currently resolves to. Empty if unaliased.
    async fn alias_targets(&self, alias: &Alias) -> Result<Vec<IndexName>, Error>;

    /// All physical indices matching `{alias}_*`.
    async fn list_indices(&self, alias: &Alias) -> Result<Vec<IndexName>, Error>;

    async fn get_mapping_meta(&self, index: &IndexName) -> Result<Option<serde_json::Value>, Error>;

    async fn put_mapping_meta(&self, index: &IndexName, meta: &serde_json::Value) -> Result<(), Error>;
}

/// `FindOrCreateIndex(alias)`: enumerate indices matching `{alias}_*` whose
/// mapping schema matches `schema_tag`. Three cases: one is already
/// aliased, one or more exist but none aliased (pick the first by
/// lexicographic suffix order, ties broken by newest `updated_at`), or
/// none exist (create fresh).
pub async fn find_or_create_index(
    search: &dyn SearchClient,
    metadata: &MetadataStore,
    alias: &Alias,
    schema_tag: &str,
    mapping_path: &Path,
) -> Result<(Metadata, IndexName, bool), Error> {
    let candidates = search.list_indices(alias).await?;
    let aliased_targets = search.alias_targets(alias).await?;

    let mut matching = Vec::new();
    for candidate in candidates {
        if let Some(meta) = metadata.load(&candidate).await? {
            if meta.schema == schema_tag {
                matching.push((candidate, meta));
            }
        }
    }

    if let Some((name, meta)) = matching
        .iter()
        .find(|(name, _)| aliased_targets.contains(name))
        .cloned()
    {
        return Ok((meta, name, true));
    }

    if !matching.is_empty() {
        // Lexicographic by suffix (ascending, so the oldest physical index
        // sorts first); ties broken by newest `updated_at` first.
        matching.sort_by(|a, b| {
            a.0.suffix()
                .cmp(&b.0.suffix())
                .then_with(|| b.1.updated_at.cmp(&a.1.updated_at))
        });
        let (name, meta) = matching.remove(0);
        return Ok((meta, name, false));
    }

    let name = IndexName::new(alias, Utc::now());
    search.create_index(&name, mapping_path).await?;

    let meta = Metadata::new(schema_tag, Utc::now());
    metadata.save(&name, &meta).await?;

    Ok((meta, name, false))
}

/// `reqwest`-backed [`SearchClient`] for an Elasticsearch-compatible
/// cluster.
pub struct HttpSearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn bulk_action_line(action: &str, index: &str, id: CursorValue) -> String {
        json!({ action: { "_index": index, "_id": id.to_string() } }).to_string()
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn create_index(&self, name: &IndexName, mapping_path: &Path) -> Result<(), Error> {
        let body = std::fs::read_to_string(mapping_path).map_err(Error::Io)?;
        let mapping: serde_json::Value = serde_json::from_str(&body).map_err(Error::parse)?;

        let resp = self
            .http
            .put(self.url(&format!("{}?wait_for_active_shards=all", name.as_str())))
            .json(&mapping)
            .send()
            .await
            .map_err(Error::client)?;

        if !resp.status().is_success() {
            return Err(Error::client(format!(
                "create index {} failed: {}",
                name,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn bulk(
        &self,
        index: &IndexName,
        adds: &[ScoreRecord],
        deletes: &[CursorValue],
    ) -> Result<BulkResult, Error> {
        let mut body = String::new();
        for add in adds {
            body.push_str(&Self::bulk_action_line("index", index.as_str(), add.id));
            body.push('\n');
            body.push_str(&add.payload.to_string());
            body.push('\n');
        }
        for id in deletes {
            body.push_str(&Self::bulk_action_line("delete", index.as_str(), *id));
            body.push('\n');
        }

        let resp = self
            .http
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(Error::client)?;

        let raw: RawBulkResponse = resp.json().await.map_err(Error::client)?;
        Ok(BulkResult::classify(raw))
    }

    async fn update_alias(
        &self,
        alias: &Alias,
        new_index: &IndexName,
        remove_from: &[IndexName],
    ) -> Result<(), Error> {
        let mut actions = Vec::new();
        for old in remove_from {
            actions.push(json!({ "remove": { "index": old.as_str(), "alias": alias.as_str() } }));
        }
        actions.push(json!({ "add": { "index": new_index.as_str(), "alias": alias.as_str() } }));

        let resp = self
            .http
            .post(self.url("_aliases"))
            .json(&json!({ "actions": actions }))
            .send()
            .await
            .map_err(Error::client)?;

        if !resp.status().is_success() {
            return Err(Error::client(format!(
                "alias update for {} failed: {}",
                alias,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn close_index(&self, index: &IndexName) -> Result<(), Error> {
        let resp = self
            .http
            .post(self.url(&format!("{}/_close", index.as_str())))
            .send()
            .await
            .map_err(Error::client)?;

        if !resp.status().is_success() {
            tracing::warn!(%index, status = %resp.status(), "failed to close index");
        }
        Ok(())
    }

    async fn alias_targets(&self, alias: &Alias) -> Result<Vec<IndexName>, Error> {
        let resp = self
            .http
            .get(self.url(&format!("{}/_alias", alias.as_str())))
            .send()
            .await
            .map_err(Error::client)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(Error::client(format!(
                "alias lookup for {} failed: {}",
                alias,
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await.map_err(Error::client)?;
        let targets = body
            .as_object()
            .map(|obj| obj.keys().map(|k| IndexName::from_existing(k.clone())).collect())
            .unwrap_or_default();
        Ok(targets)
    }

    async fn list_indices(&self, alias: &Alias) -> Result<Vec<IndexName>, Error> {
        let resp = self
            .http
            .get(self.url(&format!(
                "_cat/indices/{}*?format=json",
                alias.index_prefix()
            )))
            .send()
            .await
            .map_err(Error::client)?;

        if !resp.status().is_success() {
            return Err(Error::client(format!(
                "index listing for {} failed: {}",
                alias,
                resp.status()
            )));
        }

        let rows: Vec<serde_json::Value> = resp.json().await.map_err(Error::client)?;
        let names = rows
            .into_iter()
            .filter_map(|row| row.get("index")?.as_str().map(|s| IndexName::from_existing(s.to_string())))
            .collect();
        Ok(names)
    }

    async fn get_mapping_meta(&self, index: &IndexName) -> Result<Option<serde_json::Value>, Error> {
        let resp = self
            .http
            .get(self.url(&format!("{}/_mapping", index.as_str())))
            .send()
            .await
            .map_err(Error::client)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::client(format!(
                "mapping fetch for {} failed: {}",
                index,
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await.map_err(Error::client)?;
        let meta = body
            .get(index.as_str())
            .and_then(|v| v.get("mappings"))
            .and_then(|v| v.get("_meta"))
            .cloned();
        Ok(meta)
    }

    async fn put_mapping_meta(&self, index: &IndexName, meta: &serde_json::Value) -> Result<(), Error> {
        let resp = self
            .http
            .put(self.url(&format!("{}/_mapping", index.as_str())))
            .json(&json!({ "_meta": meta }))
            .send()
            .await
            .map_err(Error::client)?;

        if !resp.status().is_success() {
            return Err(Error::client(format!(
                "mapping update for {} failed: {}",
                index,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;
    use score_indexer_core::IndexState;

    /// Minimal local [`SearchClient`] fake scoped to exercising
    /// [`find_or_create_index`]'s three cases, independent of the
    /// feature-gated `testing` module.
    #[derive(Default)]
    struct Fixture {
        indices: Mutex<HashMap<IndexName, serde_json::Value>>,
        alias_targets: Mutex<Vec<IndexName>>,
    }

    #[async_trait]
    impl SearchClient for Fixture {
        async fn create_index(&self, name: &IndexName, _mapping_path: &Path) -> Result<(), Error> {
            self.indices.lock().unwrap().insert(name.clone(), serde_json::Value::Null);
            Ok(())
        }

        async fn bulk(&self, _: &IndexName, _: &[ScoreRecord], _: &[CursorValue]) -> Result<BulkResult, Error> {
            unreachable!("not exercised by these tests")
        }

        async fn update_alias(&self, _: &Alias, _: &IndexName, _: &[IndexName]) -> Result<(), Error> {
            unreachable!("not exercised by these tests")
        }

        async fn close_index(&self, _: &IndexName) -> Result<(), Error> {
            unreachable!("not exercised by these tests")
        }

        async fn alias_targets(&self, _: &Alias) -> Result<Vec<IndexName>, Error> {
            Ok(self.alias_targets.lock().unwrap().clone())
        }

        async fn list_indices(&self, alias: &Alias) -> Result<Vec<IndexName>, Error> {
            Ok(self
                .indices
                .lock()
                .unwrap()
                .keys()
                .filter(|name| name.belongs_to(alias))
                .cloned()
                .collect())
        }

        async fn get_mapping_meta(&self, index: &IndexName) -> Result<Option<serde_json::Value>, Error> {
            Ok(self.indices.lock().unwrap().get(index).cloned())
        }

        async fn put_mapping_meta(&self, index: &IndexName, meta: &serde_json::Value) -> Result<(), Error> {
            self.indices.lock().unwrap().insert(index.clone(), meta.clone());
            Ok(())
        }
    }

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn seed(fixture: &Fixture, metadata: &MetadataStore, name: IndexName, schema: &str, updated_at: chrono::DateTime<Utc>) {
        fixture.create_index(&name, Path::new("schemas/scores.json")).await.unwrap();
        let meta = Metadata::new(schema, updated_at);
        metadata.save(&name, &meta).await.unwrap();
    }

    #[tokio::test]
    async fn case_1_returns_the_aliased_match() {
        let fixture = Arc::new(Fixture::default());
        let metadata = MetadataStore::new(fixture.clone() as Arc<dyn SearchClient>);
        let alias = Alias::new("scores");

        let old = IndexName::from_existing("scores_20260101000000");
        let current = IndexName::from_existing("scores_20260201000000");
        seed(&fixture, &metadata, old.clone(), "v7", at(0)).await;
        seed(&fixture, &metadata, current.clone(), "v7", at(1)).await;
        *fixture.alias_targets.lock().unwrap() = vec![current.clone()];

        let (meta, name, aliased) =
            find_or_create_index(fixture.as_ref(), &metadata, &alias, "v7", Path::new("schemas/scores.json"))
                .await
                .unwrap();

        assert_eq!(name, current);
        assert!(aliased);
        assert_eq!(meta.schema, "v7");
    }

    #[tokio::test]
    async fn case_2_picks_oldest_suffix_when_none_aliased() {
        let fixture = Arc::new(Fixture::default());
        let metadata = MetadataStore::new(fixture.clone() as Arc<dyn SearchClient>);
        let alias = Alias::new("scores");

        let older = IndexName::from_existing("scores_20260101000000");
        let newer = IndexName::from_existing("scores_20260601000000");
        seed(&fixture, &metadata, newer.clone(), "v7", at(0)).await;
        seed(&fixture, &metadata, older.clone(), "v7", at(0)).await;

        let (_, name, aliased) =
            find_or_create_index(fixture.as_ref(), &metadata, &alias, "v7", Path::new("schemas/scores.json"))
                .await
                .unwrap();

        assert_eq!(name, older);
        assert!(!aliased);
    }

    #[tokio::test]
    async fn case_3_creates_fresh_index_when_no_schema_match() {
        let fixture = Arc::new(Fixture::default());
        let metadata = MetadataStore::new(fixture.clone() as Arc<dyn SearchClient>);
        let alias = Alias::new("scores");

        let stale = IndexName::from_existing("scores_20250101000000");
        seed(&fixture, &metadata, stale, "v6", at(0)).await;

        let (meta, name, aliased) =
            find_or_create_index(fixture.as_ref(), &metadata, &alias, "v7", Path::new("schemas/scores.json"))
                .await
                .unwrap();

        assert!(name.belongs_to(&alias));
        assert!(!aliased);
        assert_eq!(meta.schema, "v7");
        assert_eq!(meta.state, IndexState::Building);
    }
}
