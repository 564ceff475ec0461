//! Top-level Scheduler: one Indexer per configured alias, sharing a single
//! search client, coordination store, and descriptor registry.
//!
//! Builds the shared collaborators once, then spawns one Indexer task per
//! configured alias and joins on all of them.

use std::sync::Arc;

use score_indexer_coord::{CoordinationStore, RedisCoordinationStore};
use score_indexer_core::{Alias, Error};
use score_indexer_db::{RecordQueue, RecordSource, SourceDb, WorkQueue};
use score_indexer_search::{HttpSearchClient, MetadataStore, SearchClient};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::indexer::{self, IndexerContext};
use crate::rulesets::builtin_registry;

/// Builds the shared collaborators and runs one [`indexer::run`] per
/// configured alias until `shutdown` is cancelled or every rebuild
/// completes.
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> Result<(), Error> {
    let search: Arc<dyn SearchClient> = Arc::new(HttpSearchClient::new(&config.settings.search_cluster_url));
    let metadata_store = Arc::new(MetadataStore::new(search.clone()));
    let coordination: Arc<dyn CoordinationStore> = Arc::new(RedisCoordinationStore::open(
        &config.settings.coordination_store_url,
        config.coordination_key_prefix.clone(),
    )?);
    let source: Arc<dyn RecordSource> = Arc::new(SourceDb::connect(&config.settings.source_connection_string)?);
    let queue: Arc<dyn RecordQueue> = Arc::new(WorkQueue::connect(&config.settings.source_connection_string)?);

    let ctx = Arc::new(IndexerContext {
        settings: config.settings.clone(),
        mapping_path: config.mapping_path.clone(),
        search,
        metadata_store,
        coordination,
        source,
        queue,
        registry: Arc::new(builtin_registry()),
    });

    let specs = config.alias_specs();
    if specs.is_empty() {
        info!("no rulesets configured, nothing to run");
        return Ok(());
    }

    let mut tasks = JoinSet::new();
    for spec in specs {
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(run_one(ctx, spec.alias, spec.ruleset, shutdown));
    }

    let mut first_err = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(%err, "indexer run failed");
                first_err.get_or_insert(err);
            }
            Err(join_err) => {
                error!(%join_err, "indexer task panicked");
                first_err.get_or_insert(Error::message(format!("indexer task panicked: {join_err}")));
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run_one(
    ctx: Arc<IndexerContext>,
    alias: Alias,
    ruleset: String,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    info!(%alias, %ruleset, "starting indexer");
    let result = indexer::run(ctx, alias.clone(), ruleset, shutdown).await;
    match &result {
        Ok(()) => info!(%alias, "indexer finished"),
        Err(err) => error!(%alias, %err, "indexer exited with error"),
    }
    result
}
