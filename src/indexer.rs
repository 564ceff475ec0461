//! Per-alias orchestrator: find-or-create the target index, run the
//! reader+dispatcher pipeline, watch for schema switchover, commit alias
//! transitions.
//!
//! Constructs the reader and dispatcher stages, wires them together with a
//! `gasket::messaging::tokio::mpsc_channel`, spawns both via
//! `gasket::runtime::spawn_stage`, and blocks on the resulting `Tether`s.
//! A separate task runs a periodic timer that watches for schema
//! switchover independently of the pipeline stages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use score_indexer_coord::CoordinationStore;
use score_indexer_core::{
    Alias, CursorValue, DescriptorRegistry, Error, IndexName, IndexState, Metadata, Settings,
};
use score_indexer_db::{RecordQueue, RecordSource};
use score_indexer_search::{find_or_create_index, MetadataStore, SearchClient};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher;
use crate::reader;

const SCHEMA_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Process-wide collaborators, built once by the Scheduler and shared by
/// every Indexer it runs.
pub struct IndexerContext {
    pub settings: Settings,
    pub mapping_path: PathBuf,
    pub search: Arc<dyn SearchClient>,
    pub metadata_store: Arc<MetadataStore>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub source: Arc<dyn RecordSource>,
    pub queue: Arc<dyn RecordQueue>,
    pub registry: Arc<DescriptorRegistry>,
}

/// Runs one alias to completion (rebuild) or until the schema watcher
/// stops it (live).
pub async fn run(
    ctx: Arc<IndexerContext>,
    alias: Alias,
    ruleset: String,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let settings = ctx.settings.clone();

    if !settings.is_rebuild && existing_metadata_for_schema(&ctx, &alias).await?.is_none() {
        info!(%alias, schema = %settings.schema_tag, "alias not ready at this schema, nothing to do");
        return Ok(());
    }

    let (mut meta, index_name, aliased) = if settings.is_new {
        let name = IndexName::new(&alias, Utc::now());
        ctx.search.create_index(&name, &ctx.mapping_path).await?;
        let fresh = Metadata::new(settings.schema_tag.clone(), Utc::now());
        ctx.metadata_store.save(&name, &fresh).await?;
        (fresh, name, false)
    } else {
        find_or_create_index(
            ctx.search.as_ref(),
            &ctx.metadata_store,
            &alias,
            &settings.schema_tag,
            &ctx.mapping_path,
        )
        .await?
    };

    let now = Utc::now();

    if let Some(resume_from) = settings.resume_from {
        meta.advance_last_id(resume_from, now);
    }

    if settings.is_rebuild && meta.reset_queue_to.is_none() {
        meta.reset_queue_to = ctx.queue.highest_completed(&ruleset).await?;
    }

    if !settings.is_rebuild {
        check_schema_tag(&meta, &settings)?;

        if !aliased {
            commit_alias(&ctx, &alias, &index_name).await?;
        }

        if let Some(reset_to) = meta.reset_queue_to.take() {
            ctx.queue.rewind_to(&ruleset, reset_to).await?;
        }
    }

    ctx.metadata_store.save(&index_name, &meta).await?;

    ctx.coordination.add_active_schema(index_name.as_str()).await?;
    if ctx.coordination.get_current_schema().await?.is_none() {
        ctx.coordination.set_current_schema(&settings.schema_tag).await?;
    }

    let index_closed = Arc::new(AtomicBool::new(false));
    let run_stop = shutdown.child_token();

    let (completion_tx, completion_rx) = mpsc::channel::<CursorValue>(settings.queue_capacity.max(1));
    let (meta_final_tx, meta_final_rx) = oneshot::channel::<Metadata>();

    let writer_handle = tokio::spawn(metadata_writer(
        ctx.metadata_store.clone(),
        index_name.clone(),
        meta.clone(),
        completion_rx,
        meta_final_tx,
    ));

    let watcher_handle = tokio::spawn(schema_watcher(
        ctx.clone(),
        alias.clone(),
        index_name.clone(),
        settings.schema_tag.clone(),
        run_stop.clone(),
    ));

    let tethers = if settings.is_rebuild {
        let max = {
            let descriptor = ctx
                .registry
                .get(&ruleset)
                .ok_or_else(|| Error::message(format!("no descriptor registered for {ruleset}")))?;
            ctx.source.read_max(descriptor).await?
        };

        build_stages(
            &ctx,
            &index_name,
            &ruleset,
            reader::Mode::Rebuild { max },
            meta.last_id,
            completion_tx,
            index_closed.clone(),
            run_stop.clone(),
        )
    } else {
        build_stages(
            &ctx,
            &index_name,
            &ruleset,
            reader::Mode::Live,
            meta.last_id,
            completion_tx,
            index_closed.clone(),
            run_stop.clone(),
        )
    };

    tokio::task::spawn_blocking(move || tethers.block())
        .await
        .map_err(|err| Error::message(format!("pipeline join panicked: {err}")))?;

    run_stop.cancel();
    let _ = watcher_handle.await;

    let final_meta = meta_final_rx.await.unwrap_or(meta);

    if index_closed.load(Ordering::SeqCst) {
        warn!(%index_name, "run abandoned after index-closed signal, no alias commit");
        ctx.coordination.remove_active_schema(index_name.as_str()).await.ok();
        return Ok(());
    }

    if settings.is_rebuild {
        let mut final_meta = final_meta;
        let now = Utc::now();

        if settings.is_prep_mode {
            final_meta.transition(IndexState::Ready, now)?;
        } else {
            commit_alias(&ctx, &alias, &index_name).await?;
            final_meta.transition(IndexState::Aliased, now)?;

            if settings.switch_on_complete {
                ctx.coordination.set_current_schema(&settings.schema_tag).await?;
            }
        }

        ctx.metadata_store.save(&index_name, &final_meta).await?;
    }

    ctx.coordination.remove_active_schema(index_name.as_str()).await.ok();

    Ok(())
}

/// A live (non-rebuild) run must never operate against an index tagged
/// with a schema other than the one it's configured for — that would mean
/// another process is mid-switch. Checked separately from
/// `find_or_create_index`'s own schema filtering as a last-line guard
/// against a persisted Metadata that disagrees with what the caller
/// resolved.
fn check_schema_tag(meta: &Metadata, settings: &Settings) -> Result<(), Error> {
    if meta.schema != settings.schema_tag {
        return Err(Error::VersionMismatch {
            persisted: meta.schema.clone(),
            configured: settings.schema_tag.clone(),
        });
    }
    Ok(())
}

async fn existing_metadata_for_schema(
    ctx: &IndexerContext,
    alias: &Alias,
) -> Result<Option<(IndexName, Metadata)>, Error> {
    for candidate in ctx.search.list_indices(alias).await? {
        if let Some(meta) = ctx.metadata_store.load(&candidate).await? {
            if meta.schema == ctx.settings.schema_tag {
                return Ok(Some((candidate, meta)));
            }
        }
    }
    Ok(None)
}

/// Atomically repoints `alias` at `index_name`, then marks whatever it used
/// to point at `Closed` — in persisted Metadata first, then at the search
/// cluster (mapping writes against a physically closed index typically
/// fail, so the metadata transition has to land before `close_index`).
/// Failure on either step for a previous target is logged, not fatal.
async fn commit_alias(ctx: &IndexerContext, alias: &Alias, index_name: &IndexName) -> Result<(), Error> {
    let current_targets = ctx.search.alias_targets(alias).await?;
    let remove_from: Vec<IndexName> = current_targets.into_iter().filter(|t| t != index_name).collect();

    ctx.search.update_alias(alias, index_name, &remove_from).await?;

    for old in &remove_from {
        match ctx.metadata_store.load(old).await {
            Ok(Some(mut old_meta)) => {
                if let Err(err) = old_meta.transition(IndexState::Closed, Utc::now()) {
                    warn!(%err, index = %old, "failed to mark previous index Closed (non-fatal)");
                } else if let Err(err) = ctx.metadata_store.save(old, &old_meta).await {
                    warn!(%err, index = %old, "failed to persist Closed state for previous index (non-fatal)");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%err, index = %old, "failed to load metadata for previous index before closing (non-fatal)"),
        }

        if let Err(err) = ctx.search.close_index(old).await {
            warn!(%err, index = %old, "failed to close previous index after alias switch (non-fatal)");
        }
    }

    Ok(())
}

/// Serializes Metadata writes behind a single task fed by dispatcher
/// completions, so `last_id` only ever advances even with several
/// dispatch tasks completing out of order.
async fn metadata_writer(
    store: Arc<MetadataStore>,
    index_name: IndexName,
    mut meta: Metadata,
    mut completions: mpsc::Receiver<CursorValue>,
    final_state: oneshot::Sender<Metadata>,
) {
    while let Some(last_id) = completions.recv().await {
        meta.advance_last_id(last_id, Utc::now());
        if let Err(err) = store.save(&index_name, &meta).await {
            warn!(%err, index = %index_name, "failed to persist metadata after batch completion");
        }
    }
    let _ = final_state.send(meta);
}

/// Polls `current_schema` every 5s: commits the alias if it now names our
/// own schema, stops if it names a different one, otherwise waits.
async fn schema_watcher(
    ctx: Arc<IndexerContext>,
    alias: Alias,
    index_name: IndexName,
    schema_tag: String,
    stop: CancellationToken,
) {
    let mut previous = ctx.coordination.get_current_schema().await.ok().flatten();
    let mut ticker = tokio::time::interval(SCHEMA_WATCH_INTERVAL);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let current = match ctx.coordination.get_current_schema().await {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "schema watcher: coordination store read failed, retrying next tick");
                continue;
            }
        };

        if current == previous {
            continue;
        }

        if current.as_deref() == Some(schema_tag.as_str()) {
            info!(%alias, %index_name, "current_schema now points at us, committing alias");
            match commit_alias(&ctx, &alias, &index_name).await {
                Ok(()) => previous = current,
                Err(err) => warn!(%err, "alias commit failed, will retry next tick"),
            }
        } else {
            info!(%alias, %index_name, ?current, "current_schema moved to another schema, stopping");
            let _ = ctx.coordination.remove_active_schema(index_name.as_str()).await;
            stop.cancel();
            return;
        }
    }
}

fn build_stages(
    ctx: &IndexerContext,
    index_name: &IndexName,
    ruleset: &str,
    mode: reader::Mode,
    last_id: CursorValue,
    completion_tx: mpsc::Sender<CursorValue>,
    index_closed: Arc<AtomicBool>,
    stop: CancellationToken,
) -> Vec<gasket::runtime::Tether> {
    let settings = &ctx.settings;

    let mut reader_stage = match mode {
        reader::Mode::Rebuild { max } => reader::Stage::new_rebuild(
            ctx.source.clone(),
            ruleset.to_string(),
            settings.batch_size as i64,
            last_id,
            max,
            ctx.registry.clone(),
            stop.clone(),
        ),
        reader::Mode::Live => reader::Stage::new_live(
            ctx.queue.clone(),
            ruleset.to_string(),
            settings.batch_size as i64,
            Duration::from_millis(settings.read_delay_ms),
            ctx.registry.clone(),
            stop.clone(),
        ),
    };

    let mut dispatcher_stage = dispatcher::Stage::new(
        index_name.clone(),
        ctx.search.clone(),
        settings.max_parallel_dispatch,
        settings.queue_capacity,
        completion_tx,
        index_closed,
        stop,
    );

    let (to_dispatcher, from_reader) =
        gasket::messaging::tokio::mpsc_channel(settings.queue_capacity.max(1));
    reader_stage.downstream.connect(to_dispatcher);
    dispatcher_stage.upstream.connect(from_reader);

    vec![
        gasket::runtime::spawn_stage(reader_stage, reader_retry_policy()),
        gasket::runtime::spawn_stage(dispatcher_stage, dispatcher_retry_policy()),
    ]
}

/// `TransientSource` is retried locally with a fixed 1s backoff,
/// indefinitely: a flapping source database must never kill the reader
/// stage, so `max_retries` is effectively unbounded and `backoff_factor`
/// is 1 rather than exponential.
fn reader_retry_policy() -> gasket::runtime::Policy {
    let retries = gasket::retries::Policy {
        max_retries: usize::MAX,
        backoff_unit: Duration::from_secs(1),
        backoff_factor: 1,
        max_backoff: Duration::from_secs(1),
        dismissible: false,
    };

    gasket::runtime::Policy {
        tick_timeout: Duration::from_secs(120).into(),
        bootstrap_retry: retries.clone(),
        work_retry: retries.clone(),
        teardown_retry: retries,
    }
}

fn dispatcher_retry_policy() -> gasket::runtime::Policy {
    let retries = gasket::retries::Policy {
        max_retries: 20,
        backoff_unit: Duration::from_secs(1),
        backoff_factor: 2,
        max_backoff: Duration::from_secs(60),
        dismissible: false,
    };

    gasket::runtime::Policy {
        tick_timeout: Duration::from_secs(120).into(),
        bootstrap_retry: retries.clone(),
        work_retry: retries.clone(),
        teardown_retry: retries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use score_indexer_coord::testing::FakeCoordinationStore;
    use score_indexer_core::ScoreRecord;
    use score_indexer_db::testing::FakeRecordSource;
    use score_indexer_search::testing::FakeSearchClient;

    fn test_settings() -> Settings {
        Settings {
            source_connection_string: "postgres://localhost/scores".into(),
            search_cluster_url: "http://localhost:9200".into(),
            coordination_store_url: "redis://localhost".into(),
            schema_tag: "v7".into(),
            alias_prefix: "scores".into(),
            batch_size: 10_000,
            queue_capacity: 100,
            max_parallel_dispatch: 4,
            is_rebuild: false,
            is_new: false,
            is_prep_mode: false,
            resume_from: None,
            switch_on_complete: false,
            read_delay_ms: 0,
        }
    }

    fn test_ctx() -> (
        Arc<IndexerContext>,
        Arc<FakeSearchClient>,
        Arc<FakeCoordinationStore>,
        Arc<FakeRecordSource>,
    ) {
        let search = Arc::new(FakeSearchClient::new());
        let coordination = Arc::new(FakeCoordinationStore::new());
        let source = Arc::new(FakeRecordSource::new());

        let ctx = Arc::new(IndexerContext {
            settings: test_settings(),
            mapping_path: PathBuf::from("schemas/scores.json"),
            search: search.clone() as Arc<dyn SearchClient>,
            metadata_store: Arc::new(MetadataStore::new(search.clone() as Arc<dyn SearchClient>)),
            coordination: coordination.clone() as Arc<dyn CoordinationStore>,
            source: source.clone() as Arc<dyn RecordSource>,
            queue: source.clone() as Arc<dyn RecordQueue>,
            registry: Arc::new(crate::rulesets::builtin_registry()),
        });

        (ctx, search, coordination, source)
    }

    #[tokio::test]
    async fn commit_alias_switches_and_closes_previous_target() {
        let (ctx, search, _coord, _source) = test_ctx();
        let alias = Alias::new("scores_osu");
        let now = Utc::now();

        let old = IndexName::new(&alias, now);
        search.create_index(&old, Path::new("schemas/scores.json")).await.unwrap();
        ctx.search.update_alias(&alias, &old, &[]).await.unwrap();
        let mut old_meta = Metadata::new("v7", now);
        old_meta.transition(IndexState::Aliased, now).unwrap();
        ctx.metadata_store.save(&old, &old_meta).await.unwrap();

        let new = IndexName::from_existing(format!("{old}_2"));
        search.create_index(&new, Path::new("schemas/scores.json")).await.unwrap();

        commit_alias(&ctx, &alias, &new).await.unwrap();

        let targets = ctx.search.alias_targets(&alias).await.unwrap();
        assert_eq!(targets, vec![new.clone()]);
        assert!(search.is_closed(&old));

        let reloaded = ctx.metadata_store.load(&old).await.unwrap().unwrap();
        assert_eq!(reloaded.state, IndexState::Closed);
    }

    #[tokio::test]
    async fn existing_metadata_for_schema_matches_only_own_schema() {
        let (ctx, search, _coord, _source) = test_ctx();
        let alias = Alias::new("scores_osu");
        let now = Utc::now();

        let name = IndexName::new(&alias, now);
        search.create_index(&name, Path::new("schemas/scores.json")).await.unwrap();
        ctx.metadata_store.save(&name, &Metadata::new("v7", now)).await.unwrap();

        let found = existing_metadata_for_schema(&ctx, &alias).await.unwrap();
        assert_eq!(found.map(|(n, _)| n), Some(name.clone()));

        let mismatched = Settings {
            schema_tag: "v8".into(),
            ..ctx.settings.clone()
        };
        let mismatched_ctx = Arc::new(IndexerContext {
            settings: mismatched,
            mapping_path: ctx.mapping_path.clone(),
            search: ctx.search.clone(),
            metadata_store: ctx.metadata_store.clone(),
            coordination: ctx.coordination.clone(),
            source: ctx.source.clone(),
            queue: ctx.queue.clone(),
            registry: ctx.registry.clone(),
        });
        assert!(existing_metadata_for_schema(&mismatched_ctx, &alias).await.unwrap().is_none());
    }

    fn seeded_row(id: CursorValue) -> ScoreRecord {
        ScoreRecord {
            id,
            ruleset: "osu".into(),
            active: true,
            payload: serde_json::Value::Null,
        }
    }

    fn with_settings(ctx: &Arc<IndexerContext>, settings: Settings) -> Arc<IndexerContext> {
        Arc::new(IndexerContext {
            settings,
            mapping_path: ctx.mapping_path.clone(),
            search: ctx.search.clone(),
            metadata_store: ctx.metadata_store.clone(),
            coordination: ctx.coordination.clone(),
            source: ctx.source.clone(),
            queue: ctx.queue.clone(),
            registry: ctx.registry.clone(),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fresh_rebuild_indexes_every_row_and_commits_the_alias() {
        let (ctx, search, _coord, source) = test_ctx();
        let alias = Alias::new("scores_osu");

        for id in 1..=3 {
            source.seed_row(seeded_row(id));
        }

        let ctx = with_settings(
            &ctx,
            Settings {
                is_rebuild: true,
                is_new: true,
                batch_size: 100,
                ..ctx.settings.clone()
            },
        );

        let shutdown = CancellationToken::new();
        tokio::time::timeout(
            Duration::from_secs(10),
            run(ctx.clone(), alias.clone(), "osu".to_string(), shutdown),
        )
        .await
        .expect("run should finish well before the timeout")
        .unwrap();

        let targets = ctx.search.alias_targets(&alias).await.unwrap();
        assert_eq!(targets.len(), 1);
        let index_name = targets[0].clone();
        assert!(search.was_created(&index_name));

        let meta = ctx.metadata_store.load(&index_name).await.unwrap().unwrap();
        assert_eq!(meta.last_id, 3);
        assert_eq!(meta.schema, "v7");
        assert_eq!(meta.state, IndexState::Aliased);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn prep_mode_builds_the_index_but_leaves_the_alias_untouched() {
        let (ctx, _search, _coord, source) = test_ctx();
        let alias = Alias::new("scores_osu");

        source.seed_row(seeded_row(1));

        let ctx = with_settings(
            &ctx,
            Settings {
                is_rebuild: true,
                is_new: true,
                is_prep_mode: true,
                batch_size: 100,
                ..ctx.settings.clone()
            },
        );

        let shutdown = CancellationToken::new();
        tokio::time::timeout(
            Duration::from_secs(10),
            run(ctx.clone(), alias.clone(), "osu".to_string(), shutdown),
        )
        .await
        .expect("run should finish well before the timeout")
        .unwrap();

        let targets = ctx.search.alias_targets(&alias).await.unwrap();
        assert!(targets.is_empty(), "prep mode must not commit the alias");

        let created = ctx.search.list_indices(&alias).await.unwrap();
        assert_eq!(created.len(), 1);

        let meta = ctx.metadata_store.load(&created[0]).await.unwrap().unwrap();
        assert_eq!(meta.last_id, 1);
        assert_eq!(meta.state, IndexState::Ready);
    }

    #[test]
    fn check_schema_tag_rejects_a_persisted_schema_other_than_configured() {
        let settings = test_settings();

        let matching = Metadata::new(settings.schema_tag.clone(), Utc::now());
        assert!(check_schema_tag(&matching, &settings).is_ok());

        let mismatched = Metadata::new("v6", Utc::now());
        match check_schema_tag(&mismatched, &settings) {
            Err(Error::VersionMismatch { persisted, configured }) => {
                assert_eq!(persisted, "v6");
                assert_eq!(configured, "v7");
            }
            other => panic!("expected VersionMismatch, got {other:?}"),
        }
    }
}
