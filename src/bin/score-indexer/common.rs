use std::sync::Arc;

use score_indexer_coord::{CoordinationStore, RedisCoordinationStore};
use score_indexer_core::{Error, Settings};
use tracing::Level;
use tracing_subscriber::{filter::Targets, prelude::*};

/// Installs a `tracing_subscriber` formatter filtered to this binary's own
/// target plus `gasket`, since pipeline stages are gasket stages and their
/// retry/backoff events are worth seeing by default.
pub fn setup_tracing(max_level: Option<Level>) {
    let level = max_level.unwrap_or(Level::INFO);

    let filter = Targets::new()
        .with_target("score_indexer", level)
        .with_target("gasket", level);

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish()
        .with(filter)
        .init();
}

/// Opens the coordination store directly, for subcommands (`schema`,
/// `pump --switch`) that touch `current_schema` without running the full
/// Scheduler.
pub fn open_coordination_store(settings: &Settings, key_prefix: &str) -> Result<Arc<dyn CoordinationStore>, Error> {
    let store = RedisCoordinationStore::open(&settings.coordination_store_url, key_prefix.to_string())?;
    Ok(Arc::new(store))
}
