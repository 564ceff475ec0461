use std::path::PathBuf;

use clap::Args as ClapArgs;
use miette::IntoDiagnostic;
use score_indexer::config::{AppConfig, RunOverrides};
use score_indexer::scheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, ClapArgs)]
pub struct Args {
    /// Path to a config file (TOML/JSON). Defaults to `score-indexer.toml`
    /// in the current directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rebuild mode: scan the source table from scratch instead of
    /// polling the live work queue.
    #[arg(long)]
    rebuild: bool,

    /// Force a brand new physical index even if one already matches the
    /// configured schema.
    #[arg(long)]
    new: bool,

    /// On rebuild completion, move the index to `Ready` without
    /// committing the alias.
    #[arg(long)]
    prep: bool,

    /// Override the persisted `last_id`, resuming the scan/poll from this
    /// cursor value.
    #[arg(long)]
    resume_from: Option<i64>,

    /// Commit the alias as soon as this run becomes the current schema,
    /// even mid-rebuild.
    #[arg(long)]
    switch: bool,

    /// Extra delay between live-mode poll cycles, in milliseconds.
    #[arg(long = "delay-ms")]
    delay_ms: Option<u64>,
}

#[tokio::main]
pub async fn run(args: &Args) -> miette::Result<()> {
    crate::common::setup_tracing(None);

    let mut config = AppConfig::load(args.config.as_deref()).into_diagnostic()?;

    let overrides = RunOverrides {
        is_rebuild: if args.rebuild { Some(true) } else { None },
        is_new: if args.new { Some(true) } else { None },
        is_prep_mode: if args.prep { Some(true) } else { None },
        resume_from: args.resume_from,
        switch_on_complete: if args.switch { Some(true) } else { None },
        read_delay_ms: args.delay_ms,
    };
    overrides.apply(&mut config.settings);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, draining in-flight work");
            signal_token.cancel();
        }
    });

    scheduler::run(config, shutdown).await.into_diagnostic()?;

    Ok(())
}
