use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Subcommand};
use miette::IntoDiagnostic;
use score_indexer::config::AppConfig;
use score_indexer::rulesets::builtin_registry;
use score_indexer_coord::CoordinationStore;
use score_indexer_core::Error;
use score_indexer_db::{RecordQueue, WorkQueue};
use tracing::info;

#[derive(Debug, ClapArgs)]
pub struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enqueue every existing row for every configured ruleset as a fresh
    /// pending work-queue entry.
    All {
        /// Only enqueue rows past this cursor value.
        #[arg(long)]
        from: Option<i64>,

        /// After enqueueing, immediately make this config's schema the
        /// cluster's current schema.
        #[arg(long)]
        switch: bool,

        /// Delay between per-ruleset enqueue batches, in milliseconds.
        #[arg(long = "delay-ms")]
        delay_ms: Option<u64>,
    },
}

#[tokio::main]
pub async fn run(args: &Args) -> miette::Result<()> {
    crate::common::setup_tracing(None);

    let config = AppConfig::load(args.config.as_deref()).into_diagnostic()?;

    match &args.command {
        Command::All { from, switch, delay_ms } => pump_all(&config, *from, *switch, *delay_ms)
            .await
            .into_diagnostic()?,
    }

    Ok(())
}

async fn pump_all(config: &AppConfig, from: Option<i64>, switch: bool, delay_ms: Option<u64>) -> Result<(), Error> {
    let registry = builtin_registry();
    let queue = WorkQueue::connect(&config.settings.source_connection_string)?;

    for ruleset in &config.rulesets {
        let descriptor = registry
            .get(ruleset)
            .ok_or_else(|| Error::message(format!("no descriptor registered for {ruleset}")))?;

        let enqueued = queue.enqueue_all(descriptor, descriptor.queue_mode(), from).await?;
        info!(ruleset = %ruleset, enqueued, "pumped rows into work queue");

        if let Some(delay_ms) = delay_ms {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }

    if switch {
        let coordination = crate::common::open_coordination_store(&config.settings, &config.coordination_key_prefix)?;
        coordination.set_current_schema(&config.settings.schema_tag).await?;
        info!(schema = %config.settings.schema_tag, "switched current_schema");
    }

    Ok(())
}
