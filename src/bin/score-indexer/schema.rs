use std::path::PathBuf;

use clap::{Args as ClapArgs, Subcommand};
use miette::IntoDiagnostic;
use score_indexer::config::AppConfig;
use score_indexer_coord::CoordinationStore;
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
    /// Print the cluster's current_schema, or nothing if unset.
    Get,
    /// Set current_schema, triggering every indexer watching this alias
    /// set to commit its own alias on its next tick.
    Set {
        schema: String,
    },
    /// Clear current_schema.
    Clear,
}

#[tokio::main]
pub async fn run(args: &Args) -> miette::Result<()> {
    crate::common::setup_tracing(None);

    let config = AppConfig::load(args.config.as_deref()).into_diagnostic()?;
    let coordination =
        crate::common::open_coordination_store(&config.settings, &config.coordination_key_prefix).into_diagnostic()?;

    match &args.command {
        Command::Get => match coordination.get_current_schema().await.into_diagnostic()? {
            Some(schema) => println!("{schema}"),
            None => info!("current_schema is unset"),
        },
        Command::Set { schema } => {
            coordination.set_current_schema(schema).await.into_diagnostic()?;
            info!(%schema, "current_schema set");
        }
        Command::Clear => {
            coordination.clear_current_schema().await.into_diagnostic()?;
            info!("current_schema cleared");
        }
    }

    Ok(())
}
