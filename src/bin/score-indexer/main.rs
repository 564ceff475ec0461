use clap::Parser;
use miette::Result;

mod common;
mod pump;
mod run;
mod schema;

#[derive(Parser)]
#[clap(name = "score-indexer")]
#[clap(bin_name = "score-indexer")]
#[clap(author, version, about, long_about = None)]
enum ScoreIndexer {
    /// Run the Scheduler: one Indexer per configured alias.
    Run(run::Args),
    /// Drive the work queue directly, outside the live pipeline.
    Pump(pump::Args),
    /// Read or change the coordination store's current_schema.
    Schema(schema::Args),
}

fn main() -> Result<()> {
    let args = ScoreIndexer::parse();

    match args {
        ScoreIndexer::Run(x) => run::run(&x)?,
        ScoreIndexer::Pump(x) => pump::run(&x)?,
        ScoreIndexer::Schema(x) => schema::run(&x)?,
    };

    Ok(())
}
