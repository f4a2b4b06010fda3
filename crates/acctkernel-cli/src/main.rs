//! Reference CLI for the accounting interpretation kernel.
//!
//! Two entry points onto a running Postgres-backed kernel: `import` stages
//! and promotes a source file through the ingestion pipeline, `trace`
//! reconstructs the full decision journal for one event or journal entry.
//!
//! ```bash
//! acctkernel import --mapping qb_vendors --file vendors.csv --probe-only
//! acctkernel import --mapping qb_journal --file je.csv --ledger GL
//! acctkernel trace --event-id evt_...
//! acctkernel trace --list
//! ```

use clap::{Parser, Subcommand};

mod commands;
mod display;

use commands::{import, trace};

#[derive(Parser)]
#[command(name = "acctkernel")]
#[command(author = "acctkernel contributors")]
#[command(version)]
#[command(about = "Reference CLI for the accounting interpretation kernel", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage a source file through a named import mapping and (unless
    /// told otherwise) promote its valid records into live data.
    Import(import::ImportArgs),
    /// Reconstruct the decision journal for one event, one journal entry,
    /// or list everything currently traceable.
    Trace(trace::TraceArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let exit_ok = match cli.command {
        Commands::Import(args) => import::run(args).await?,
        Commands::Trace(args) => trace::run(args).await?,
    };

    if !exit_ok {
        std::process::exit(1);
    }
    Ok(())
}
