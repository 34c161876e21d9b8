use anyhow::Result;
use clap::{Parser, Subcommand};
use tickerdesk::Config;
use tracing::info;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "tickerdesk",
    about = "Stock news digest: market snapshot, recent articles and an LLM summary",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one analysis and print the result as JSON
    Analyze {
        /// Symbol to analyze
        #[arg(short, long)]
        symbol: String,

        /// News lookback window in days (defaults to DEFAULT_LOOKBACK_DAYS)
        #[arg(short, long, allow_negative_numbers = true)]
        days: Option<i64>,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Serve the HTTP API until Ctrl-C
    Serve {
        /// Bind address (defaults to API_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (defaults to API_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Execute CLI command
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Analyze { symbol, days, pretty } => {
            info!("Running analysis for {}", symbol);
            commands::analyze(config, symbol, days, pretty).await?;
        }
        Commands::Serve { host, port } => {
            info!("Starting HTTP API");
            commands::serve(config, host, port).await?;
        }
    }
    Ok(())
}
