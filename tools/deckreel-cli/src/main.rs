//! Deckreel CLI: turn slide decks into narrated videos.
//!
//! Usage:
//!   deckreel render <DECK>     Render a deck to MP4
//!   deckreel plan <DECK>       Print the planned segment timeline
//!   deckreel info <DECK>       Show deck information
//!   deckreel status [ID]       Show render job records
//!   deckreel check             Check external tools
//!
//! `<DECK>` is either a bundle directory containing `deck.json` or the id of
//! a deck under the configured data directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deckreel",
    about = "Render slide decks into narrated videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/deckreel/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a deck to video
    Render {
        /// Deck bundle directory or deck id
        deck: String,

        /// Render quality: preview or final
        #[arg(short, long, default_value = "preview")]
        kind: String,

        /// Output directory (overrides the configured one)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the segment plan for a deck
    Plan {
        /// Deck bundle directory or deck id
        deck: String,

        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show deck information
    Info {
        /// Deck bundle directory or deck id
        deck: String,
    },

    /// Show render job records
    Status {
        /// Show a single job
        id: Option<uuid::Uuid>,
    },

    /// Check external tools
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => deckreel_common::config::AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => deckreel_common::config::AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    deckreel_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Render {
            deck,
            kind,
            output_dir,
        } => commands::render::run(config, deck, kind, output_dir).await,
        Commands::Plan { deck, json } => commands::plan::run(config, deck, json).await,
        Commands::Info { deck } => commands::info::run(config, deck).await,
        Commands::Status { id } => commands::status::run(config, id).await,
        Commands::Check => commands::check::run(config),
    }
}
