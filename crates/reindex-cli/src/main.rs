//! Reindexer
//!
//! Zero-downtime migration of one index into another.
//!
//! # Usage
//!
//! ```bash
//! reindex migrate --source posts_v1 --destination posts_v2 [--alias posts] [--delete-source]
//! reindex count posts_v1
//! reindex aliases posts_v1
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reindexer/config.toml)
//! 3. Environment variables (REINDEX_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use reindex_cli::{
    connect, handle_aliases, handle_count, handle_migrate, init_logging, load_settings, Cli,
    Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    let store = connect(&settings)?;

    match &cli.command {
        Commands::Migrate(args) => {
            handle_migrate(store, &settings, args).await?;
        }
        Commands::Count { index } => {
            handle_count(store, index).await?;
        }
        Commands::Aliases { index } => {
            handle_aliases(store, index).await?;
        }
    }

    Ok(())
}
