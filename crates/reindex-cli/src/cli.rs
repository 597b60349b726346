//! CLI argument parsing for the reindexer.
//!
//! CLI flags override every other configuration source.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use reindex_types::DocumentPath;

/// Zero-downtime index migration
///
/// Copies a source index into a destination index, moves its aliases
/// atomically and catches up on writes made during the copy.
#[derive(Parser, Debug)]
#[command(name = "reindex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/reindexer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Cluster base URL (overrides store.url)
    #[arg(short, long, global = true)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Reindexer commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Migrate one index into another
    Migrate(MigrateArgs),

    /// Print the number of documents in an index
    Count {
        /// Index name
        index: String,
    },

    /// List the aliases bound to an index
    Aliases {
        /// Index name
        index: String,
    },
}

/// Arguments for `reindex migrate`
#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Index to copy from
    #[arg(short, long)]
    pub source: String,

    /// Index to copy into
    #[arg(short, long)]
    pub destination: String,

    /// Extra alias to bind to the destination
    #[arg(short, long)]
    pub alias: Option<String>,

    /// Delete the source once the destination has caught up
    #[arg(long)]
    pub delete_source: bool,

    /// Timestamp field used by the catch-up pass
    #[arg(long)]
    pub timestamp_field: Option<String>,

    /// Only copy documents newer than this RFC 3339 instant in the first pass
    #[arg(long, value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,

    /// Parent mapping as TYPE=PATH, repeatable
    #[arg(long = "parent", value_name = "TYPE=PATH", value_parser = parse_parent_mapping)]
    pub parents: Vec<(String, DocumentPath)>,

    /// Override documents per scroll page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", raw, e))
}

fn parse_parent_mapping(raw: &str) -> Result<(String, DocumentPath), String> {
    let (doc_type, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=PATH, got '{}'", raw))?;
    let doc_type = doc_type.trim();
    if doc_type.is_empty() {
        return Err(format!("missing document type in '{}'", raw));
    }
    let path = DocumentPath::parse(path.trim()).map_err(|e| e.to_string())?;
    Ok((doc_type.to_string(), path))
}
