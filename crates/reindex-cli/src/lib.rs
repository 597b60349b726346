//! Reindexer command-line front end.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (migrate, count, aliases)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, MigrateArgs};
pub use commands::{
    build_request, connect, handle_aliases, handle_count, handle_migrate, init_logging,
    load_settings,
};
