//! Command-line interface for Emberforum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Emberforum - a small server-rendered discussion forum
#[derive(Parser)]
#[command(name = "emberforum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.toml (defaults to the usual lookup locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the forum server (the default)
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Grant the superadmin role to an existing user
    AddAdmin {
        /// Username to promote
        username: String,
    },
}
