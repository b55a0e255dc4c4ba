//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vaultrag",
    version,
    about = "Incremental vector indexing and retrieval for note vaults",
    long_about = "Vaultrag maintains a searchable vector index over a note vault: it detects \
                  changed documents, chunks and embeds them under provider rate limits, and \
                  answers similarity queries for a chat assistant."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/vaultrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring the index up to date with the vault
    Index {
        /// Re-index every document regardless of change detection
        #[arg(long)]
        full: bool,
    },

    /// Retrieve the chunks most similar to a query
    Query {
        /// Query text
        text: String,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity threshold override
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,

        /// Print an assembled context block instead of a result list
        #[arg(long)]
        context: bool,
    },

    /// Show index statistics
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
