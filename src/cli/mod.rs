//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    author = "neur0map",
    about = "Hybrid semantic + keyword retrieval over document chunks",
    long_about = "docqa indexes document chunks for both embedding similarity and BM25 keyword \
                  relevance, and answers queries with one fused, cited ranking."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/docqa/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build both indexes over a chunk file and report the snapshot
    Index {
        /// Chunks in JSON Lines format, one chunk per line
        chunks: PathBuf,
    },

    /// Retrieve the best chunks for a query
    Query {
        /// Chunks in JSON Lines format
        chunks: PathBuf,

        /// Search query text
        query: String,

        /// Number of results (defaults to retrieval.default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Earlier conversation turns, oldest first (repeatable)
        #[arg(long = "history", value_name = "TURN")]
        history: Vec<String>,

        /// Signals to use
        #[arg(short, long, value_enum, default_value_t = QueryMode::Hybrid)]
        mode: QueryMode,

        /// Override retrieval.semantic_weight for this query
        #[arg(long)]
        semantic_weight: Option<f32>,

        /// Override retrieval.keyword_weight for this query
        #[arg(long)]
        keyword_weight: Option<f32>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show retriever state for a chunk file
    Stats {
        /// Chunks in JSON Lines format
        chunks: PathBuf,

        /// Show stats in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum QueryMode {
    /// Fuse vector and keyword results
    Hybrid,
    /// Vector similarity only
    Vector,
    /// BM25 keyword relevance only
    Lexical,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

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
