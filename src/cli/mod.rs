//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vigia",
    version,
    about = "Classify, deduplicate and summarize social-media mentions",
    long_about = "Vigia classifies monitored posts into priority tiers, suppresses repeated content \
                  within a cooldown window, keeps a day-partitioned alert ledger and renders digests \
                  for notifiers and operators."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/vigia/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config (e.g., "elecciones")
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
    /// Run a JSONL file of candidate items through the engine
    Replay {
        /// File with one JSON candidate item per line
        input: PathBuf,

        /// Save the ledger and metrics to the configured database
        #[arg(long)]
        persist: bool,

        /// Print the daily digest when done
        #[arg(short, long)]
        digest: bool,

        /// Print every alert-worthy record as it is forwarded
        #[arg(long)]
        show_alerts: bool,
    },

    /// Print a digest from stored alerts
    Digest {
        /// Day to summarize (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Seven days ending at the date instead of one
        #[arg(short, long)]
        weekly: bool,
    },

    /// Print the trend digest from the stored metrics snapshot
    Trends,

    /// Show a stored alert by id or fingerprint
    Lookup {
        /// Alert id or content fingerprint
        key: String,
    },

    /// Run an operator command (resumen, tendencias, semana, buscar, nivel, ayuda)
    Command {
        /// Command and its arguments
        #[arg(required = true, num_args = 1..)]
        line: Vec<String>,
    },

    /// Show store statistics
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
    Show {
        /// Show only a specific section (e.g., "classifier")
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
