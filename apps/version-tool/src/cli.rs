use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root (overrides config and DSV_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Snapshot a dataset as a new version and print its id
    Create {
        /// Cleaned dataset file
        #[arg(short, long)]
        input: PathBuf,

        /// JSON sidecar with `columns` (and optionally `row_count`); CSV input is profiled when omitted
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Source identifier recorded in the version (defaults to the input path)
        #[arg(long)]
        source: Option<String>,

        /// Upstream quality score in [0, 1]
        #[arg(long)]
        quality_score: Option<f64>,

        /// Activate the new version regardless of policy
        #[arg(long, conflicts_with = "no_activate")]
        activate: bool,

        /// Leave the active version unchanged regardless of policy
        #[arg(long)]
        no_activate: bool,
    },

    /// Compare two versions and write the report
    Compare {
        /// Base version
        a: String,

        /// Version compared against the base
        b: String,

        /// Report path (defaults to the configured report path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Make an existing version active
    Rollback {
        /// Target version id
        id: String,
    },

    /// List all versions, marking the active one
    List,

    /// Show the rollback history
    History,

    /// Show one version's metadata
    Info {
        /// Version id
        id: String,
    },

    /// Check a version's payload against its recorded digest
    Verify {
        /// Version id
        id: String,
    },
}

impl Commands {
    /// Activation override from `--activate` / `--no-activate`.
    pub fn activation_override(activate: bool, no_activate: bool) -> Option<bool> {
        match (activate, no_activate) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
