use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pkgsweep")]
#[command(about = "Package cache optimizer: plan, quarantine, dedup, roll back", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Root directory for the index, canonical store and quarantine
    /// (default: ~/.pkgsweep)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Days a package stays protected after its last access
    #[arg(long, global = true)]
    pub preserve_days: Option<i64>,

    /// Enable or disable the predictive scorer
    #[arg(long, global = true)]
    pub enable_ml: Option<bool>,

    /// Enable or disable symlink deduplication
    #[arg(long, global = true)]
    pub enable_symlinking: Option<bool>,

    /// LRU capacity in package count
    #[arg(long, global = true)]
    pub lru_max_packages: Option<usize>,

    /// LRU capacity in bytes
    #[arg(long, global = true)]
    pub lru_max_size_bytes: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute a cleanup plan from a scan snapshot (JSON file)
    Plan {
        /// Path to the scan snapshot
        scan: PathBuf,
    },
    /// Compute a plan and quarantine every reclaim target in it
    Optimize {
        /// Path to the scan snapshot
        scan: PathBuf,
        /// Skip checksum verification
        #[arg(long)]
        fast: bool,
    },
    /// Collapse duplicate package locations into store symlinks
    Symlink {
        /// Path to the scan snapshot
        scan: PathBuf,
    },
    /// Quarantine explicit cache paths
    Quarantine {
        /// Directories to quarantine
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        /// Skip checksum verification
        #[arg(long)]
        fast: bool,
    },
    /// Restore a quarantined path to its original location
    Rollback {
        /// Quarantine record id
        #[arg(long, conflicts_with = "latest")]
        id: Option<String>,
        /// Restore the most recent entry instead
        #[arg(long)]
        latest: bool,
    },
    /// Permanently delete quarantined data past the retention policy
    Sweep,
    /// Show quarantine statistics
    Stats,
    /// Print configuration values
    PrintConfig,
}
