//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// pcache - GPU program binary cache tool
#[derive(Parser)]
#[command(name = "pcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Cache directory (overrides the configuration)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile every kernel source in a directory into the cache
    Warmup {
        /// Directory holding kernel sources
        dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Kernel source extension (default from config, else "cl")
        #[arg(short, long)]
        extension: Option<String>,

        /// Build options
        #[arg(long, allow_hyphen_values = true)]
        options: Option<String>,
    },

    /// Show cache size and entry counts
    Stats,

    /// List cache entries
    List,

    /// Check that every entry decodes
    Verify {
        /// Delete corrupted entries and stale temporary files
        #[arg(long)]
        prune: bool,
    },

    /// Remove every cache entry
    Clear,
}
