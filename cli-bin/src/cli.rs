// src/cli.rs
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// mediacat – media catalog builder (CLI utilities)
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a catalog from scratch and sync it
    ///
    /// Any existing file at <CATALOG> is replaced.
    ///
    /// Example:
    ///     mediacat create movies.db --dir ~/Videos --dir /mnt/nas/films
    Create {
        /// Catalog file
        catalog: PathBuf,
        /// Directory to watch (repeatable)
        #[arg(long = "dir", required = true)]
        dirs: Vec<String>,
    },

    /// Bring an existing catalog in line with the filesystem
    ///
    /// Ctrl-C stops after the files in flight; everything already
    /// committed stays in the catalog.
    Sync {
        /// Catalog file
        catalog: PathBuf,
    },

    /// Show watched directories and their file counts
    Info {
        /// Catalog file
        catalog: PathBuf,
    },

    /// Retarget watched directories to a new location
    ///
    /// Every directory whose path starts with <ORIG> gets that prefix
    /// replaced by <NEW>. File records are kept.
    ///
    /// Example:
    ///     mediacat mod movies.db --orig /mnt/old --new /mnt/nas
    Mod {
        /// Catalog file
        catalog: PathBuf,
        /// Prefix to replace
        #[arg(long)]
        orig: String,
        /// Replacement prefix
        #[arg(long)]
        new: String,
    },

    /// Generate shell completions (hidden)
    #[command(hide = true)]
    Completions {
        /// Shell to generate for
        #[arg(value_enum)]
        shell: Shell,
    },
}
