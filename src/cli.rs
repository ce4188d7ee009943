use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::archive;
use crate::storage::StorageKind;

/// Command-line arguments for packhorse.
#[derive(Parser, Debug)]
#[clap(
    name = "packhorse",
    about = "Tool for efficient backups: archive local files and stream them into remote storage",
    version
)]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a new backup
    Save(SaveOpts),
}

/// Options for the save subcommand.
#[derive(ClapArgs, Debug)]
pub struct SaveOpts {
    /// Files or directories to back up
    #[clap(value_name = "FILE/DIR", required = true)]
    pub resources: Vec<PathBuf>,

    /// Backup name, e.g. "my-backup@2024-02-01". Required when handling more
    /// than one file or directory.
    #[clap(short = 'o', long)]
    pub name: Option<String>,

    /// Archive format tag used to derive the backup name's suffix
    #[clap(short, long, default_value = archive::DEFAULT_FORMAT)]
    pub format: String,

    /// Storage backend; may be omitted when --config names one
    #[clap(long, value_enum)]
    pub storage: Option<StorageKind>,

    /// Path to a YAML configuration file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Swift container that receives the backup object
    #[clap(long)]
    pub swift_container: Option<String>,

    /// MD5 hash of the object; when set, the server verifies the upload
    /// against it
    #[clap(long)]
    pub swift_hash: Option<String>,

    /// Content type stored with the object
    #[clap(long)]
    pub swift_content_type: Option<String>,
}
