use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "depot: data store administration",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path of the depot configuration file
    #[arg(short, long, global = true, default_value = "depot.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List configured data stores
    Stores,
    /// Restore a data store's data file from backup
    Restore(RestoreArgs),
    /// Write a backup archive of a data store
    Backup(BackupArgs),
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Name of the data store
    pub name: String,
}

#[derive(Args)]
pub struct BackupArgs {
    /// Name of the data store
    pub name: String,
    /// Directory to write the archive to (defaults to the backup directory)
    #[arg(long)]
    pub to: Option<PathBuf>,
}
