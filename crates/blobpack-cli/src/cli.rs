use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobpack",
    about = "blobpack: content-addressed blob store packed into segment files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Base path of the store (files are `<store>_idx.txt`, `<store>_0.txt`, ...)
    #[arg(short, long, global = true, default_value = "blobpack")]
    pub store: PathBuf,

    /// TOML file with store settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Segment size limit in bytes, overriding the config file
    #[arg(long, global = true)]
    pub max_segment_size: Option<u64>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file (or stdin) and print its id
    Put(PutArgs),
    /// Write a blob to stdout or a file
    Get(GetArgs),
    /// List stored blob ids
    List,
    /// Show store statistics
    Stat,
    /// Re-hash every blob and report mismatches
    Verify,
}

#[derive(Args)]
pub struct PutArgs {
    /// Files to store; `-` reads stdin
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Blob id (40 hex characters)
    pub id: String,
    /// Output file; defaults to stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
