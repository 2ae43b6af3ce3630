pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::OutputFormat;

#[derive(Parser)]
#[command(name = "freshet", version)]
#[command(about = "Fetch feeds and report only what is new", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/freshet/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every feed once and output the new items
    Run {
        /// Number of feeds processed in parallel
        #[arg(short, long)]
        workers: Option<usize>,

        /// Cancel the run after this many seconds
        #[arg(short, long)]
        deadline: Option<u64>,

        /// Do not remember the items of this run
        #[arg(long)]
        no_cache_update: bool,

        /// Write a single output to stdout in this format instead of the
        /// configured outputs
        #[arg(short, long, value_enum)]
        output: Option<OutputArg>,
    },
    /// List configured feeds
    Feeds,
    /// Inspect or maintain the item cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Print every cache entry
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove expired entries and entries of feeds no longer configured
    Prune,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Text,
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Text => OutputFormat::Text,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}
