//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    cache::CacheCommands, completions::CompletionsArgs, config::ConfigCommands, fill::FillArgs,
    init::InitArgs, reset::ResetArgs, review::ReviewCommands, status::StatusArgs,
};

#[derive(Parser)]
#[command(name = "intake")]
#[command(author, version, about = "Application intake wizard")]
#[command(long_about = "Fill in a multi-step registration application, resume it after an interruption, and answer reviewer correction requests.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose (debug) logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Workspace root (default: auto-detect by finding .intake/)
    #[arg(long, global = true, env = "INTAKE_WORKSPACE")]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new intake workspace
    Init(InitArgs),

    /// Fill in (or correct) an application interactively
    Fill(FillArgs),

    /// Show the state of the current session
    Status(StatusArgs),

    /// Discard the current draft and any submission receipt
    Reset(ResetArgs),

    /// Inspect or clear the local session cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Reviewer side of the local registry
    #[command(subcommand)]
    Review(ReviewCommands),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Auto,
    /// YAML (full fidelity)
    Yaml,
    /// JSON (for programs)
    Json,
    /// Just IDs, one per line
    Id,
}
