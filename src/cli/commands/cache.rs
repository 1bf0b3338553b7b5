//! `intake cache` command - Inspect or clear the local session cache
//!
//! The cache is a user-local SQLite key-value store (`.intake/session.db`)
//! holding the autosaved draft, wizard progress and the last submission
//! receipt. It is gitignored and safe to delete.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{format_timestamp, open_cache, open_workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show what the cache currently holds
    Status,

    /// Clear the cache
    Clear {
        /// Keep the submission receipt, drop only the draft and progress
        #[arg(long)]
        draft_only: bool,
    },
}

pub fn run(cmd: CacheCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CacheCommands::Status => run_status(global),
        CacheCommands::Clear { draft_only } => run_clear(draft_only, global),
    }
}

fn run_status(global: &GlobalOpts) -> Result<()> {
    let workspace = open_workspace(global)?;
    let config = Config::load_for(&workspace);
    let cache = open_cache(&workspace, &config);
    let status = cache.status();

    if global.format == OutputFormat::Json {
        let view = serde_json::json!({
            "location": workspace.session_db_path(),
            "keys": status.key_count,
            "draftSavedAt": status.draft_saved_at,
            "draftSchemaVersion": status.draft_schema_version,
            "draftFresh": status.draft_fresh,
            "currentStep": status.current_step,
            "completedSteps": status.completed_steps,
            "submission": status.submission,
        });
        println!("{}", serde_json::to_string_pretty(&view).into_diagnostic()?);
        return Ok(());
    }

    println!("{}", style("Cache Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!(
        "  Location:        {}",
        workspace.session_db_path().display()
    );
    println!("  Keys:            {}", style(status.key_count).cyan());

    match status.draft_saved_at {
        Some(saved) => {
            let freshness = if status.draft_fresh {
                style("fresh").green()
            } else {
                style("stale").yellow()
            };
            println!(
                "  Draft:           saved {} ({}, schema v{})",
                format_timestamp(&saved),
                freshness,
                status.draft_schema_version.as_deref().unwrap_or("?")
            );
            println!("  Step:            {}", status.current_step);
        }
        None => println!("  Draft:           {}", style("none").dim()),
    }

    match &status.submission {
        Some(receipt) => println!(
            "  Submission:      {} on {}",
            style(&receipt.remote_id).cyan(),
            format_timestamp(&receipt.timestamp)
        ),
        None => println!("  Submission:      {}", style("none").dim()),
    }
    Ok(())
}

fn run_clear(draft_only: bool, global: &GlobalOpts) -> Result<()> {
    let workspace = open_workspace(global)?;
    let config = Config::load_for(&workspace);
    let mut cache = open_cache(&workspace, &config);

    if draft_only {
        cache.clear_draft_only();
    } else {
        cache.clear_all();
    }

    if !global.quiet {
        println!(
            "{} {}",
            style("✓").green(),
            if draft_only {
                "Draft cleared"
            } else {
                "Cache cleared"
            }
        );
    }
    Ok(())
}
