//! `intake config` command - Show the effective configuration
//!
//! Values are resolved through every layer: built-in defaults, the global
//! user config, the workspace config and `INTAKE_*` environment variables.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::helpers::open_workspace;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration values
    Show {
        /// Show only this key's value
        key: Option<String>,
    },

    /// Show paths to configuration files
    Path,
}

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    draft_ttl_hours: u64,
    submission_ttl_hours: u64,
    autosave_debounce_ms: u128,
    schema_version: String,
    retired_fields: Vec<String>,
    correction_code_ttl_hours: i64,
}

impl EffectiveConfig {
    fn resolve(config: &Config) -> Self {
        let migrations = config.migrations();
        Self {
            draft_ttl_hours: config.draft_ttl_hours(),
            submission_ttl_hours: config.submission_ttl_hours(),
            autosave_debounce_ms: config.autosave_debounce().as_millis(),
            schema_version: migrations.current_version().to_string(),
            retired_fields: migrations
                .retired_fields()
                .iter()
                .map(|p| p.to_string())
                .collect(),
            correction_code_ttl_hours: config.correction_code_ttl().num_hours(),
        }
    }

    fn value_of(&self, key: &str) -> Option<String> {
        let value = match key {
            "draft_ttl_hours" => self.draft_ttl_hours.to_string(),
            "submission_ttl_hours" => self.submission_ttl_hours.to_string(),
            "autosave_debounce_ms" => self.autosave_debounce_ms.to_string(),
            "schema_version" => self.schema_version.clone(),
            "retired_fields" => self.retired_fields.join(","),
            "correction_code_ttl_hours" => self.correction_code_ttl_hours.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show { key } => run_show(key.as_deref(), global),
        ConfigCommands::Path => run_path(global),
    }
}

fn load(global: &GlobalOpts) -> Config {
    match open_workspace(global) {
        Ok(workspace) => Config::load_for(&workspace),
        Err(_) => Config::load(),
    }
}

fn run_show(key: Option<&str>, global: &GlobalOpts) -> Result<()> {
    let effective = EffectiveConfig::resolve(&load(global));

    if let Some(key) = key {
        let value = effective
            .value_of(key)
            .ok_or_else(|| miette::miette!("Unknown configuration key '{}'", key))?;
        println!("{value}");
        return Ok(());
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&effective).into_diagnostic()?);
        }
        _ => print!("{}", serde_yml::to_string(&effective).into_diagnostic()?),
    }
    Ok(())
}

fn run_path(global: &GlobalOpts) -> Result<()> {
    match Config::global_config_path() {
        Some(path) => println!(
            "{} {}{}",
            style("Global:   ").bold(),
            path.display(),
            if path.exists() { "" } else { " (not present)" }
        ),
        None => println!("{} (no home directory)", style("Global:   ").bold()),
    }
    match open_workspace(global) {
        Ok(workspace) => println!(
            "{} {}",
            style("Workspace:").bold(),
            workspace.config_path().display()
        ),
        Err(_) => println!("{} (not in a workspace)", style("Workspace:").bold()),
    }
    Ok(())
}
