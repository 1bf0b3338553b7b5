//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::cache::CacheSettings;
use crate::core::workspace::Workspace;
use crate::schema::SchemaMigrations;

pub const DEFAULT_DRAFT_TTL_HOURS: u64 = 24;
pub const DEFAULT_SUBMISSION_TTL_HOURS: u64 = 48;
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_CORRECTION_CODE_TTL_HOURS: u64 = 72;

/// Intake configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Hours a cached draft stays usable
    pub draft_ttl_hours: Option<u64>,

    /// Hours a submission receipt stays usable
    pub submission_ttl_hours: Option<u64>,

    /// Quiet period before an autosave is written
    pub autosave_debounce_ms: Option<u64>,

    /// Draft schema version stamped on cached drafts
    pub schema_version: Option<String>,

    /// Extra retired field paths (section.field) stripped on save and submit
    pub retired_fields: Vec<String>,

    /// Lifetime of correction codes issued by the local registry
    pub correction_code_ttl_hours: Option<u64>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let workspace = Workspace::discover().ok();
        Self::load_layers(
            Self::global_config_path().as_deref(),
            workspace.as_ref().map(|ws| ws.config_path()).as_deref(),
        )
    }

    /// Load configuration for a known workspace
    pub fn load_for(workspace: &Workspace) -> Self {
        Self::load_layers(
            Self::global_config_path().as_deref(),
            Some(&workspace.config_path()),
        )
    }

    fn load_layers(global: Option<&Path>, local: Option<&Path>) -> Self {
        // 1. Built-in defaults (Default impl + accessors)
        let mut config = Config::default();

        // 2. Global user config (~/.config/intake/config.yaml)
        if let Some(layer) = global.and_then(Self::read_file) {
            config.merge(layer);
        }

        // 3. Workspace config (.intake/config.yaml)
        if let Some(layer) = local.and_then(Self::read_file) {
            config.merge(layer);
        }

        // 4. Environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring unreadable config {}: {e}", path.display());
                None
            }
        }
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "intake")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.draft_ttl_hours.is_some() {
            self.draft_ttl_hours = other.draft_ttl_hours;
        }
        if other.submission_ttl_hours.is_some() {
            self.submission_ttl_hours = other.submission_ttl_hours;
        }
        if other.autosave_debounce_ms.is_some() {
            self.autosave_debounce_ms = other.autosave_debounce_ms;
        }
        if other.schema_version.is_some() {
            self.schema_version = other.schema_version;
        }
        if other.correction_code_ttl_hours.is_some() {
            self.correction_code_ttl_hours = other.correction_code_ttl_hours;
        }
        for path in other.retired_fields {
            if !self.retired_fields.contains(&path) {
                self.retired_fields.push(path);
            }
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let number = |key: &str| {
            var(key).and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("ignoring {key}={raw}: not a whole number");
                    None
                }
            })
        };
        if let Some(n) = number("INTAKE_DRAFT_TTL_HOURS") {
            self.draft_ttl_hours = Some(n);
        }
        if let Some(n) = number("INTAKE_SUBMISSION_TTL_HOURS") {
            self.submission_ttl_hours = Some(n);
        }
        if let Some(n) = number("INTAKE_AUTOSAVE_DEBOUNCE_MS") {
            self.autosave_debounce_ms = Some(n);
        }
        if let Some(n) = number("INTAKE_CORRECTION_CODE_TTL_HOURS") {
            self.correction_code_ttl_hours = Some(n);
        }
        if let Some(version) = var("INTAKE_SCHEMA_VERSION").filter(|v| !v.trim().is_empty()) {
            self.schema_version = Some(version.trim().to_string());
        }
    }

    pub fn draft_ttl_hours(&self) -> u64 {
        self.draft_ttl_hours.unwrap_or(DEFAULT_DRAFT_TTL_HOURS)
    }

    pub fn submission_ttl_hours(&self) -> u64 {
        self.submission_ttl_hours
            .unwrap_or(DEFAULT_SUBMISSION_TTL_HOURS)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(
            self.autosave_debounce_ms
                .unwrap_or(DEFAULT_AUTOSAVE_DEBOUNCE_MS),
        )
    }

    pub fn correction_code_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(hours(
            self.correction_code_ttl_hours
                .unwrap_or(DEFAULT_CORRECTION_CODE_TTL_HOURS),
        ))
    }

    /// Migration rules for the configured schema version
    pub fn migrations(&self) -> SchemaMigrations {
        let migrations = match &self.schema_version {
            Some(version) => SchemaMigrations::for_version(version),
            None => SchemaMigrations::new(),
        };
        migrations.with_extra_retired(&self.retired_fields)
    }

    /// Cache expiry and versioning settings
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            draft_ttl: chrono::Duration::hours(hours(self.draft_ttl_hours())),
            submission_ttl: chrono::Duration::hours(hours(self.submission_ttl_hours())),
            migrations: self.migrations(),
        }
    }
}

fn hours(n: u64) -> i64 {
    const MAX_HOURS: i64 = i64::MAX / 3_600_000;
    i64::try_from(n).unwrap_or(MAX_HOURS).min(MAX_HOURS)
}
