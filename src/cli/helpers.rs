//! Shared helper functions for CLI commands
//!
//! Opening the workspace and wiring cache, registry, service and session
//! together happens here so every command builds them the same way.

use chrono::{DateTime, Local, Utc};
use console::style;
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cli::GlobalOpts;
use crate::core::cache::{PersistenceCache, SqliteKvStore};
use crate::core::clock::SystemClock;
use crate::core::{Config, Workspace};
use crate::registration::{
    Notice, NoticeLevel, RegistrationOrchestrator, RegistrationRepository, RegistrationService,
    SessionEvent, SessionOptions,
};
use crate::remote::LocalRegistry;
use crate::schema::{SchemaRegistry, SchemaValidator};

/// Workspace selected by `--workspace` or discovered from the current directory
pub fn open_workspace(global: &GlobalOpts) -> Result<Workspace> {
    let found = match &global.workspace {
        Some(path) => Workspace::discover_from(path),
        None => Workspace::discover(),
    };
    found.map_err(|e| miette::miette!("{}", e))
}

/// Everything a command needs to talk to the session cache and the registry
pub struct Context {
    pub workspace: Workspace,
    pub config: Config,
    pub registry: Arc<LocalRegistry>,
    pub validator: Arc<SchemaValidator>,
}

impl Context {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let workspace = open_workspace(global)?;
        let config = Config::load_for(&workspace);
        let registry = LocalRegistry::open(&workspace.registry_db_path()).into_diagnostic()?;
        Ok(Self {
            workspace,
            config,
            registry: Arc::new(registry),
            validator: Arc::new(SchemaValidator::new(SchemaRegistry::embedded())),
        })
    }

    pub fn cache(&self) -> PersistenceCache {
        open_cache(&self.workspace, &self.config)
    }

    pub fn service(&self) -> RegistrationService {
        let clock = Arc::new(SystemClock);
        let repository = RegistrationRepository::new(self.registry.clone(), clock);
        RegistrationService::new(repository, self.registry.clone(), Arc::clone(&self.validator))
    }

    /// A session in `Loading` mode; call `initialize` before use
    pub fn session(
        &self,
    ) -> Result<(RegistrationOrchestrator, mpsc::UnboundedReceiver<SessionEvent>)> {
        let options = SessionOptions {
            autosave_delay: self.config.autosave_debounce(),
        };
        Ok(RegistrationOrchestrator::new(
            self.service(),
            self.cache(),
            options,
        ))
    }
}

/// The session cache alone, without touching the registry
///
/// An unreadable cache file is recreated rather than reported.
pub fn open_cache(workspace: &Workspace, config: &Config) -> PersistenceCache {
    PersistenceCache::new(
        SqliteKvStore::open_or_recover(&workspace.session_db_path()),
        Arc::new(SystemClock),
        config.cache_settings(),
    )
}

/// Print every notice published so far
pub fn drain_notices(events: &mut mpsc::UnboundedReceiver<SessionEvent>, quiet: bool) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Notice(notice) => print_notice(&notice, quiet),
            SessionEvent::ModeChanged(mode) => tracing::debug!(%mode, "mode changed"),
            SessionEvent::StepChanged(step) => tracing::debug!(step, "step changed"),
        }
    }
}

/// Errors and warnings are always shown; the rest respects `--quiet`
pub fn print_notice(notice: &Notice, quiet: bool) {
    let marker = match notice.level {
        NoticeLevel::Info => style("i").blue(),
        NoticeLevel::Success => style("✓").green(),
        NoticeLevel::Warning => style("!").yellow(),
        NoticeLevel::Error => style("✗").red(),
    };
    if quiet && matches!(notice.level, NoticeLevel::Info | NoticeLevel::Success) {
        return;
    }
    println!("{} {} {}", marker, style(&notice.title).bold(), notice.message);
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("Délégué régional", 8), "Délég...");
    }
}
