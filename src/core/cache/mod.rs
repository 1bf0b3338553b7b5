//! Versioned, expiring session cache
//!
//! This module keeps the applicant's work between visits:
//! - the in-progress draft, stamped with a time and a schema version
//! - wizard position and completed steps
//! - the receipt of the last successful submission
//!
//! Drafts and receipts expire independently. A draft written under another
//! schema version is treated as absent and purged. Storage failures are
//! logged and degrade to "nothing cached"; they never reach the caller.

mod store;
mod types;

pub use store::{KeyValueStore, MemoryKvStore, SqliteKvStore, StoreError};
pub use types::*;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::entities::{ApplicationDraft, SubmissionSummary};

/// Namespace shared by every cache key
pub const NAMESPACE: &str = "registration:";

/// Logical cache keys
pub mod keys {
    pub const DRAFT: &str = "registration:draft";
    pub const DRAFT_TIMESTAMP: &str = "registration:draft_timestamp";
    pub const DRAFT_VERSION: &str = "registration:draft_schema_version";
    pub const CURRENT_STEP: &str = "registration:current_step";
    pub const COMPLETED_STEPS: &str = "registration:completed_steps";
    pub const SUBMISSION_ID: &str = "registration:submission_id";
    pub const SUBMISSION_TIMESTAMP: &str = "registration:submission_timestamp";
    pub const SUBMISSION_SUMMARY: &str = "registration:submission_summary";
}

/// Session cache over a key-value backend
pub struct PersistenceCache {
    store: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl PersistenceCache {
    pub fn new(
        store: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    // =========================================================================
    // Raw access (every failure degrades to "absent")
    // =========================================================================

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("cache read of {key} failed: {e}");
                None
            }
        }
    }

    fn write(&mut self, key: &str, value: &str) -> bool {
        match self.store.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("cache write of {key} failed: {e}");
                false
            }
        }
    }

    fn delete(&mut self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!("cache delete of {key} failed: {e}");
        }
    }

    fn read_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read(key)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    fn write_timestamp(&mut self, key: &str) -> bool {
        let now = self.clock.now().timestamp_millis();
        self.write(key, &now.to_string())
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    /// True if nothing is stamped for `kind` or its stamp is older than the TTL
    pub fn is_expired(&self, kind: CacheKind) -> bool {
        let key = match kind {
            CacheKind::Draft => keys::DRAFT_TIMESTAMP,
            CacheKind::Submission => keys::SUBMISSION_TIMESTAMP,
        };
        match self.read_timestamp(key) {
            Some(stamp) => self.clock.now() - stamp > self.settings.ttl(kind),
            None => true,
        }
    }

    fn draft_version_matches(&self) -> bool {
        self.read(keys::DRAFT_VERSION).as_deref() == Some(self.settings.schema_version())
    }

    // =========================================================================
    // Draft
    // =========================================================================

    /// Persist the draft without retired fields
    pub fn save_draft(&mut self, draft: &ApplicationDraft) -> bool {
        let clean = self.settings.migrations.stripped(draft);
        let payload = match serde_json::to_string(&clean) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("draft could not be serialized: {e}");
                return false;
            }
        };
        let version = self.settings.schema_version().to_string();
        self.write(keys::DRAFT, &payload)
            && self.write_timestamp(keys::DRAFT_TIMESTAMP)
            && self.write(keys::DRAFT_VERSION, &version)
    }

    /// Cached draft, or `None` (after purging) when expired, stale or corrupt
    pub fn load_draft(&mut self) -> Option<ApplicationDraft> {
        if self.is_expired(CacheKind::Draft) || !self.draft_version_matches() {
            if self.read(keys::DRAFT).is_some() {
                tracing::debug!("discarding expired or outdated cached draft");
            }
            self.purge_draft();
            return None;
        }

        let raw = self.read(keys::DRAFT)?;
        match serde_json::from_str::<ApplicationDraft>(&raw) {
            Ok(mut draft) => {
                self.settings.migrations.strip_retired(&mut draft);
                Some(draft)
            }
            Err(e) => {
                tracing::warn!("cached draft is corrupt, discarding: {e}");
                self.purge_draft();
                None
            }
        }
    }

    /// A fresh draft of the current schema version is cached
    pub fn has_cached_draft(&self) -> bool {
        self.read(keys::DRAFT).is_some()
            && !self.is_expired(CacheKind::Draft)
            && self.draft_version_matches()
    }

    fn purge_draft(&mut self) {
        self.clear_draft_only();
        self.delete(keys::DRAFT_VERSION);
    }

    // =========================================================================
    // Wizard progress
    // =========================================================================

    pub fn save_step(&mut self, step: usize) -> bool {
        self.write(keys::CURRENT_STEP, &step.to_string())
    }

    /// Cached step, defaulting to 1
    pub fn load_step(&self) -> usize {
        self.read(keys::CURRENT_STEP)
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|step| *step >= 1)
            .unwrap_or(1)
    }

    pub fn save_completed_steps(&mut self, steps: &BTreeSet<usize>) -> bool {
        match serde_json::to_string(steps) {
            Ok(raw) => self.write(keys::COMPLETED_STEPS, &raw),
            Err(e) => {
                tracing::warn!("completed steps could not be serialized: {e}");
                false
            }
        }
    }

    /// Cached completed steps; absent or corrupt data yields an empty set
    pub fn load_completed_steps(&self) -> BTreeSet<usize> {
        self.read(keys::COMPLETED_STEPS)
            .and_then(|raw| serde_json::from_str::<BTreeSet<usize>>(&raw).ok())
            .unwrap_or_default()
    }

    // =========================================================================
    // Submission receipt
    // =========================================================================

    pub fn save_submission(&mut self, remote_id: &str, summary: &SubmissionSummary) -> bool {
        let summary = match serde_json::to_string(summary) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("submission summary could not be serialized: {e}");
                return false;
            }
        };
        self.write(keys::SUBMISSION_ID, remote_id)
            && self.write(keys::SUBMISSION_SUMMARY, &summary)
            && self.write_timestamp(keys::SUBMISSION_TIMESTAMP)
    }

    /// Cached receipt, or `None` (after purging) when expired or incomplete
    pub fn load_submission(&mut self) -> Option<SubmissionReceipt> {
        if self.is_expired(CacheKind::Submission) {
            if self.read(keys::SUBMISSION_ID).is_some() {
                tracing::debug!("discarding expired submission receipt");
            }
            self.clear_submission();
            return None;
        }
        let receipt = self.peek_submission();
        if receipt.is_none() {
            self.clear_submission();
        }
        receipt
    }

    fn peek_submission(&self) -> Option<SubmissionReceipt> {
        let remote_id = self.read(keys::SUBMISSION_ID).filter(|id| !id.is_empty())?;
        let timestamp = self.read_timestamp(keys::SUBMISSION_TIMESTAMP)?;
        let summary = self
            .read(keys::SUBMISSION_SUMMARY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Some(SubmissionReceipt {
            remote_id,
            summary,
            timestamp,
        })
    }

    /// A receipt exists and has not expired
    pub fn has_valid_submission(&self) -> bool {
        self.read(keys::SUBMISSION_ID).is_some() && !self.is_expired(CacheKind::Submission)
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Drop the draft and wizard progress, keeping any receipt
    pub fn clear_draft_only(&mut self) {
        for key in [
            keys::DRAFT,
            keys::DRAFT_TIMESTAMP,
            keys::CURRENT_STEP,
            keys::COMPLETED_STEPS,
        ] {
            self.delete(key);
        }
    }

    pub fn clear_submission(&mut self) {
        for key in [
            keys::SUBMISSION_ID,
            keys::SUBMISSION_TIMESTAMP,
            keys::SUBMISSION_SUMMARY,
        ] {
            self.delete(key);
        }
    }

    /// Remove every key in the namespace
    pub fn clear_all(&mut self) {
        let found = match self.store.keys(NAMESPACE) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("cache key listing failed: {e}");
                Vec::new()
            }
        };
        let fixed = [
            keys::DRAFT,
            keys::DRAFT_TIMESTAMP,
            keys::DRAFT_VERSION,
            keys::CURRENT_STEP,
            keys::COMPLETED_STEPS,
            keys::SUBMISSION_ID,
            keys::SUBMISSION_TIMESTAMP,
            keys::SUBMISSION_SUMMARY,
        ];
        for key in found.iter().map(String::as_str).chain(fixed) {
            self.delete(key);
        }
    }

    /// Read-only overview for status displays (nothing is purged)
    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            draft_saved_at: self.read_timestamp(keys::DRAFT_TIMESTAMP),
            draft_schema_version: self.read(keys::DRAFT_VERSION),
            draft_fresh: self.has_cached_draft(),
            current_step: self.load_step(),
            completed_steps: self.load_completed_steps(),
            submission: if self.has_valid_submission() {
                self.peek_submission()
            } else {
                None
            },
            key_count: self.store.keys(NAMESPACE).map(|k| k.len()).unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for PersistenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCache")
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests;
