//! Cache record types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::entities::SubmissionSummary;
use crate::schema::SchemaMigrations;

/// The two independently expiring record families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Draft,
    Submission,
}

/// Proof of a successful submission kept between visits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub remote_id: String,
    pub summary: SubmissionSummary,
    pub timestamp: DateTime<Utc>,
}

/// Expiry and schema settings for the session cache
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub draft_ttl: Duration,
    pub submission_ttl: Duration,
    pub migrations: SchemaMigrations,
}

impl CacheSettings {
    pub fn ttl(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Draft => self.draft_ttl,
            CacheKind::Submission => self.submission_ttl,
        }
    }

    pub fn schema_version(&self) -> &str {
        self.migrations.current_version()
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            draft_ttl: Duration::hours(24),
            submission_ttl: Duration::hours(48),
            migrations: SchemaMigrations::default(),
        }
    }
}

/// What the cache currently holds, for status displays
#[derive(Debug, Clone, Default)]
pub struct CacheStatus {
    pub draft_saved_at: Option<DateTime<Utc>>,
    pub draft_schema_version: Option<String>,
    pub draft_fresh: bool,
    pub current_step: usize,
    pub completed_steps: BTreeSet<usize>,
    pub submission: Option<SubmissionReceipt>,
    pub key_count: usize,
}
