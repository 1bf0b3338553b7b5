//! Draft schema versions and the fields each revision retired
//!
//! Drafts cached under an older schema version are discarded outright; the
//! retired-field table is applied on every save and load so that fields
//! dropped by a revision never reach the cache or the remote store.

use crate::entities::{ApplicationDraft, FieldPath};

/// Schema version written with every cached draft
pub const CURRENT_SCHEMA_VERSION: &str = "2";

/// Fields removed by each schema revision: (revision, path)
const RETIRED_FIELDS: &[(&str, &str)] = &[
    ("2", "identity.maritalStatus"),
    ("2", "employment.monthlyIncome"),
];

/// Migration rules for the draft schema
#[derive(Debug, Clone)]
pub struct SchemaMigrations {
    current_version: String,
    retired: Vec<FieldPath>,
}

impl SchemaMigrations {
    /// Built-in rules for the current schema version
    pub fn new() -> Self {
        Self::for_version(CURRENT_SCHEMA_VERSION)
    }

    /// Rules for a given version: every field retired up to and including it
    pub fn for_version(version: &str) -> Self {
        let retired = RETIRED_FIELDS
            .iter()
            .filter(|(since, _)| version_at_least(version, since))
            .filter_map(|(_, path)| FieldPath::parse(path).ok())
            .collect();
        Self {
            current_version: version.to_string(),
            retired,
        }
    }

    /// Add deployment-specific retired paths (invalid paths are skipped)
    pub fn with_extra_retired<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            match FieldPath::parse(path.as_ref()) {
                Ok(p) if !self.retired.contains(&p) => self.retired.push(p),
                Ok(_) => {}
                Err(e) => tracing::warn!("ignoring retired field entry: {e}"),
            }
        }
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn retired_fields(&self) -> &[FieldPath] {
        &self.retired
    }

    /// Remove retired fields in place, returning how many were removed
    pub fn strip_retired(&self, draft: &mut ApplicationDraft) -> usize {
        self.retired
            .iter()
            .filter(|path| draft.remove(path).is_some())
            .count()
    }

    /// Copy of `draft` without retired fields
    pub fn stripped(&self, draft: &ApplicationDraft) -> ApplicationDraft {
        let mut copy = draft.clone();
        self.strip_retired(&mut copy);
        copy
    }
}

impl Default for SchemaMigrations {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric comparison of dotted versions, falling back to string equality
fn version_at_least(version: &str, since: &str) -> bool {
    let parse = |v: &str| -> Option<Vec<u64>> { v.split('.').map(|p| p.parse().ok()).collect() };
    match (parse(version), parse(since)) {
        (Some(a), Some(b)) => a >= b,
        _ => version == since,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_retired_fields() {
        let migrations = SchemaMigrations::new();
        let mut draft = ApplicationDraft::default();
        draft.identity.insert("firstName".into(), json!("Awa"));
        draft.identity.insert("maritalStatus".into(), json!("single"));

        assert_eq!(migrations.strip_retired(&mut draft), 1);
        assert!(!draft.identity.contains_key("maritalStatus"));
        assert_eq!(draft.identity["firstName"], json!("Awa"));
        assert_eq!(migrations.strip_retired(&mut draft), 0);
    }

    #[test]
    fn test_older_version_keeps_fields() {
        let migrations = SchemaMigrations::for_version("1");
        assert!(migrations.retired_fields().is_empty());
    }

    #[test]
    fn test_extra_retired_paths() {
        let migrations = SchemaMigrations::new()
            .with_extra_retired(["address.street", "not-a-path", "identity.maritalStatus"]);
        let paths: Vec<String> = migrations
            .retired_fields()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert!(paths.contains(&"address.street".to_string()));
        assert_eq!(
            paths.iter().filter(|p| *p == "identity.maritalStatus").count(),
            1
        );
    }

    #[test]
    fn test_version_compare() {
        assert!(version_at_least("2", "2"));
        assert!(version_at_least("10", "2"));
        assert!(!version_at_least("1.9", "2"));
        assert!(version_at_least("beta", "beta"));
    }
}
