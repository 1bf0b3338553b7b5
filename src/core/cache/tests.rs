use super::*;
use crate::core::clock::ManualClock;
use crate::entities::FieldPath;
use crate::schema::SchemaMigrations;
use chrono::{Duration, TimeZone};
use serde_json::json;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ))
}

fn cache_with(store: Box<dyn KeyValueStore>, clock: Arc<ManualClock>) -> PersistenceCache {
    PersistenceCache::new(store, clock, CacheSettings::default())
}

fn sample_draft() -> ApplicationDraft {
    let mut draft = ApplicationDraft::default();
    draft.identity.insert("firstName".into(), json!("Awa"));
    draft.identity.insert("lastName".into(), json!("Diallo"));
    draft.address.insert("commune".into(), json!("Poto-Poto"));
    draft
}

#[test]
fn test_draft_roundtrip() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    assert!(cache.save_draft(&sample_draft()));
    assert!(cache.has_cached_draft());
    assert_eq!(cache.load_draft(), Some(sample_draft()));
}

#[test]
fn test_draft_ttl_boundary() {
    let clock = clock();
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), Arc::clone(&clock));
    cache.save_draft(&sample_draft());

    clock.advance(Duration::hours(24));
    assert!(!cache.is_expired(CacheKind::Draft));
    assert!(cache.load_draft().is_some());

    clock.advance(Duration::milliseconds(1));
    assert!(cache.is_expired(CacheKind::Draft));
    assert!(cache.load_draft().is_none());
    assert!(!cache.has_cached_draft());
}

#[test]
fn test_expired_draft_purges_progress() {
    let clock = clock();
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), Arc::clone(&clock));
    cache.save_draft(&sample_draft());
    cache.save_step(3);
    cache.save_completed_steps(&BTreeSet::from([1, 2]));

    clock.advance(Duration::hours(25));
    assert!(cache.load_draft().is_none());
    assert_eq!(cache.load_step(), 1);
    assert!(cache.load_completed_steps().is_empty());
}

#[test]
fn test_draft_from_other_schema_version_is_discarded() {
    let clock = clock();
    let mut old = PersistenceCache::new(
        Box::new(MemoryKvStore::new()),
        Arc::clone(&clock) as Arc<dyn Clock>,
        CacheSettings {
            migrations: SchemaMigrations::for_version("1"),
            ..CacheSettings::default()
        },
    );
    old.save_draft(&sample_draft());
    assert_eq!(old.status().draft_schema_version.as_deref(), Some("1"));

    // Reopen the same entries under the current version
    let store = std::mem::replace(&mut old.store, Box::new(MemoryKvStore::new()));
    let mut current = cache_with(store, clock);
    assert!(!current.has_cached_draft());
    assert!(current.load_draft().is_none());
    assert!(current.status().draft_schema_version.is_none());
}

#[test]
fn test_retired_fields_never_cached() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    let mut draft = sample_draft();
    draft
        .identity
        .insert("maritalStatus".into(), json!("single"));
    draft
        .employment
        .insert("monthlyIncome".into(), json!(250000));

    cache.save_draft(&draft);
    let raw = cache.read(keys::DRAFT).unwrap();
    assert!(!raw.contains("maritalStatus"));
    assert!(!raw.contains("monthlyIncome"));

    let loaded = cache.load_draft().unwrap();
    assert!(loaded
        .get(&FieldPath::parse("identity.maritalStatus").unwrap())
        .is_none());
    assert_eq!(loaded.identity.get("firstName"), Some(&json!("Awa")));
}

#[test]
fn test_retired_fields_stripped_on_load() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    cache.save_draft(&sample_draft());
    // Entry written by an older build that did not strip on save
    cache.write(
        keys::DRAFT,
        r#"{"identity":{"firstName":"Awa","maritalStatus":"married"}}"#,
    );
    let loaded = cache.load_draft().unwrap();
    assert!(!loaded.identity.contains_key("maritalStatus"));
}

#[test]
fn test_corrupt_draft_is_purged() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    cache.save_draft(&sample_draft());
    cache.write(keys::DRAFT, "{not json");
    assert!(cache.load_draft().is_none());
    assert!(cache.read(keys::DRAFT).is_none());
    assert!(cache.read(keys::DRAFT_VERSION).is_none());
}

#[test]
fn test_step_defaults_and_corruption() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    assert_eq!(cache.load_step(), 1);
    cache.save_step(3);
    assert_eq!(cache.load_step(), 3);
    cache.write(keys::CURRENT_STEP, "three");
    assert_eq!(cache.load_step(), 1);
    cache.write(keys::CURRENT_STEP, "0");
    assert_eq!(cache.load_step(), 1);
}

#[test]
fn test_completed_steps_corrupt_yields_empty() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    cache.save_completed_steps(&BTreeSet::from([1, 3]));
    assert_eq!(cache.load_completed_steps(), BTreeSet::from([1, 3]));

    cache.write(keys::COMPLETED_STEPS, "[1, \"two\"]");
    assert!(cache.load_completed_steps().is_empty());
}

#[test]
fn test_submission_receipt_roundtrip_and_expiry() {
    let clock = clock();
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), Arc::clone(&clock));
    let summary = sample_draft().summary();
    assert!(cache.save_submission("APP-01HXYZ", &summary));

    let receipt = cache.load_submission().unwrap();
    assert_eq!(receipt.remote_id, "APP-01HXYZ");
    assert_eq!(receipt.summary.first_name.as_deref(), Some("Awa"));
    assert_eq!(receipt.timestamp, clock.now());

    clock.advance(Duration::hours(48));
    assert!(cache.has_valid_submission());

    clock.advance(Duration::seconds(1));
    assert!(!cache.has_valid_submission());
    assert!(cache.load_submission().is_none());
    assert!(cache.read(keys::SUBMISSION_ID).is_none());
}

#[test]
fn test_receipt_without_timestamp_is_purged() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    cache.write(keys::SUBMISSION_ID, "APP-01HXYZ");
    assert!(cache.load_submission().is_none());
    assert!(cache.read(keys::SUBMISSION_ID).is_none());
}

#[test]
fn test_clear_draft_only_keeps_receipt() {
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), clock());
    cache.save_draft(&sample_draft());
    cache.save_step(2);
    cache.save_submission("APP-1", &SubmissionSummary::default());

    cache.clear_draft_only();
    assert!(!cache.has_cached_draft());
    assert_eq!(cache.load_step(), 1);
    assert!(cache.has_valid_submission());
}

#[test]
fn test_clear_all_removes_namespace_only() {
    let mut store = MemoryKvStore::new();
    store.set("other:key", "kept").unwrap();
    store.set("registration:legacy", "x").unwrap();
    let mut cache = cache_with(Box::new(store), clock());
    cache.save_draft(&sample_draft());
    cache.save_submission("APP-1", &SubmissionSummary::default());

    cache.clear_all();
    assert_eq!(cache.status().key_count, 0);
    assert_eq!(cache.read("other:key").as_deref(), Some("kept"));
}

#[test]
fn test_quota_errors_degrade_silently() {
    let mut cache = cache_with(Box::new(MemoryKvStore::with_limit(1)), clock());
    assert!(!cache.save_draft(&sample_draft()));
    assert!(!cache.has_cached_draft());
    assert!(cache.load_draft().is_none());
    assert!(!cache.save_submission("APP-1", &SubmissionSummary::default()));
}

#[test]
fn test_status_does_not_purge() {
    let clock = clock();
    let mut cache = cache_with(Box::new(MemoryKvStore::new()), Arc::clone(&clock));
    cache.save_draft(&sample_draft());
    clock.advance(Duration::days(2));

    let status = cache.status();
    assert!(!status.draft_fresh);
    assert!(status.draft_saved_at.is_some());
    assert!(cache.read(keys::DRAFT).is_some());
}

#[test]
fn test_sqlite_backed_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("session.db");
    let clock = clock();
    {
        let store = SqliteKvStore::open(&path).unwrap();
        let mut cache = cache_with(Box::new(store), Arc::clone(&clock));
        cache.save_draft(&sample_draft());
        cache.save_step(2);
    }
    let store = SqliteKvStore::open(&path).unwrap();
    let mut cache = cache_with(Box::new(store), clock);
    assert_eq!(cache.load_step(), 2);
    assert_eq!(cache.load_draft(), Some(sample_draft()));
}
