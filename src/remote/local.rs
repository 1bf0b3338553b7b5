//! SQLite-backed registry implementing both remote collaborators
//!
//! Used by the CLI as the "remote" side of a single-machine deployment and
//! by the integration tests. Correction codes are never stored in clear:
//! the record keeps a SHA-256 digest salted with the record id.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::core::clock::{Clock, SystemClock};
use crate::core::entity::RecordStatus;
use crate::core::workflow::{check_transition, WorkflowError};
use crate::entities::RemoteRecord;
use crate::remote::{
    reason, CorrectionProcedures, DocumentStore, RpcCode, RpcError, SubmitCorrectionsRequest,
    SubmitCorrectionsResponse, VerifyCodeRequest, VerifyCodeResponse,
};

/// Schema version of the registry tables
const REGISTRY_SCHEMA_VERSION: i32 = 1;

/// Errors raised by registry administration
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("corrupt record {id}: {source}")]
    Corrupt {
        id: String,
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("registration not found: {0}")]
    NotFound(String),

    #[error("registration already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Transition(#[from] WorkflowError),

    #[error("registry schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: i32, expected: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for RpcError {
    fn from(err: RegistryError) -> Self {
        let code = match &err {
            RegistryError::NotFound(_) => RpcCode::NotFound,
            RegistryError::AlreadyExists(_) => RpcCode::FailedPrecondition,
            RegistryError::Transition(_) => RpcCode::FailedPrecondition,
            RegistryError::Storage(_) | RegistryError::Io(_) => RpcCode::Unavailable,
            RegistryError::Corrupt { .. }
            | RegistryError::Serialization(_)
            | RegistryError::SchemaMismatch { .. } => RpcCode::Internal,
        };
        RpcError::new(code, err.to_string())
    }
}

/// A correction code freshly issued to an applicant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub request_id: String,
    /// Clear-text code, shown once
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Registry of submitted applications stored in SQLite
pub struct LocalRegistry {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl LocalRegistry {
    /// Open or create the registry at `path`
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::with_connection(conn, Arc::new(SystemClock))
    }

    /// In-memory registry driven by the given clock
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, RegistryError> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, RegistryError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Reviewer operations
    // =========================================================================

    /// All records, newest first, optionally filtered by status
    pub fn list(&self, status: Option<RecordStatus>) -> Result<Vec<RemoteRecord>, RegistryError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, body FROM records
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str())], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, body) = row?;
            records.push(decode(&id, &body)?);
        }
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<RemoteRecord>, RegistryError> {
        let conn = self.lock();
        load(&conn, id)
    }

    /// Open a record for corrections and issue a fresh one-time code
    pub fn request_correction(
        &self,
        id: &str,
        note: &str,
        ttl: Duration,
    ) -> Result<IssuedCode, RegistryError> {
        let code = generate_code();
        let now = self.clock.now();
        let expires_at = now + ttl;

        let mut conn = self.lock();
        execute_in_transaction(&mut conn, |tx| {
            let mut record = load(tx, id)?.ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            check_transition(record.status, RecordStatus::UnderReview)?;

            record.status = RecordStatus::UnderReview;
            record.security_code = Some(code_digest(id, &code));
            record.security_code_used = false;
            record.security_code_expiry = Some(expires_at);
            record.review_note = Some(note.to_string()).filter(|n| !n.trim().is_empty());
            record.updated_at = now;
            store(tx, &record)
        })?;

        tracing::info!(id, %expires_at, "correction requested");
        Ok(IssuedCode {
            request_id: id.to_string(),
            code,
            expires_at,
        })
    }

    pub fn approve(&self, id: &str) -> Result<RemoteRecord, RegistryError> {
        self.set_status(id, RecordStatus::Approved, None)
    }

    pub fn reject(&self, id: &str, note: Option<&str>) -> Result<RemoteRecord, RegistryError> {
        self.set_status(id, RecordStatus::Rejected, note)
    }

    fn set_status(
        &self,
        id: &str,
        status: RecordStatus,
        note: Option<&str>,
    ) -> Result<RemoteRecord, RegistryError> {
        let now = self.clock.now();
        let mut conn = self.lock();
        execute_in_transaction(&mut conn, |tx| {
            let mut record = load(tx, id)?.ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            check_transition(record.status, status)?;
            record.status = status;
            if let Some(note) = note {
                record.review_note = Some(note.to_string());
            }
            record.updated_at = now;
            store(tx, &record)?;
            Ok(record)
        })
    }

    /// Outcome of checking `code` against a record, as a structured reason
    fn check_code(
        &self,
        record: &RemoteRecord,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), &'static str> {
        let Some(expected) = record.security_code.as_deref() else {
            return Err(reason::CODE_INCORRECT);
        };
        if record.code_redeemed() {
            return Err(reason::CODE_ALREADY_USED);
        }
        if record.code_expired(now) {
            return Err(reason::CODE_EXPIRED);
        }
        if code_digest(&record.id, code) != expected {
            return Err(reason::CODE_INCORRECT);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRegistry")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentStore for LocalRegistry {
    async fn create(&self, record: &RemoteRecord) -> Result<(), RpcError> {
        let mut conn = self.lock();
        execute_in_transaction(&mut conn, |tx| {
            if load(tx, &record.id)?.is_some() {
                return Err(RegistryError::AlreadyExists(record.id.clone()));
            }
            store(tx, record)
        })?;
        tracing::debug!(id = %record.id, "registration stored");
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<RemoteRecord>, RpcError> {
        Ok(self.get(id)?)
    }

    async fn replace(&self, record: &RemoteRecord) -> Result<(), RpcError> {
        let mut conn = self.lock();
        execute_in_transaction(&mut conn, |tx| {
            if load(tx, &record.id)?.is_none() {
                return Err(RegistryError::NotFound(record.id.clone()));
            }
            store(tx, record)
        })?;
        Ok(())
    }
}

#[async_trait]
impl CorrectionProcedures for LocalRegistry {
    async fn submit_corrections(
        &self,
        request: SubmitCorrectionsRequest,
    ) -> Result<SubmitCorrectionsResponse, RpcError> {
        let now = self.clock.now();
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RegistryError::from)?;

        let mut record = load(&tx, &request.request_id)?
            .ok_or_else(|| RpcError::new(RpcCode::NotFound, "Registration not found"))?;
        if !record.status.accepts_corrections() {
            return Err(RpcError::new(
                RpcCode::FailedPrecondition,
                "This registration is not open for corrections",
            ));
        }
        if let Err(rejection) = self.check_code(&record, &request.security_code, now) {
            let message = match rejection {
                reason::CODE_ALREADY_USED => "Security code already used",
                reason::CODE_EXPIRED => "Security code expired",
                _ => "Invalid security code",
            };
            return Err(RpcError::new(RpcCode::FailedPrecondition, message)
                .with_details(rejection));
        }

        record.data = request.form_data.merged_over(&record.data);
        record.security_code_used = true;
        record.status = RecordStatus::Pending;
        record.updated_at = now;
        store(&tx, &record)?;
        tx.commit().map_err(RegistryError::from)?;

        tracing::info!(id = %record.id, "corrections applied");
        Ok(SubmitCorrectionsResponse { success: true })
    }

    async fn verify_security_code(
        &self,
        request: VerifyCodeRequest,
    ) -> Result<VerifyCodeResponse, RpcError> {
        let Some(record) = self.get(&request.request_id)? else {
            return Ok(VerifyCodeResponse {
                is_valid: false,
                reason: Some("Registration not found".to_string()),
                request_data: None,
            });
        };

        match self.check_code(&record, &request.code, self.clock.now()) {
            Ok(()) => Ok(VerifyCodeResponse {
                is_valid: true,
                reason: None,
                request_data: Some(record.data),
            }),
            Err(rejection) => Ok(VerifyCodeResponse {
                is_valid: false,
                reason: Some(rejection.to_string()),
                request_data: None,
            }),
        }
    }
}

// =============================================================================
// Storage helpers
// =============================================================================

fn init_schema(conn: &Connection) -> Result<(), RegistryError> {
    let version: i32 = conn
        .query_row(
            "SELECT version FROM registry_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if version != 0 && version != REGISTRY_SCHEMA_VERSION {
        return Err(RegistryError::SchemaMismatch {
            found: version,
            expected: REGISTRY_SCHEMA_VERSION,
        });
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS registry_schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
        "#,
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO registry_schema_version (version) VALUES (?1)",
        params![REGISTRY_SCHEMA_VERSION],
    )?;
    Ok(())
}

fn execute_in_transaction<T>(
    conn: &mut Connection,
    operation: impl FnOnce(&Transaction) -> Result<T, RegistryError>,
) -> Result<T, RegistryError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let result = operation(&tx)?;
    tx.commit()?;
    Ok(result)
}

fn load(conn: &Connection, id: &str) -> Result<Option<RemoteRecord>, RegistryError> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM records WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    body.map(|b| decode(id, &b)).transpose()
}

fn store(conn: &Connection, record: &RemoteRecord) -> Result<(), RegistryError> {
    let body = serde_json::to_string(record)?;
    conn.execute(
        "INSERT OR REPLACE INTO records (id, status, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.id,
            record.status.as_str(),
            body,
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn decode(id: &str, body: &str) -> Result<RemoteRecord, RegistryError> {
    serde_json::from_str(body).map_err(|source| RegistryError::Corrupt {
        id: id.to_string(),
        source,
    })
}

/// Random 6-digit code, zero padded
fn generate_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

/// Salted SHA256 digest of a correction code
fn code_digest(id: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::entities::ApplicationDraft;
    use chrono::TimeZone;
    use serde_json::json;

    fn setup() -> (LocalRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap(),
        ));
        let registry = LocalRegistry::in_memory(clock.clone()).unwrap();
        (registry, clock)
    }

    fn submitted(registry: &LocalRegistry, clock: &ManualClock, id: &str) -> RemoteRecord {
        let mut data = ApplicationDraft::default();
        data.identity.insert("lastName".into(), json!("Diallo"));
        data.address.insert("commune".into(), json!("Bacongo"));
        let record = RemoteRecord::new(id, data, clock.now());
        let conn = registry.lock();
        store(&conn, &record).unwrap();
        record
    }

    fn corrections(id: &str, code: &str, commune: &str) -> SubmitCorrectionsRequest {
        let mut form_data = ApplicationDraft::default();
        form_data.address.insert("commune".into(), json!(commune));
        SubmitCorrectionsRequest {
            request_id: id.to_string(),
            security_code: code.to_string(),
            form_data,
        }
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_code_is_stored_as_digest() {
        let (registry, clock) = setup();
        submitted(&registry, &clock, "APP-1");
        let issued = registry
            .request_correction("APP-1", "Address is incomplete", Duration::hours(72))
            .unwrap();

        let record = registry.get("APP-1").unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::UnderReview);
        assert_ne!(record.security_code.as_deref(), Some(issued.code.as_str()));
        assert_eq!(record.security_code_expiry, Some(issued.expires_at));
        assert_eq!(record.review_note.as_deref(), Some("Address is incomplete"));
    }

    #[test]
    fn test_list_filters_by_status() {
        let (registry, clock) = setup();
        submitted(&registry, &clock, "APP-1");
        submitted(&registry, &clock, "APP-2");
        registry.reject("APP-2", Some("Blurry photo")).unwrap();

        assert_eq!(registry.list(None).unwrap().len(), 2);
        let rejected = registry.list(Some(RecordStatus::Rejected)).unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, "APP-2");
    }

    #[test]
    fn test_invalid_transition_is_refused() {
        let (registry, clock) = setup();
        submitted(&registry, &clock, "APP-1");
        registry.approve("APP-1").unwrap();
        let err = registry
            .request_correction("APP-1", "", Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Transition(_)));
    }

    #[test]
    fn test_missing_record() {
        let (registry, _) = setup();
        assert!(registry.get("APP-404").unwrap().is_none());
        assert!(matches!(
            registry.approve("APP-404").unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_create_refuses_duplicates() {
        let (registry, clock) = setup();
        let record = RemoteRecord::new("APP-1", ApplicationDraft::default(), clock.now());
        registry.create(&record).await.unwrap();
        let err = registry.create(&record).await.unwrap_err();
        assert_eq!(err.code, RpcCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_verify_reports_structured_reasons() {
        let (registry, clock) = setup();
        submitted(&registry, &clock, "APP-1");
        let issued = registry
            .request_correction("APP-1", "Fix address", Duration::hours(1))
            .unwrap();

        let wrong = if issued.code == "000000" { "111111" } else { "000000" };
        let response = registry
            .verify_security_code(VerifyCodeRequest {
                request_id: "APP-1".into(),
                code: wrong.into(),
            })
            .await
            .unwrap();
        assert_eq!(response.reason.as_deref(), Some(reason::CODE_INCORRECT));

        let response = registry
            .verify_security_code(VerifyCodeRequest {
                request_id: "APP-1".into(),
                code: issued.code.clone(),
            })
            .await
            .unwrap();
        assert!(response.is_valid);
        assert_eq!(
            response.request_data.unwrap().address.get("commune"),
            Some(&json!("Bacongo"))
        );

        clock.advance(Duration::hours(2));
        let response = registry
            .verify_security_code(VerifyCodeRequest {
                request_id: "APP-1".into(),
                code: issued.code,
            })
            .await
            .unwrap();
        assert_eq!(response.reason.as_deref(), Some(reason::CODE_EXPIRED));
    }

    #[tokio::test]
    async fn test_submit_corrections_is_single_use() {
        let (registry, clock) = setup();
        submitted(&registry, &clock, "APP-1");
        let issued = registry
            .request_correction("APP-1", "Fix address", Duration::hours(1))
            .unwrap();

        let response = registry
            .submit_corrections(corrections("APP-1", &issued.code, "Moungali"))
            .await
            .unwrap();
        assert!(response.success);

        let record = registry.get("APP-1").unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.security_code_used);
        assert_eq!(record.data.address.get("commune"), Some(&json!("Moungali")));
        assert_eq!(record.data.identity.get("lastName"), Some(&json!("Diallo")));

        // Record is pending again: not open for corrections
        let err = registry
            .submit_corrections(corrections("APP-1", &issued.code, "Ouenzé"))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_rejected_corrections_leave_record_untouched() {
        let (registry, clock) = setup();
        submitted(&registry, &clock, "APP-1");
        let issued = registry
            .request_correction("APP-1", "Fix address", Duration::hours(1))
            .unwrap();
        clock.advance(Duration::hours(3));

        let err = registry
            .submit_corrections(corrections("APP-1", &issued.code, "Moungali"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Security code expired");
        assert_eq!(err.details.as_deref(), Some(reason::CODE_EXPIRED));

        let record = registry.get("APP-1").unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::UnderReview);
        assert!(!record.security_code_used);
        assert_eq!(record.data.address.get("commune"), Some(&json!("Bacongo")));
    }

    #[test]
    fn test_registry_persists_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("registry.db");
        {
            let registry = LocalRegistry::open(&path).unwrap();
            let conn = registry.lock();
            store(&conn, &RemoteRecord::new("APP-9", ApplicationDraft::default(), Utc::now()))
                .unwrap();
        }
        let registry = LocalRegistry::open(&path).unwrap();
        assert!(registry.get("APP-9").unwrap().is_some());
    }
}
