//! Registration records in the remote document store

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::core::clock::Clock;
use crate::core::identity::ApplicationId;
use crate::entities::{ApplicationDraft, RemoteRecord, SectionKey};
use crate::remote::{DocumentStore, RpcError};

/// Errors raised by repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("registration not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Create(String),

    #[error("{0}")]
    Update(String),

    #[error(transparent)]
    Remote(#[from] RpcError),
}

/// Typed access to registration documents
#[derive(Clone)]
pub struct RegistrationRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl RegistrationRepository {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Store a new registration in `pending` status, returning its id
    pub async fn create(&self, data: &ApplicationDraft) -> Result<String, RepositoryError> {
        let id = ApplicationId::new().to_string();
        let record = RemoteRecord::new(id.clone(), data.clone(), self.clock.now());
        self.store
            .create(&record)
            .await
            .map_err(|e| RepositoryError::Create(message_or(&e, "Failed to create registration")))?;
        Ok(id)
    }

    /// Fetch a record, propagating read failures
    pub async fn fetch(&self, id: &str) -> Result<Option<RemoteRecord>, RepositoryError> {
        Ok(self.store.fetch(id).await?)
    }

    /// Fetch a record; read failures are logged and reported as absent
    pub async fn get_by_id(&self, id: &str) -> Option<RemoteRecord> {
        match self.store.fetch(id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(id, "registration lookup failed: {e}");
                None
            }
        }
    }

    /// Merge `data` into the stored record section by section
    pub async fn update(&self, id: &str, data: &ApplicationDraft) -> Result<(), RepositoryError> {
        let mut record = self
            .store
            .fetch(id)
            .await
            .map_err(|e| RepositoryError::Update(message_or(&e, "Failed to update registration")))?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        for key in SectionKey::all() {
            let target = record.data.section_mut(*key);
            for (field, value) in data.section(*key) {
                match target.get_mut(field) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        record.updated_at = self.clock.now();

        self.store
            .replace(&record)
            .await
            .map_err(|e| RepositoryError::Update(message_or(&e, "Failed to update registration")))
    }
}

impl std::fmt::Debug for RegistrationRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRepository").finish_non_exhaustive()
    }
}

/// Recursively overlay `patch` onto `base`; non-object values replace
fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn message_or(err: &RpcError, fallback: &str) -> String {
    if err.message.trim().is_empty() {
        fallback.to_string()
    } else {
        err.message.clone()
    }
}
