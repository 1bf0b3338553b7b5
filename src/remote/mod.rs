//! Remote collaborators: the document store and the correction procedures
//!
//! The wizard never talks to a transport directly. It goes through two
//! traits so a deployment can plug in its own backend; [`local::LocalRegistry`]
//! implements both on top of SQLite.

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::entities::{ApplicationDraft, RemoteRecord};

pub use local::LocalRegistry;

/// Status code carried by a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RpcCode {
    Unavailable,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    FailedPrecondition,
    Internal,
    Unknown,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::Unavailable => "unavailable",
            RpcCode::Unauthenticated => "unauthenticated",
            RpcCode::PermissionDenied => "permission-denied",
            RpcCode::NotFound => "not-found",
            RpcCode::InvalidArgument => "invalid-argument",
            RpcCode::FailedPrecondition => "failed-precondition",
            RpcCode::Internal => "internal",
            RpcCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a remote call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: RpcCode,
    pub message: String,
    pub details: Option<String>,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Internal, message)
    }
}

/// Document store holding submitted applications
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record; its id must not exist yet
    async fn create(&self, record: &RemoteRecord) -> Result<(), RpcError>;

    /// Fetch a record by id, `None` when absent
    async fn fetch(&self, id: &str) -> Result<Option<RemoteRecord>, RpcError>;

    /// Overwrite an existing record
    async fn replace(&self, record: &RemoteRecord) -> Result<(), RpcError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCorrectionsRequest {
    pub request_id: String,
    pub security_code: String,
    pub form_data: ApplicationDraft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitCorrectionsResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub request_id: String,
    pub code: String,
}

/// Structured rejection reasons understood by [`VerifyCodeResponse::reason`]
pub mod reason {
    pub const FORMAT_INVALID: &str = "FORMAT_INVALID";
    pub const CODE_EXPIRED: &str = "CODE_EXPIRED";
    pub const CODE_ALREADY_USED: &str = "CODE_ALREADY_USED";
    pub const CODE_INCORRECT: &str = "CODE_INCORRECT";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Outcome of a code check
///
/// `reason` is either a structured code (`CODE_EXPIRED`, ...) or free text
/// from older servers; `request_data` is only sent back for valid codes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<ApplicationDraft>,
}

/// Server-side procedures of the correction flow
#[async_trait]
pub trait CorrectionProcedures: Send + Sync {
    /// Verify the code, apply the corrections, burn the code and return the
    /// record to `pending`, all or nothing
    async fn submit_corrections(
        &self,
        request: SubmitCorrectionsRequest,
    ) -> Result<SubmitCorrectionsResponse, RpcError>;

    async fn verify_security_code(
        &self,
        request: VerifyCodeRequest,
    ) -> Result<VerifyCodeResponse, RpcError>;
}
