//! Registration service: submission, corrections and code verification

use miette::Diagnostic;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::clock::Clock;
use crate::core::entity::RecordStatus;
use crate::entities::{ApplicationDraft, RemoteRecord, SectionKey};
use crate::registration::repository::{RegistrationRepository, RepositoryError};
use crate::remote::{
    reason, CorrectionProcedures, RpcCode, RpcError, SubmitCorrectionsRequest, VerifyCodeRequest,
};
use crate::schema::{SchemaValidator, StepValidationResult};

/// Length of a correction code
pub const SECURITY_CODE_LEN: usize = 6;

/// Document fields that may hold either inline data or a remote reference
const DOCUMENT_FIELDS: &[&str] = &["photo", "idDocument"];

/// Why a correction code was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityCodeReason {
    FormatInvalid,
    CodeExpired,
    CodeAlreadyUsed,
    CodeIncorrect,
    UnknownError,
}

impl SecurityCodeReason {
    /// Wire code, as sent by servers that report structured reasons
    pub fn as_code(&self) -> &'static str {
        match self {
            SecurityCodeReason::FormatInvalid => reason::FORMAT_INVALID,
            SecurityCodeReason::CodeExpired => reason::CODE_EXPIRED,
            SecurityCodeReason::CodeAlreadyUsed => reason::CODE_ALREADY_USED,
            SecurityCodeReason::CodeIncorrect => reason::CODE_INCORRECT,
            SecurityCodeReason::UnknownError => reason::UNKNOWN_ERROR,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            reason::FORMAT_INVALID => Some(SecurityCodeReason::FormatInvalid),
            reason::CODE_EXPIRED => Some(SecurityCodeReason::CodeExpired),
            reason::CODE_ALREADY_USED => Some(SecurityCodeReason::CodeAlreadyUsed),
            reason::CODE_INCORRECT => Some(SecurityCodeReason::CodeIncorrect),
            reason::UNKNOWN_ERROR => Some(SecurityCodeReason::UnknownError),
            _ => None,
        }
    }

    /// Classify a free-text rejection (English or French)
    ///
    /// Order matters: an "expired code" message also names the code, so
    /// expiry and reuse are checked before the generic code match.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if has(&["expired", "expiré"]) {
            SecurityCodeReason::CodeExpired
        } else if has(&["already used", "déjà utilisé", "déjà été utilisé"]) {
            SecurityCodeReason::CodeAlreadyUsed
        } else if has(&[
            "security code",
            "code de sécurité",
            "incorrect",
            "invalid code",
            "code invalide",
        ]) {
            SecurityCodeReason::CodeIncorrect
        } else {
            SecurityCodeReason::UnknownError
        }
    }

    /// Structured code if `raw` is one, free-text classification otherwise
    pub fn parse(raw: &str) -> Self {
        Self::from_code(raw).unwrap_or_else(|| Self::classify(raw))
    }

    pub fn message(&self) -> &'static str {
        match self {
            SecurityCodeReason::FormatInvalid => "The security code must be exactly 6 digits",
            SecurityCodeReason::CodeExpired => {
                "This security code has expired. Ask the registration office for a new one"
            }
            SecurityCodeReason::CodeAlreadyUsed => "This security code has already been used",
            SecurityCodeReason::CodeIncorrect => "The security code is incorrect",
            SecurityCodeReason::UnknownError => "The security code could not be verified",
        }
    }
}

impl fmt::Display for SecurityCodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of a correction code check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeVerification {
    pub is_valid: bool,
    pub reason: Option<SecurityCodeReason>,
}

impl CodeVerification {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: SecurityCodeReason) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
        }
    }
}

/// Errors raised by the registration service
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("{0}")]
    #[diagnostic(code(intake::registration::submission_failed))]
    Submission(String),

    #[error("registration not found: {0}")]
    #[diagnostic(code(intake::registration::not_found))]
    NotFound(String),

    #[error("{0}")]
    #[diagnostic(
        code(intake::registration::security_code),
        help("Check the code you received or ask for a new one")
    )]
    SecurityCode(SecurityCodeReason),

    #[error("{0}")]
    #[diagnostic(code(intake::registration::remote))]
    Remote(String),
}

impl ServiceError {
    /// Code rejection reason, if this is a security code failure
    pub fn security_code_reason(&self) -> Option<SecurityCodeReason> {
        match self {
            ServiceError::SecurityCode(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Business operations of the registration flow
#[derive(Clone)]
pub struct RegistrationService {
    repository: RegistrationRepository,
    procedures: Arc<dyn CorrectionProcedures>,
    validator: Arc<SchemaValidator>,
}

impl RegistrationService {
    pub fn new(
        repository: RegistrationRepository,
        procedures: Arc<dyn CorrectionProcedures>,
        validator: Arc<SchemaValidator>,
    ) -> Self {
        Self {
            repository,
            procedures,
            validator,
        }
    }

    pub fn repository(&self) -> &RegistrationRepository {
        &self.repository
    }

    pub fn validator(&self) -> &Arc<SchemaValidator> {
        &self.validator
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.repository.clock()
    }

    /// Submit a new application, returning its remote id
    pub async fn submit(&self, data: &ApplicationDraft) -> Result<String, ServiceError> {
        match self.repository.create(data).await {
            Ok(id) => {
                tracing::info!(%id, "application submitted");
                Ok(id)
            }
            Err(e) => {
                tracing::warn!("submission failed: {e}");
                let message = e.to_string();
                Err(ServiceError::Submission(if message.trim().is_empty() {
                    "Submission failed".to_string()
                } else {
                    message
                }))
            }
        }
    }

    /// Send corrections for a record under review
    ///
    /// With a security code the atomic server procedure is used; without one
    /// the record is merged directly.
    pub async fn update(
        &self,
        request_id: &str,
        data: &ApplicationDraft,
        security_code: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let Some(code) = security_code else {
            return match self.repository.update(request_id, data).await {
                Ok(()) => Ok(true),
                Err(RepositoryError::NotFound(id)) => Err(ServiceError::NotFound(id)),
                Err(e) => Err(ServiceError::Remote(e.to_string())),
            };
        };

        let request = SubmitCorrectionsRequest {
            request_id: request_id.to_string(),
            security_code: code.to_string(),
            form_data: data.clone(),
        };
        match self.procedures.submit_corrections(request).await {
            Ok(response) => {
                tracing::info!(request_id, success = response.success, "corrections sent");
                Ok(response.success)
            }
            Err(e) => {
                tracing::warn!(request_id, "corrections rejected: {e}");
                Err(map_correction_error(&e))
            }
        }
    }

    /// Validate the section bound to `step` against its schema
    pub fn validate_step(&self, step: usize, data: &ApplicationDraft) -> StepValidationResult {
        let Some(section) = SectionKey::for_step(step) else {
            return StepValidationResult::form_error(format!("Unknown step {step}"));
        };
        let values = data.section(section);
        if values.is_empty() {
            return StepValidationResult::form_error(format!(
                "{} information is missing",
                section.title()
            ));
        }
        match self.validator.validate_section(section, values) {
            None => StepValidationResult::form_error(format!(
                "No validation rules for {}",
                section.title()
            )),
            Some(violations) if violations.is_empty() => StepValidationResult::valid(),
            Some(violations) => StepValidationResult::invalid(
                violations
                    .into_iter()
                    .map(|v| (v.path, v.message))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }

    /// Check a correction code with the server
    pub async fn verify_security_code(&self, request_id: &str, code: &str) -> CodeVerification {
        if !is_well_formed_code(code) {
            return CodeVerification::rejected(SecurityCodeReason::FormatInvalid);
        }

        let request = VerifyCodeRequest {
            request_id: request_id.to_string(),
            code: code.to_string(),
        };
        match self.procedures.verify_security_code(request).await {
            Ok(response) if response.is_valid => CodeVerification::valid(),
            Ok(response) => {
                let reason = response
                    .reason
                    .as_deref()
                    .map(SecurityCodeReason::parse)
                    .unwrap_or(SecurityCodeReason::UnknownError);
                tracing::debug!(request_id, reason = reason.as_code(), "code rejected");
                CodeVerification::rejected(reason)
            }
            Err(e) => {
                tracing::warn!(request_id, "code verification failed: {e}");
                CodeVerification::rejected(SecurityCodeReason::classify(&e.message))
            }
        }
    }

    /// Data of a record open for corrections, shaped for the form
    pub async fn load_for_correction(&self, request_id: &str) -> Option<ApplicationDraft> {
        let record = self.repository.get_by_id(request_id).await?;
        if record.status != RecordStatus::UnderReview {
            tracing::debug!(request_id, status = %record.status, "record not under review");
            return None;
        }
        Some(correction_form_data(record))
    }
}

impl fmt::Debug for RegistrationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationService")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

/// Exactly six ASCII digits
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == SECURITY_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

fn map_correction_error(err: &RpcError) -> ServiceError {
    match err.code {
        RpcCode::Unavailable => {
            return ServiceError::Remote(
                "The corrections service is unavailable. Please contact an administrator"
                    .to_string(),
            )
        }
        RpcCode::Unauthenticated => {
            return ServiceError::Remote("You must be signed in to submit corrections".to_string())
        }
        RpcCode::PermissionDenied => {
            return ServiceError::Remote(
                "You are not authorized to submit corrections for this registration".to_string(),
            )
        }
        _ => {}
    }

    if let Some(reason) = err.details.as_deref().and_then(SecurityCodeReason::from_code) {
        return ServiceError::SecurityCode(reason);
    }
    match SecurityCodeReason::classify(&err.message) {
        SecurityCodeReason::UnknownError => {}
        reason => return ServiceError::SecurityCode(reason),
    }

    let message = [Some(err.message.as_str()), err.details.as_deref()]
        .into_iter()
        .flatten()
        .find(|m| !m.trim().is_empty())
        .unwrap_or("Failed to submit corrections");
    ServiceError::Remote(message.to_string())
}

/// Record data with each document held either inline or by reference
fn correction_form_data(record: RemoteRecord) -> ApplicationDraft {
    let mut data = record.data;
    for field in DOCUMENT_FIELDS {
        let url_field = format!("{field}Url");
        let inline = data
            .documents
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|v| v.starts_with("data:"));

        if inline {
            data.documents.remove(&url_field);
        } else if let Some(stale) = data.documents.remove(*field) {
            let has_url = data
                .documents
                .get(&url_field)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty());
            if !has_url {
                if let Some(url) = stale.as_str().filter(|v| v.starts_with("http")) {
                    data.documents.insert(url_field, Value::String(url.to_string()));
                }
            }
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::remote::{LocalRegistry, SubmitCorrectionsResponse, VerifyCodeResponse};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted correction procedures recording how often they are called
    #[derive(Default)]
    struct Scripted {
        calls: AtomicUsize,
        submit: Mutex<Option<Result<SubmitCorrectionsResponse, RpcError>>>,
        verify: Mutex<Option<Result<VerifyCodeResponse, RpcError>>>,
    }

    #[async_trait]
    impl CorrectionProcedures for Scripted {
        async fn submit_corrections(
            &self,
            _: SubmitCorrectionsRequest,
        ) -> Result<SubmitCorrectionsResponse, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.submit
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(SubmitCorrectionsResponse { success: true }))
        }

        async fn verify_security_code(
            &self,
            _: VerifyCodeRequest,
        ) -> Result<VerifyCodeResponse, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verify
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(VerifyCodeResponse {
                    is_valid: true,
                    ..Default::default()
                }))
        }
    }

    fn service_with(procedures: Arc<Scripted>) -> (RegistrationService, Arc<LocalRegistry>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(LocalRegistry::in_memory(clock.clone()).unwrap());
        let repository = RegistrationRepository::new(registry.clone(), clock);
        let service =
            RegistrationService::new(repository, procedures, Arc::new(SchemaValidator::default()));
        (service, registry)
    }

    fn submit_error(procedures: &Scripted, err: RpcError) {
        *procedures.submit.lock().unwrap() = Some(Err(err));
    }

    #[test]
    fn test_classification_order() {
        use SecurityCodeReason::*;
        assert_eq!(SecurityCodeReason::classify("Security code expired"), CodeExpired);
        assert_eq!(SecurityCodeReason::classify("Code de sécurité expiré"), CodeExpired);
        assert_eq!(
            SecurityCodeReason::classify("This security code was already used"),
            CodeAlreadyUsed
        );
        assert_eq!(SecurityCodeReason::classify("Code déjà utilisé"), CodeAlreadyUsed);
        assert_eq!(
            SecurityCodeReason::classify("Ce code a déjà été utilisé"),
            CodeAlreadyUsed
        );
        assert_eq!(SecurityCodeReason::classify("Invalid security code"), CodeIncorrect);
        assert_eq!(SecurityCodeReason::classify("CODE INVALIDE"), CodeIncorrect);
        assert_eq!(SecurityCodeReason::classify("Database timeout"), UnknownError);
    }

    #[test]
    fn test_structured_reasons_pass_through() {
        for reason in [
            SecurityCodeReason::FormatInvalid,
            SecurityCodeReason::CodeExpired,
            SecurityCodeReason::CodeAlreadyUsed,
            SecurityCodeReason::CodeIncorrect,
            SecurityCodeReason::UnknownError,
        ] {
            assert_eq!(SecurityCodeReason::parse(reason.as_code()), reason);
        }
    }

    #[test]
    fn test_code_format() {
        assert!(is_well_formed_code("012345"));
        assert!(!is_well_formed_code("123"));
        assert!(!is_well_formed_code("12345a"));
        assert!(!is_well_formed_code("１２３４５６"));
        assert!(!is_well_formed_code("1234567"));
    }

    #[tokio::test]
    async fn test_malformed_code_never_reaches_server() {
        let procedures = Arc::new(Scripted::default());
        let (service, _) = service_with(procedures.clone());

        let result = service.verify_security_code("APP-1", "123").await;
        assert_eq!(result, CodeVerification::rejected(SecurityCodeReason::FormatInvalid));
        assert_eq!(procedures.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_free_text_reason_is_classified() {
        let procedures = Arc::new(Scripted::default());
        *procedures.verify.lock().unwrap() = Some(Ok(VerifyCodeResponse {
            is_valid: false,
            reason: Some("This code was already used".into()),
            request_data: None,
        }));
        let (service, _) = service_with(procedures.clone());

        let result = service.verify_security_code("APP-1", "123456").await;
        assert_eq!(result.reason, Some(SecurityCodeReason::CodeAlreadyUsed));
        assert_eq!(procedures.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verify_transport_error_is_unknown() {
        let procedures = Arc::new(Scripted::default());
        *procedures.verify.lock().unwrap() = Some(Err(RpcError::unavailable("socket closed")));
        let (service, _) = service_with(procedures);
        let result = service.verify_security_code("APP-1", "123456").await;
        assert_eq!(result.reason, Some(SecurityCodeReason::UnknownError));
    }

    #[tokio::test]
    async fn test_update_error_mapping() {
        let procedures = Arc::new(Scripted::default());
        let (service, _) = service_with(procedures.clone());
        let data = ApplicationDraft::default();

        submit_error(&procedures, RpcError::unavailable("down"));
        let err = service.update("APP-1", &data, Some("123456")).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));

        submit_error(&procedures, RpcError::new(RpcCode::Unauthenticated, "no token"));
        let err = service.update("APP-1", &data, Some("123456")).await.unwrap_err();
        assert!(err.to_string().contains("signed in"));

        submit_error(&procedures, RpcError::new(RpcCode::PermissionDenied, "nope"));
        let err = service.update("APP-1", &data, Some("123456")).await.unwrap_err();
        assert!(err.to_string().contains("not authorized"));

        submit_error(
            &procedures,
            RpcError::new(RpcCode::FailedPrecondition, "Code de sécurité expiré"),
        );
        let err = service.update("APP-1", &data, Some("123456")).await.unwrap_err();
        assert_eq!(err.security_code_reason(), Some(SecurityCodeReason::CodeExpired));

        submit_error(
            &procedures,
            RpcError::new(RpcCode::Internal, "").with_details("write conflict"),
        );
        let err = service.update("APP-1", &data, Some("123456")).await.unwrap_err();
        assert_eq!(err.to_string(), "write conflict");

        submit_error(&procedures, RpcError::new(RpcCode::Internal, " "));
        let err = service.update("APP-1", &data, Some("123456")).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to submit corrections");
    }

    #[tokio::test]
    async fn test_update_without_code_merges_directly() {
        let (service, registry) = service_with(Arc::new(Scripted::default()));
        let id = service.submit(&ApplicationDraft::default()).await.unwrap();

        let mut patch = ApplicationDraft::default();
        patch.address.insert("commune".into(), json!("Talangaï"));
        assert!(service.update(&id, &patch, None).await.unwrap());
        let record = registry.get(&id).unwrap().unwrap();
        assert_eq!(record.data.address.get("commune"), Some(&json!("Talangaï")));

        let err = service.update("APP-404", &patch, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_validate_step_form_errors() {
        let (service, _) = service_with(Arc::new(Scripted::default()));
        let data = ApplicationDraft::default();

        let result = service.validate_step(9, &data);
        assert!(!result.is_valid);
        assert!(result.errors.contains_key(crate::entities::FORM_ERROR_KEY));

        let result = service.validate_step(2, &data);
        assert!(!result.is_valid);
        assert!(result.errors.contains_key(crate::entities::FORM_ERROR_KEY));

        let mut data = ApplicationDraft::default();
        data.address.insert("province".into(), json!("Brazzaville"));
        let result = service.validate_step(2, &data);
        assert!(!result.is_valid);
        assert!(result.errors.contains_key("address.commune"));
    }

    #[tokio::test]
    async fn test_load_for_correction_requires_review_status() {
        let (service, registry) = service_with(Arc::new(Scripted::default()));
        let id = service.submit(&ApplicationDraft::default()).await.unwrap();
        assert!(service.load_for_correction(&id).await.is_none());

        registry
            .request_correction(&id, "Missing photo", Duration::hours(1))
            .unwrap();
        assert!(service.load_for_correction(&id).await.is_some());
        assert!(service.load_for_correction("APP-404").await.is_none());
    }

    #[test]
    fn test_document_fields_inline_or_reference() {
        let mut data = ApplicationDraft::default();
        data.documents
            .insert("photo".into(), json!("data:image/png;base64,AAAA"));
        data.documents
            .insert("photoUrl".into(), json!("https://files.example/photo.png"));
        data.documents
            .insert("idDocument".into(), json!("https://files.example/id.pdf"));
        let record = RemoteRecord::new("APP-1", data, Utc::now());

        let shaped = correction_form_data(record);
        assert!(shaped.documents.contains_key("photo"));
        assert!(!shaped.documents.contains_key("photoUrl"));
        assert!(!shaped.documents.contains_key("idDocument"));
        assert_eq!(
            shaped.documents.get("idDocumentUrl"),
            Some(&json!("https://files.example/id.pdf"))
        );
    }
}
