//! Session orchestration for the intake wizard
//!
//! The orchestrator owns one applicant session. It decides on load which
//! mode the session is in, routes edits through the form and the step
//! gate, keeps the cache in step through a debounced autosave, and drives
//! submission for both fresh drafts and verified corrections.

use miette::Diagnostic;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::cache::{PersistenceCache, SubmissionReceipt};
use crate::core::entity::RecordStatus;
use crate::core::workflow::WizardStateMachine;
use crate::entities::{ApplicationDraft, FieldPath};
use crate::registration::autosave::{Autosave, Snapshot};
use crate::registration::repository::RepositoryError;
use crate::registration::service::{RegistrationService, ServiceError};
use crate::schema::{FormState, SchemaMigrations, StepValidationResult, ValidationGate};

/// How a session was entered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryContext {
    /// Record id carried by a correction link
    pub request_id: Option<String>,
}

impl EntryContext {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn correction(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
        }
    }
}

/// A pending correction of a record under review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionRequest {
    pub request_id: String,
    pub review_note: Option<String>,
    /// The verified code, kept for the final submission
    pub security_code: String,
    is_verified: bool,
}

impl CorrectionRequest {
    pub fn new(request_id: impl Into<String>, review_note: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            review_note,
            security_code: String::new(),
            is_verified: false,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    /// One-way: a verified request never becomes unverified again
    fn verify(&mut self, code: &str) {
        self.security_code = code.to_string();
        self.is_verified = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Message surfaced to the applicant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, message)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Mode of an applicant session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Initial load has not finished
    Loading,
    /// A correction link could not be honored; nothing can be edited
    Inactive(Notice),
    FreshDraft,
    PendingCorrection(CorrectionRequest),
    AlreadySubmitted(SubmissionReceipt),
}

impl SessionMode {
    pub fn name(&self) -> &'static str {
        match self {
            SessionMode::Loading => "loading",
            SessionMode::Inactive(_) => "inactive",
            SessionMode::FreshDraft => "fresh-draft",
            SessionMode::PendingCorrection(_) => "pending-correction",
            SessionMode::AlreadySubmitted(_) => "already-submitted",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events published while a session runs
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StepChanged(usize),
    ModeChanged(SessionMode),
    Notice(Notice),
}

/// Errors returned by session operations
#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("the session is still loading")]
    #[diagnostic(code(intake::session::not_ready))]
    NotReady,

    #[error("no active draft: {0}")]
    #[diagnostic(code(intake::session::inactive))]
    Inactive(String),

    #[error("application {remote_id} has already been submitted")]
    #[diagnostic(
        code(intake::session::already_submitted),
        help("Run 'intake reset' to start a new application")
    )]
    AlreadySubmitted { remote_id: String },

    #[error("the correction code has not been verified yet")]
    #[diagnostic(code(intake::session::not_verified))]
    CorrectionNotVerified,

    #[error("step {step} has {} error(s)", .errors.len())]
    #[diagnostic(code(intake::session::step_invalid))]
    StepInvalid {
        step: usize,
        errors: BTreeMap<String, String>,
    },

    #[error("the corrections were not accepted")]
    #[diagnostic(code(intake::session::correction_rejected))]
    CorrectionRejected,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Service(#[from] ServiceError),
}

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub autosave_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autosave_delay: Duration::from_millis(500),
        }
    }
}

/// Coordinates wizard, form, cache and service for one applicant session
pub struct RegistrationOrchestrator {
    service: RegistrationService,
    cache: Arc<Mutex<PersistenceCache>>,
    migrations: SchemaMigrations,
    gate: ValidationGate,
    wizard: WizardStateMachine,
    form: FormState,
    mode: SessionMode,
    autosave: Autosave,
    security_code_input: String,
    last_error: Option<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl RegistrationOrchestrator {
    /// Build a session in `Loading` mode together with its event stream
    pub fn new(
        service: RegistrationService,
        cache: PersistenceCache,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let migrations = cache.settings().migrations.clone();
        let cache = Arc::new(Mutex::new(cache));
        let validator = Arc::clone(service.validator());

        let mut wizard = WizardStateMachine::new();
        let step_events = events.clone();
        wizard.on_step_change(Box::new(move |step| {
            let _ = step_events.send(SessionEvent::StepChanged(step));
        }));

        let orchestrator = Self {
            gate: ValidationGate::new(Arc::clone(&validator)),
            form: FormState::new(ApplicationDraft::default(), validator),
            autosave: Autosave::new(Arc::clone(&cache), options.autosave_delay),
            service,
            cache,
            migrations,
            wizard,
            mode: SessionMode::Loading,
            security_code_input: String::new(),
            last_error: None,
            events,
        };
        (orchestrator, receiver)
    }

    // =========================================================================
    // Initial load
    // =========================================================================

    /// Resolve the session mode from the entry context and the cache
    pub async fn initialize(&mut self, context: EntryContext) -> &SessionMode {
        self.autosave.disarm();
        self.mode = SessionMode::Loading;

        if let Err(e) = self.resolve(context).await {
            tracing::warn!("session restore failed, starting over: {e}");
            self.cache().clear_all();
            let defaults = self.defaults();
            self.form.reset(defaults);
            self.wizard.reset();
            self.set_mode(SessionMode::FreshDraft);
            self.notify(Notice::warning(
                "Session restarted",
                "Your previous session could not be restored.",
            ));
        }

        self.autosave.arm();
        tracing::info!(mode = %self.mode, "session ready");
        &self.mode
    }

    async fn resolve(&mut self, context: EntryContext) -> Result<(), RepositoryError> {
        let request_id = context
            .request_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        // 1. Correction link
        if let Some(request_id) = request_id {
            self.resolve_correction(request_id).await?;
            return Ok(());
        }

        // 2. Receipt of an earlier submission
        let receipt = self.cache().load_submission();
        if let Some(receipt) = receipt {
            if self
                .service
                .repository()
                .fetch(&receipt.remote_id)
                .await?
                .is_some()
            {
                let defaults = self.defaults();
                self.form.reset(defaults);
                self.wizard.reset();
                self.set_mode(SessionMode::AlreadySubmitted(receipt));
                return Ok(());
            }
            tracing::info!(remote_id = %receipt.remote_id, "submitted record is gone, dropping receipt");
            self.cache().clear_submission();
        }

        // 3. Cached draft
        let (draft, step, completed) = {
            let mut cache = self.cache();
            let draft = cache.load_draft();
            let step = cache.load_step();
            let completed = cache.load_completed_steps();
            (draft, step, completed)
        };
        let defaults = self.defaults();
        match draft {
            Some(draft) => {
                self.form.reset(draft.merged_over(&defaults));
                self.wizard.restore(step, completed);
            }
            None => {
                self.form.reset(defaults);
                self.wizard.reset();
            }
        }
        self.set_mode(SessionMode::FreshDraft);
        Ok(())
    }

    async fn resolve_correction(&mut self, request_id: String) -> Result<(), RepositoryError> {
        let now = self.service.clock().now();
        let record = self.service.repository().fetch(&request_id).await?;

        let refusal = match &record {
            None => Some(Notice::error(
                "Link not recognized",
                "This correction link does not match any registration.",
            )),
            Some(r) if r.code_redeemed() => Some(Notice::error(
                "Link already used",
                "This correction link has already been used.",
            )),
            Some(r) if r.code_expired(now) => Some(Notice::error(
                "Link expired",
                "This correction link has expired. Ask the registration office for a new one.",
            )),
            Some(r) if r.status != RecordStatus::UnderReview => Some(Notice::info(
                "Nothing to correct",
                "This registration is not awaiting corrections.",
            )),
            Some(_) => None,
        };

        if let Some(notice) = refusal {
            tracing::info!(request_id, "correction link refused: {}", notice.message);
            self.form.reset(ApplicationDraft::default());
            self.wizard.reset();
            self.notify(notice.clone());
            self.set_mode(SessionMode::Inactive(notice));
            return Ok(());
        }

        let review_note = record.and_then(|r| r.review_note);
        self.cache().clear_submission();
        let defaults = self.defaults();
        self.form.reset(defaults);
        self.wizard.reset();
        self.set_mode(SessionMode::PendingCorrection(CorrectionRequest::new(
            request_id,
            review_note,
        )));
        Ok(())
    }

    // =========================================================================
    // Editing and navigation
    // =========================================================================

    /// Set one field of the live draft
    pub fn set_field(&mut self, path: &FieldPath, value: Value) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.form.set_field(path, value);
        self.schedule_autosave();
        Ok(())
    }

    /// Remove one field from the live draft
    pub fn clear_field(&mut self, path: &FieldPath) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.form.clear_field(path);
        self.schedule_autosave();
        Ok(())
    }

    /// Validate the current step and move forward if it passes
    pub fn next_step(&mut self) -> Result<StepValidationResult, SessionError> {
        self.ensure_editable()?;
        let result = self.gate.validate_current_step(&mut self.form, &self.wizard);
        if result.is_valid {
            if !self.wizard.advance(true) {
                // Last step: nothing to advance to, but it is complete
                let step = self.wizard.current_step();
                self.wizard.mark_completed(step);
            }
            self.schedule_autosave();
        }
        Ok(result)
    }

    pub fn previous_step(&mut self) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let moved = self.wizard.retreat();
        if moved {
            self.schedule_autosave();
        }
        Ok(moved)
    }

    pub fn go_to_step(&mut self, step: usize) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let moved = self.wizard.jump_to(step);
        if moved {
            self.schedule_autosave();
        }
        Ok(moved)
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        match &self.mode {
            SessionMode::Loading => Err(SessionError::NotReady),
            SessionMode::Inactive(notice) => Err(SessionError::Inactive(notice.message.clone())),
            SessionMode::AlreadySubmitted(receipt) => Err(SessionError::AlreadySubmitted {
                remote_id: receipt.remote_id.clone(),
            }),
            SessionMode::PendingCorrection(request) if !request.is_verified() => {
                Err(SessionError::CorrectionNotVerified)
            }
            SessionMode::PendingCorrection(_) | SessionMode::FreshDraft => Ok(()),
        }
    }

    /// Autosave covers fresh drafts only; corrections are reloaded from the
    /// registry on every visit
    fn schedule_autosave(&mut self) {
        if self.mode != SessionMode::FreshDraft {
            return;
        }
        self.autosave.schedule(Snapshot {
            draft: self.form.draft().clone(),
            step: self.wizard.current_step(),
            completed: self.wizard.completed_steps().clone(),
        });
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Validate every step and send the application, returning its remote id
    pub async fn submit_form(&mut self) -> Result<String, SessionError> {
        self.ensure_editable()?;

        for step in 1..=self.wizard.total_steps() {
            let result = self.gate.validate_step(&mut self.form, step);
            if !result.is_valid {
                self.wizard.jump_to(step);
                self.schedule_autosave();
                let err = SessionError::StepInvalid {
                    step,
                    errors: result.errors,
                };
                self.fail(&err);
                return Err(err);
            }
            self.wizard.mark_completed(step);
        }

        for path in self.migrations.retired_fields().to_vec() {
            self.form.clear_field(&path);
        }
        let payload = self.form.draft().clone();

        let outcome = match &self.mode {
            SessionMode::PendingCorrection(request) => {
                let request_id = request.request_id.clone();
                match self
                    .service
                    .update(&request_id, &payload, Some(&request.security_code))
                    .await
                {
                    Ok(true) => Ok(request_id),
                    Ok(false) => Err(SessionError::CorrectionRejected),
                    Err(e) => Err(SessionError::Service(e)),
                }
            }
            _ => self.service.submit(&payload).await.map_err(SessionError::from),
        };

        match outcome {
            Ok(remote_id) => {
                self.complete_submission(&remote_id, &payload);
                Ok(remote_id)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn complete_submission(&mut self, remote_id: &str, payload: &ApplicationDraft) {
        let was_correction = matches!(self.mode, SessionMode::PendingCorrection(_));
        self.autosave.cancel();

        let summary = payload.summary();
        {
            let mut cache = self.cache();
            cache.clear_draft_only();
            cache.save_submission(remote_id, &summary);
        }

        let defaults = self.defaults();
        self.form.reset(defaults);
        self.wizard.reset();
        self.last_error = None;
        self.security_code_input.clear();

        let receipt = SubmissionReceipt {
            remote_id: remote_id.to_string(),
            summary,
            timestamp: self.service.clock().now(),
        };
        self.set_mode(SessionMode::AlreadySubmitted(receipt));
        self.notify(if was_correction {
            Notice::success("Corrections sent", "Your corrections have been submitted.")
        } else {
            Notice::success(
                "Application submitted",
                format!("Your application was registered under {remote_id}."),
            )
        });
    }

    fn fail(&mut self, err: &SessionError) {
        let message = err.to_string();
        tracing::warn!("submission failed: {message}");
        self.last_error = Some(message.clone());
        self.notify(Notice::error("Submission failed", message));
    }

    // =========================================================================
    // Correction code
    // =========================================================================

    pub fn set_security_code_input(&mut self, code: &str) {
        self.security_code_input = code.trim().to_string();
    }

    /// Verify a correction code and load the record into the form
    pub async fn verify_security_code(&mut self, code: &str) -> bool {
        let code = code.trim();
        let request_id = match &self.mode {
            SessionMode::PendingCorrection(request) => request.request_id.clone(),
            _ => return false,
        };
        if code.is_empty() {
            return false;
        }

        let verification = self.service.verify_security_code(&request_id, code).await;
        if !verification.is_valid {
            let reason = verification.reason.map(|r| r.message()).unwrap_or_default();
            self.last_error = Some(reason.to_string());
            self.notify(Notice::error("Code refused", reason));
            return false;
        }

        let Some(mut data) = self.service.load_for_correction(&request_id).await else {
            let message = "The registration could not be loaded for correction.";
            self.last_error = Some(message.to_string());
            self.notify(Notice::error("Correction unavailable", message));
            return false;
        };
        self.migrations.strip_retired(&mut data);

        let defaults = self.defaults();
        self.form.reset(data.merged_over(&defaults));
        self.wizard.reset();
        self.security_code_input.clear();
        self.last_error = None;
        if let SessionMode::PendingCorrection(request) = &mut self.mode {
            request.verify(code);
        }
        let mode = self.mode.clone();
        self.publish(SessionEvent::ModeChanged(mode));
        self.notify(Notice::success(
            "Code accepted",
            "You can now correct your application.",
        ));
        true
    }

    // =========================================================================
    // Reset and teardown
    // =========================================================================

    /// Discard everything and start a fresh draft
    pub fn reset_form(&mut self) {
        self.autosave.cancel();
        let defaults = self.defaults();
        self.form.reset(defaults);
        self.wizard.reset();
        self.last_error = None;
        self.security_code_input.clear();
        self.cache().clear_all();
        self.set_mode(SessionMode::FreshDraft);
        self.autosave.arm();
    }

    /// Write any pending autosave and stop the timer
    pub fn shutdown(&mut self) {
        self.autosave.flush();
        self.autosave.disarm();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn is_loading(&self) -> bool {
        self.mode == SessionMode::Loading
    }

    pub fn draft(&self) -> &ApplicationDraft {
        self.form.draft()
    }

    pub fn current_step(&self) -> usize {
        self.wizard.current_step()
    }

    pub fn total_steps(&self) -> usize {
        self.wizard.total_steps()
    }

    pub fn completed_steps(&self) -> &BTreeSet<usize> {
        self.wizard.completed_steps()
    }

    pub fn is_first_step(&self) -> bool {
        self.wizard.is_first_step()
    }

    pub fn is_last_step(&self) -> bool {
        self.wizard.is_last_step()
    }

    pub fn progress(&self) -> f64 {
        self.wizard.progress()
    }

    /// Inline field errors of the live form
    pub fn errors(&self) -> &BTreeMap<String, String> {
        self.form.errors()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn security_code_input(&self) -> &str {
        &self.security_code_input
    }

    pub fn autosave_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn cache(&self) -> MutexGuard<'_, PersistenceCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn defaults(&self) -> ApplicationDraft {
        self.service.validator().registry().defaults()
    }

    fn set_mode(&mut self, mode: SessionMode) {
        if self.mode != mode {
            self.mode = mode.clone();
            self.publish(SessionEvent::ModeChanged(mode));
        }
    }

    fn notify(&self, notice: Notice) {
        self.publish(SessionEvent::Notice(notice));
    }

    fn publish(&self, event: SessionEvent) {
        // A closed receiver only means nobody is listening
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for RegistrationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationOrchestrator")
            .field("mode", &self.mode)
            .field("wizard", &self.wizard)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
