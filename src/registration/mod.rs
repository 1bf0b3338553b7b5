//! Registration flow: repository, service, autosave and the session orchestrator

pub mod autosave;
pub mod orchestrator;
pub mod repository;
pub mod service;

pub use autosave::{Autosave, Snapshot};
pub use orchestrator::{
    CorrectionRequest, EntryContext, Notice, NoticeLevel, RegistrationOrchestrator, SessionError,
    SessionEvent, SessionMode, SessionOptions,
};
pub use repository::{RegistrationRepository, RepositoryError};
pub use service::{
    is_well_formed_code, CodeVerification, RegistrationService, SecurityCodeReason, ServiceError,
};
