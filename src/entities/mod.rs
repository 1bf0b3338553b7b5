//! Entity type definitions
//!
//! - [`ApplicationDraft`] - the section-keyed record edited by the wizard
//! - [`RemoteRecord`] - a submitted application with its review metadata

pub mod application;
pub mod record;

pub use application::{
    ApplicationDraft, FieldPath, FieldPathError, Section, SectionKey, SubmissionSummary,
    FORM_ERROR_KEY,
};
pub use record::RemoteRecord;
