//! Core module - fundamental types and utilities

pub mod cache;
pub mod clock;
pub mod config;
pub mod entity;
pub mod identity;
pub mod workflow;
pub mod workspace;

pub use cache::{CacheKind, CacheSettings, PersistenceCache, SubmissionReceipt};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use entity::RecordStatus;
pub use identity::{ApplicationId, IdParseError};
pub use workflow::{WizardStateMachine, WorkflowError, TOTAL_STEPS};
pub use workspace::{Workspace, WorkspaceError};
