//! Schema system - section schemas, validation, live form state and prompts

pub mod form;
pub mod gate;
pub mod migration;
pub mod registry;
pub mod validator;
pub mod wizard;

pub use form::FormState;
pub use gate::{StepValidationResult, ValidationGate};
pub use migration::{SchemaMigrations, CURRENT_SCHEMA_VERSION};
pub use registry::SchemaRegistry;
pub use validator::{FieldViolation, SchemaValidator, ValidationError};
pub use wizard::{SchemaWizard, StepAction};
