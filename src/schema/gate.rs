//! Step validation gate
//!
//! A step may only be left when the live form's own field checks pass, the
//! raw section data re-validates against the section schema, and no inline
//! error is left for that section. The schema re-check is authoritative:
//! field checks can lag behind after a bulk assignment.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::workflow::WizardStateMachine;
use crate::entities::{SectionKey, FORM_ERROR_KEY};
use crate::schema::form::FormState;
use crate::schema::validator::SchemaValidator;

/// Outcome of validating one wizard step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl StepValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: BTreeMap::new(),
        }
    }

    pub fn invalid(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    /// Rejection carrying a single form-level message
    pub fn form_error(message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(FORM_ERROR_KEY.to_string(), message.into());
        Self::invalid(errors)
    }
}

/// Gate deciding whether the wizard may leave a step
#[derive(Debug, Clone)]
pub struct ValidationGate {
    validator: Arc<SchemaValidator>,
}

impl ValidationGate {
    pub fn new(validator: Arc<SchemaValidator>) -> Self {
        Self { validator }
    }

    /// Validate the section bound to `step`, writing violations into the form
    pub fn validate_step(&self, form: &mut FormState, step: usize) -> StepValidationResult {
        let Some(section) = SectionKey::for_step(step) else {
            return StepValidationResult::invalid(BTreeMap::new());
        };
        if !self.validator.has_schema(section) {
            return StepValidationResult::invalid(BTreeMap::new());
        }

        let live_ok = form.trigger(section);

        let violations = self
            .validator
            .validate_section(section, form.draft().section(section))
            .unwrap_or_default();
        let schema_ok = violations.is_empty();
        for violation in violations {
            form.set_error(violation.path, violation.message);
        }

        let errors = form.section_errors(section);
        let is_valid = live_ok && schema_ok && errors.is_empty();
        if !is_valid {
            tracing::debug!(step, errors = errors.len(), "step {step} rejected");
        }
        StepValidationResult { is_valid, errors }
    }

    pub fn validate_current_step(
        &self,
        form: &mut FormState,
        wizard: &WizardStateMachine,
    ) -> StepValidationResult {
        self.validate_step(form, wizard.current_step())
    }
}
