//! Workflow state: the wizard step machine and record status transitions
//!
//! The wizard machine tracks where the applicant is in the form and which
//! steps have been completed. It knows nothing about validation or
//! persistence; callers decide whether a step may be left.

use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::core::entity::RecordStatus;

/// Number of wizard steps (one per application section)
pub const TOTAL_STEPS: usize = 4;

/// Callback invoked with the new current step
pub type StepListener = Box<dyn Fn(usize) + Send + Sync>;

/// Bounded step state machine for the intake wizard
pub struct WizardStateMachine {
    current_step: usize,
    completed_steps: BTreeSet<usize>,
    total_steps: usize,
    listener: Option<StepListener>,
}

impl WizardStateMachine {
    /// Create a machine positioned on step 1
    pub fn new() -> Self {
        Self::with_total_steps(TOTAL_STEPS)
    }

    pub fn with_total_steps(total_steps: usize) -> Self {
        Self {
            current_step: 1,
            completed_steps: BTreeSet::new(),
            total_steps: total_steps.max(1),
            listener: None,
        }
    }

    /// Install the step-change listener
    pub fn on_step_change(&mut self, listener: StepListener) {
        self.listener = Some(listener);
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn completed_steps(&self) -> &BTreeSet<usize> {
        &self.completed_steps
    }

    pub fn is_first_step(&self) -> bool {
        self.current_step == 1
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step == self.total_steps
    }

    fn in_bounds(&self, step: usize) -> bool {
        (1..=self.total_steps).contains(&step)
    }

    fn emit(&self) {
        if let Some(listener) = &self.listener {
            listener(self.current_step);
        }
    }

    /// Move forward when the current step is valid and not the last one
    pub fn advance(&mut self, is_step_valid: bool) -> bool {
        if !is_step_valid || self.current_step >= self.total_steps {
            return false;
        }
        self.completed_steps.insert(self.current_step);
        self.current_step += 1;
        self.emit();
        true
    }

    /// Move back one step; no-op on step 1
    pub fn retreat(&mut self) -> bool {
        if self.current_step <= 1 {
            return false;
        }
        self.current_step -= 1;
        self.emit();
        true
    }

    /// Jump to a step; out-of-range targets are ignored
    pub fn jump_to(&mut self, step: usize) -> bool {
        if !self.in_bounds(step) {
            return false;
        }
        self.current_step = step;
        self.emit();
        true
    }

    /// Idempotently mark a step completed
    pub fn mark_completed(&mut self, step: usize) {
        if self.in_bounds(step) {
            self.completed_steps.insert(step);
        }
    }

    /// Completion percentage in `[0, 100]`
    pub fn progress(&self) -> f64 {
        self.completed_steps.len() as f64 / self.total_steps as f64 * 100.0
    }

    pub fn reset(&mut self) {
        self.current_step = 1;
        self.completed_steps.clear();
    }

    /// Restore persisted progress, dropping anything out of range
    pub fn restore(&mut self, step: usize, completed: impl IntoIterator<Item = usize>) {
        self.reset();
        for s in completed {
            self.mark_completed(s);
        }
        if self.in_bounds(step) {
            self.current_step = step;
        }
    }
}

impl Default for WizardStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WizardStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardStateMachine")
            .field("current_step", &self.current_step)
            .field("completed_steps", &self.completed_steps)
            .field("total_steps", &self.total_steps)
            .finish()
    }
}

/// Errors raised by reviewer-side status changes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid status transition: {from} → {to}")]
    InvalidTransition { from: RecordStatus, to: RecordStatus },
}

/// Check if a record status transition is valid
pub fn is_valid_transition(from: RecordStatus, to: RecordStatus) -> bool {
    matches!(
        (from, to),
        // Reviewer decisions
        (RecordStatus::Pending, RecordStatus::Approved)
            | (RecordStatus::Pending, RecordStatus::Rejected)
            // Sent back for corrections
            | (RecordStatus::Pending, RecordStatus::UnderReview)
            | (RecordStatus::Rejected, RecordStatus::UnderReview)
            // Corrections submitted
            | (RecordStatus::UnderReview, RecordStatus::Pending)
    )
}

/// Allowed transitions from the current status
pub fn allowed_transitions(current: RecordStatus) -> Vec<RecordStatus> {
    match current {
        RecordStatus::Pending => vec![
            RecordStatus::Approved,
            RecordStatus::Rejected,
            RecordStatus::UnderReview,
        ],
        RecordStatus::Rejected => vec![RecordStatus::UnderReview],
        RecordStatus::UnderReview => vec![RecordStatus::Pending],
        RecordStatus::Approved => vec![],
    }
}

/// Verify a transition, returning a typed error when it is not allowed
pub fn check_transition(from: RecordStatus, to: RecordStatus) -> Result<(), WorkflowError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition { from, to })
    }
}
