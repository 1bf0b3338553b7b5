//! Live form state: the draft being edited plus per-field inline errors

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entities::{ApplicationDraft, FieldPath, SectionKey};
use crate::schema::validator::SchemaValidator;

/// Draft under edit together with the inline error messages shown to the user
///
/// Field edits are validated incrementally, one field at a time. Bulk
/// assignment through [`FormState::replace`] does not revalidate, so the
/// error map may lag behind the data until [`FormState::trigger`] runs.
#[derive(Debug)]
pub struct FormState {
    draft: ApplicationDraft,
    errors: BTreeMap<String, String>,
    validator: Arc<SchemaValidator>,
}

impl FormState {
    pub fn new(draft: ApplicationDraft, validator: Arc<SchemaValidator>) -> Self {
        Self {
            draft,
            errors: BTreeMap::new(),
            validator,
        }
    }

    pub fn draft(&self) -> &ApplicationDraft {
        &self.draft
    }

    /// Set one field and revalidate just that field
    pub fn set_field(&mut self, path: &FieldPath, value: Value) {
        let message = self
            .validator
            .validate_field(path.section, &path.field, &value);
        self.draft.set(path, value);

        let key = path.to_string();
        match message {
            Some(m) => {
                self.errors.insert(key, m);
            }
            None => {
                self.errors.remove(&key);
            }
        }
        // A section-wide rule may have been satisfied by this edit
        self.errors.remove(path.section.as_str());
    }

    /// Remove a field (e.g. a retired one) without touching other errors
    pub fn clear_field(&mut self, path: &FieldPath) -> Option<Value> {
        self.errors.remove(&path.to_string());
        self.draft.remove(path)
    }

    /// Replace the whole draft without revalidating
    pub fn replace(&mut self, draft: ApplicationDraft) {
        self.draft = draft;
    }

    /// Replace the draft and drop every inline error
    pub fn reset(&mut self, draft: ApplicationDraft) {
        self.draft = draft;
        self.errors.clear();
    }

    /// Field-level validation of every value currently present in a section.
    /// Returns `true` when none of them is invalid.
    pub fn trigger(&mut self, section: SectionKey) -> bool {
        self.clear_section_errors(section);

        let mut valid = true;
        let fields: Vec<(String, Value)> = self
            .draft
            .section(section)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (field, value) in fields {
            if let Some(message) = self.validator.validate_field(section, &field, &value) {
                self.errors
                    .insert(FieldPath::new(section, field).to_string(), message);
                valid = false;
            }
        }
        valid
    }

    pub fn set_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(path.into(), message.into());
    }

    pub fn error(&self, path: &str) -> Option<&str> {
        self.errors.get(path).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Errors belonging to a section (its fields and the section itself)
    pub fn section_errors(&self, section: SectionKey) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .filter(|(path, _)| belongs_to(path, section))
            .map(|(p, m)| (p.clone(), m.clone()))
            .collect()
    }

    pub fn clear_section_errors(&mut self, section: SectionKey) {
        self.errors.retain(|path, _| !belongs_to(path, section));
    }
}

fn belongs_to(path: &str, section: SectionKey) -> bool {
    let name = section.as_str();
    path == name
        || path
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('.'))
}
