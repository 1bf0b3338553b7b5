//! Section validation against the declarative JSON Schemas

use jsonschema::{validator_for, ValidationError as JsonSchemaError, Validator as JsonValidator};
use miette::Diagnostic;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::entities::{Section, SectionKey};
use crate::schema::registry::SchemaRegistry;

/// A single field-level schema violation
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct FieldViolation {
    /// Dotted field path (`identity.firstName`), or the section name for
    /// section-wide rules
    pub path: String,
    pub message: String,

    #[help]
    pub help: Option<String>,
}

/// Validation failure for a whole section
#[derive(Debug, Error, Diagnostic)]
#[error("{section} is incomplete: {summary}")]
#[diagnostic(code(intake::schema::validation_error))]
pub struct ValidationError {
    pub section: SectionKey,
    summary: String,

    #[related]
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(section: SectionKey, violations: Vec<FieldViolation>) -> Self {
        let count = violations.len();
        let summary = if count == 1 {
            "1 error".to_string()
        } else {
            format!("{} errors", count)
        };
        Self {
            section,
            summary,
            violations,
        }
    }

    /// Build from a path → message map
    pub fn from_errors(section: SectionKey, errors: &BTreeMap<String, String>) -> Self {
        let violations = errors
            .iter()
            .map(|(path, message)| FieldViolation {
                path: path.clone(),
                message: message.clone(),
                help: None,
            })
            .collect();
        Self::new(section, violations)
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}

/// Schema validator with compiled section and field schemas
pub struct SchemaValidator {
    registry: SchemaRegistry,
    sections: HashMap<SectionKey, JsonValidator>,
    fields: HashMap<(SectionKey, String), JsonValidator>,
}

impl SchemaValidator {
    /// Compile every schema in the registry; broken schemas are skipped
    pub fn new(registry: SchemaRegistry) -> Self {
        let mut sections = HashMap::new();
        let mut fields = HashMap::new();

        for key in SectionKey::all() {
            let Some(schema) = registry.get(*key) else {
                continue;
            };
            match validator_for(schema) {
                Ok(compiled) => {
                    sections.insert(*key, compiled);
                }
                Err(e) => {
                    tracing::warn!("schema for section {key} does not compile: {e}");
                    continue;
                }
            }

            for name in registry.field_names(*key) {
                if let Some(field_schema) = registry.field_schema(*key, &name) {
                    if let Ok(compiled) = validator_for(field_schema) {
                        fields.insert((*key, name), compiled);
                    }
                }
            }
        }

        Self {
            registry,
            sections,
            fields,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Whether a compiled schema is bound to the section
    pub fn has_schema(&self, key: SectionKey) -> bool {
        self.sections.contains_key(&key)
    }

    /// Validate raw section data. `None` when the section has no schema.
    pub fn validate_section(&self, key: SectionKey, data: &Section) -> Option<Vec<FieldViolation>> {
        let schema = self.sections.get(&key)?;
        let instance = JsonValue::Object(data.clone());

        let mut seen = BTreeMap::new();
        for error in schema.iter_errors(&instance) {
            let violation = error_to_violation(key, &error);
            seen.entry(violation.path.clone()).or_insert(violation);
        }
        Some(seen.into_values().collect())
    }

    /// Validate one field value in isolation. Returns the first message.
    pub fn validate_field(&self, key: SectionKey, field: &str, value: &JsonValue) -> Option<String> {
        let schema = self.fields.get(&(key, field.to_string()))?;
        let message = schema
            .iter_errors(value)
            .next()
            .map(|e| format_schema_error(&e));
        message
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(SchemaRegistry::default())
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Convert a JSON Schema validation error to our violation format
fn error_to_violation(section: SectionKey, error: &JsonSchemaError) -> FieldViolation {
    FieldViolation {
        path: violation_path(section, error),
        message: format_schema_error(error),
        help: generate_help_message(error),
    }
}

/// Map a JSON pointer (plus the missing property for `required`) to a field path
fn violation_path(section: SectionKey, error: &JsonSchemaError) -> String {
    let pointer = error.instance_path.to_string();
    let mut segments: Vec<String> = pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if let jsonschema::error::ValidationErrorKind::Required { property } = &error.kind {
        let prop = property
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| property.to_string());
        segments.push(prop);
    }

    if segments.is_empty() {
        section.as_str().to_string()
    } else {
        format!("{}.{}", section.as_str(), segments.join("."))
    }
}

/// Format a JSON Schema error into a message suitable for an inline field error
fn format_schema_error(error: &JsonSchemaError) -> String {
    match &error.kind {
        jsonschema::error::ValidationErrorKind::Required { .. } => {
            "This field is required".to_string()
        }
        jsonschema::error::ValidationErrorKind::Type { kind } => {
            format!("Wrong type: expected {:?}", kind)
        }
        jsonschema::error::ValidationErrorKind::Enum { options } => {
            format!("Must be one of: {}", format_enum_options(options))
        }
        jsonschema::error::ValidationErrorKind::Pattern { .. } => "Invalid format".to_string(),
        jsonschema::error::ValidationErrorKind::MinLength { limit } => {
            if *limit <= 1 {
                "This field is required".to_string()
            } else {
                format!("Must be at least {} characters", limit)
            }
        }
        jsonschema::error::ValidationErrorKind::MaxLength { limit } => {
            format!("Must be at most {} characters", limit)
        }
        jsonschema::error::ValidationErrorKind::AnyOf { .. } => {
            "Provide at least one of the accepted documents".to_string()
        }
        _ => error.to_string(),
    }
}

/// Format enum options as a string
fn format_enum_options(options: &JsonValue) -> String {
    if let Some(arr) = options.as_array() {
        arr.iter()
            .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        options.to_string()
    }
}

/// Generate a help message with suggestions for fixing the error
fn generate_help_message(error: &JsonSchemaError) -> Option<String> {
    match &error.kind {
        jsonschema::error::ValidationErrorKind::Enum { options } => {
            Some(format!("Valid values: {}", format_enum_options(options)))
        }
        jsonschema::error::ValidationErrorKind::Pattern { pattern } => {
            if pattern.contains("[0-9]{4}-") {
                Some("Dates use the YYYY-MM-DD format, e.g. 1990-04-21".to_string())
            } else if pattern.contains("data:") {
                Some("Attach the file inline as a data: URI".to_string())
            } else if pattern.contains("https?") {
                Some("Use an http(s) link to the stored file".to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(value: JsonValue) -> Section {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validator_creation() {
        let validator = SchemaValidator::default();
        for key in SectionKey::all() {
            assert!(validator.has_schema(*key));
        }
    }

    #[test]
    fn test_valid_address() {
        let validator = SchemaValidator::default();
        let data = section(json!({
            "province": "Brazzaville",
            "department": "Brazzaville",
            "commune": "Brazzaville",
            "district": "Poto-Poto",
            "quarter": "Moungali"
        }));
        let violations = validator.validate_section(SectionKey::Address, &data).unwrap();
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    #[test]
    fn test_missing_required_maps_to_field_path() {
        let validator = SchemaValidator::default();
        let data = section(json!({ "province": "Pool" }));
        let violations = validator.validate_section(SectionKey::Address, &data).unwrap();
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"address.commune"));
        assert!(paths.contains(&"address.quarter"));
        assert!(!paths.contains(&"address.province"));
        assert!(violations.iter().all(|v| v.message == "This field is required"));
    }

    #[test]
    fn test_pattern_violation_has_help() {
        let validator = SchemaValidator::default();
        let data = section(json!({ "birthDate": "21/04/1990" }));
        let violations = validator.validate_section(SectionKey::Identity, &data).unwrap();
        let birth = violations
            .iter()
            .find(|v| v.path == "identity.birthDate")
            .unwrap();
        assert_eq!(birth.message, "Invalid format");
        assert!(birth.help.as_deref().unwrap().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_conditional_employer_requirement() {
        let validator = SchemaValidator::default();
        let employed = section(json!({ "status": "employed" }));
        let violations = validator
            .validate_section(SectionKey::Employment, &employed)
            .unwrap();
        assert!(violations.iter().any(|v| v.path == "employment.employer"));

        let student = section(json!({ "status": "student" }));
        assert!(validator
            .validate_section(SectionKey::Employment, &student)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_documents_accept_inline_or_reference() {
        let validator = SchemaValidator::default();
        let inline = section(json!({
            "photo": "data:image/png;base64,AAAA",
            "idDocument": "data:application/pdf;base64,AAAA"
        }));
        assert!(validator
            .validate_section(SectionKey::Documents, &inline)
            .unwrap()
            .is_empty());

        let referenced = section(json!({
            "photoUrl": "https://files.example.org/p.png",
            "idDocumentUrl": "https://files.example.org/id.pdf"
        }));
        assert!(validator
            .validate_section(SectionKey::Documents, &referenced)
            .unwrap()
            .is_empty());

        let missing = section(json!({}));
        let violations = validator
            .validate_section(SectionKey::Documents, &missing)
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "documents");
    }

    #[test]
    fn test_validate_field() {
        let validator = SchemaValidator::default();
        assert_eq!(
            validator.validate_field(SectionKey::Identity, "civility", &json!("Dr")),
            Some("Must be one of: M., Mme, Mlle".to_string())
        );
        assert_eq!(
            validator.validate_field(SectionKey::Identity, "lastName", &json!("D")),
            Some("Must be at least 2 characters".to_string())
        );
        assert_eq!(
            validator.validate_field(SectionKey::Identity, "lastName", &json!("Diallo")),
            None
        );
        assert_eq!(
            validator.validate_field(SectionKey::Identity, "unknown", &json!(1)),
            None
        );
    }

    #[test]
    fn test_missing_schema_returns_none() {
        let validator = SchemaValidator::new(SchemaRegistry::empty());
        assert!(validator
            .validate_section(SectionKey::Identity, &Section::new())
            .is_none());
    }

    #[test]
    fn test_validation_error_summary() {
        let mut errors = BTreeMap::new();
        errors.insert("address.commune".to_string(), "This field is required".to_string());
        let err = ValidationError::from_errors(SectionKey::Address, &errors);
        assert_eq!(err.violation_count(), 1);
        assert_eq!(err.to_string(), "address is incomplete: 1 error");
    }
}
