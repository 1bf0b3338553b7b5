//! Schema-driven prompts for one application section
//!
//! Field order, labels, enums, defaults and required markers all come from
//! the section schema. The wizard only collects answers; validation and
//! navigation stay with the orchestrator.

use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use miette::{IntoDiagnostic, Result};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entities::{FieldPath, Section, SectionKey};
use crate::schema::registry::SchemaRegistry;

/// What the applicant wants to do after a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Next,
    Back,
    Submit,
    SaveAndQuit,
}

impl StepAction {
    fn label(&self) -> &'static str {
        match self {
            StepAction::Next => "Continue",
            StepAction::Back => "Go back",
            StepAction::Submit => "Submit application",
            StepAction::SaveAndQuit => "Save and quit",
        }
    }
}

/// Field information extracted from a section schema
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub description: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Choice(Vec<String>),
}

/// Prompts the applicant for a section at a time
#[derive(Debug, Clone)]
pub struct SchemaWizard {
    registry: SchemaRegistry,
}

impl SchemaWizard {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Promptable fields of a section, required ones first, in schema order
    pub fn fields(&self, section: SectionKey) -> Vec<FieldInfo> {
        let Some(props) = self
            .registry
            .get(section)
            .and_then(|s| s.get("properties"))
            .and_then(|p| p.as_object())
        else {
            return Vec::new();
        };

        let mut fields: Vec<FieldInfo> = props
            .iter()
            .filter_map(|(name, schema)| {
                parse_field(name, schema, self.registry.is_required(section, name))
            })
            .collect();
        // Stable: keeps schema order within each group
        fields.sort_by_key(|f| !f.required);
        fields
    }

    /// Ask for every field of `section`, starting from the current values.
    /// Returns the answers that differ from `current`; an empty answer to an
    /// optional field is returned as `Value::Null`.
    pub fn prompt_section(
        &self,
        section: SectionKey,
        current: &Section,
        errors: &BTreeMap<String, String>,
    ) -> Result<Vec<(FieldPath, Value)>> {
        let theme = ColorfulTheme::default();

        println!();
        println!(
            "{} Step {}: {}",
            style("◆").cyan(),
            section.step(),
            style(section.title()).bold()
        );
        println!("{}", style("─".repeat(50)).dim());

        if let Some(message) = errors.get(section.as_str()) {
            println!("  {} {}", style("!").red().bold(), style(message).red());
        }

        let mut answers = Vec::new();
        for field in self.fields(section) {
            let path = FieldPath::new(section, field.name.clone());
            if let Some(message) = errors.get(&path.to_string()) {
                println!("  {} {}", style("!").red().bold(), style(message).red());
            }

            let existing = current.get(&field.name).or(field.default.as_ref());
            let value = prompt_field(&theme, &field, existing)?;
            let changed = match current.get(&field.name) {
                Some(old) => old != &value,
                None => !value.is_null(),
            };
            if changed {
                answers.push((path, value));
            }
        }
        Ok(answers)
    }

    /// Ask where to go after a section
    pub fn prompt_action(
        &self,
        step: usize,
        total: usize,
        is_first: bool,
        is_last: bool,
    ) -> Result<StepAction> {
        let mut actions = vec![if is_last {
            StepAction::Submit
        } else {
            StepAction::Next
        }];
        if !is_first {
            actions.push(StepAction::Back);
        }
        actions.push(StepAction::SaveAndQuit);

        let labels: Vec<&str> = actions.iter().map(StepAction::label).collect();
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Step {step} of {total}"))
            .items(&labels)
            .default(0)
            .interact()
            .into_diagnostic()?;
        Ok(actions[selection])
    }

    /// Ask for the six-digit correction code without echoing it
    pub fn prompt_security_code(&self) -> Result<String> {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Correction code")
            .interact()
            .into_diagnostic()
    }
}

fn parse_field(name: &str, schema: &Value, required: bool) -> Option<FieldInfo> {
    let kind = if let Some(values) = schema.get("enum").and_then(|e| e.as_array()) {
        FieldKind::Choice(
            values
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect(),
        )
    } else {
        match schema.get("type").and_then(|t| t.as_str()) {
            Some("string") => FieldKind::Text,
            _ => return None,
        }
    };

    Some(FieldInfo {
        name: name.to_string(),
        description: schema
            .get("description")
            .and_then(|d| d.as_str())
            .map(String::from),
        kind,
        required,
        default: schema.get("default").cloned(),
    })
}

fn prompt_field(theme: &ColorfulTheme, field: &FieldInfo, existing: Option<&Value>) -> Result<Value> {
    let prompt = format_prompt(field);
    let existing = existing.and_then(|v| v.as_str()).unwrap_or("");

    match &field.kind {
        FieldKind::Choice(values) => {
            let mut items = values.clone();
            if !field.required {
                items.push("(none)".to_string());
            }
            let default_idx = values
                .iter()
                .position(|v| v == existing)
                .unwrap_or(if field.required { 0 } else { values.len() });

            let selection = Select::with_theme(theme)
                .with_prompt(&prompt)
                .items(&items)
                .default(default_idx)
                .interact()
                .into_diagnostic()?;

            Ok(values
                .get(selection)
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null))
        }

        FieldKind::Text => {
            let mut input = Input::<String>::with_theme(theme)
                .with_prompt(&prompt)
                .allow_empty(!field.required);
            if !existing.is_empty() {
                input = input.default(existing.to_string());
            }
            let value = input.interact_text().into_diagnostic()?;
            let value = value.trim();

            if value.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::String(value.to_string()))
            }
        }
    }
}

fn format_prompt(field: &FieldInfo) -> String {
    let label = field
        .description
        .clone()
        .unwrap_or_else(|| humanize(&field.name));
    if field.required {
        format!("{label} {}", style("*").red())
    } else {
        label
    }
}

/// `birthPlace` -> `Birth place`
fn humanize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            out.push(' ');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
