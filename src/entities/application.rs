//! Application draft - the section-keyed record filled by the wizard

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Field values of one section, keyed by field name
pub type Section = Map<String, Value>;

/// Form-level error key used when a whole step is rejected
pub const FORM_ERROR_KEY: &str = "_form";

/// The four sections of an application, in wizard order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKey {
    Identity,
    Address,
    Employment,
    Documents,
}

impl SectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Identity => "identity",
            SectionKey::Address => "address",
            SectionKey::Employment => "employment",
            SectionKey::Documents => "documents",
        }
    }

    /// All sections in wizard order
    pub fn all() -> &'static [SectionKey] {
        &[
            SectionKey::Identity,
            SectionKey::Address,
            SectionKey::Employment,
            SectionKey::Documents,
        ]
    }

    /// Section bound to a 1-based wizard step
    pub fn for_step(step: usize) -> Option<SectionKey> {
        step.checked_sub(1).and_then(|i| Self::all().get(i).copied())
    }

    /// 1-based wizard step of this section
    pub fn step(&self) -> usize {
        match self {
            SectionKey::Identity => 1,
            SectionKey::Address => 2,
            SectionKey::Employment => 3,
            SectionKey::Documents => 4,
        }
    }

    /// Human title used in prompts and listings
    pub fn title(&self) -> &'static str {
        match self {
            SectionKey::Identity => "Identity",
            SectionKey::Address => "Address",
            SectionKey::Employment => "Employment",
            SectionKey::Documents => "Documents",
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" => Ok(SectionKey::Identity),
            "address" => Ok(SectionKey::Address),
            "employment" => Ok(SectionKey::Employment),
            "documents" => Ok(SectionKey::Documents),
            _ => Err(FieldPathError::UnknownSection(s.to_string())),
        }
    }
}

/// A `section.field` path into a draft
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    pub section: SectionKey,
    pub field: String,
}

impl FieldPath {
    pub fn new(section: SectionKey, field: impl Into<String>) -> Self {
        Self {
            section,
            field: field.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, FieldPathError> {
        s.parse()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.field)
    }
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, field) = s
            .split_once('.')
            .ok_or_else(|| FieldPathError::InvalidPath(s.to_string()))?;
        if field.is_empty() {
            return Err(FieldPathError::InvalidPath(s.to_string()));
        }
        Ok(Self {
            section: section.parse()?,
            field: field.to_string(),
        })
    }
}

/// Errors raised when addressing draft fields
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("invalid field path '{0}' (expected section.field)")]
    InvalidPath(String),

    #[error("unknown section '{0}' (valid: identity, address, employment, documents)")]
    UnknownSection(String),
}

/// In-progress application data, one JSON object per section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    #[serde(default)]
    pub identity: Section,
    #[serde(default)]
    pub address: Section,
    #[serde(default)]
    pub employment: Section,
    #[serde(default)]
    pub documents: Section,
}

impl ApplicationDraft {
    pub fn section(&self, key: SectionKey) -> &Section {
        match key {
            SectionKey::Identity => &self.identity,
            SectionKey::Address => &self.address,
            SectionKey::Employment => &self.employment,
            SectionKey::Documents => &self.documents,
        }
    }

    pub fn section_mut(&mut self, key: SectionKey) -> &mut Section {
        match key {
            SectionKey::Identity => &mut self.identity,
            SectionKey::Address => &mut self.address,
            SectionKey::Employment => &mut self.employment,
            SectionKey::Documents => &mut self.documents,
        }
    }

    /// Read a field by path
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        self.section(path.section).get(&path.field)
    }

    /// Read a string field by path
    pub fn get_str(&self, path: &FieldPath) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Write a field, returning the previous value
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Option<Value> {
        self.section_mut(path.section)
            .insert(path.field.clone(), value)
    }

    /// Remove a field, returning the removed value
    pub fn remove(&mut self, path: &FieldPath) -> Option<Value> {
        self.section_mut(path.section).remove(&path.field)
    }

    /// True when no section carries any value
    pub fn is_empty(&self) -> bool {
        SectionKey::all().iter().all(|k| self.section(*k).is_empty())
    }

    /// Overlay `self` on top of `base`: fields present here win
    pub fn merged_over(&self, base: &ApplicationDraft) -> ApplicationDraft {
        let mut merged = base.clone();
        for key in SectionKey::all() {
            let target = merged.section_mut(*key);
            for (field, value) in self.section(*key) {
                target.insert(field.clone(), value.clone());
            }
        }
        merged
    }

    /// Summary fields stored alongside a submission receipt
    pub fn summary(&self) -> SubmissionSummary {
        let text = |field: &str| {
            self.identity
                .get(field)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(String::from)
        };
        SubmissionSummary {
            first_name: text("firstName"),
            last_name: text("lastName"),
            civility: text("civility"),
        }
    }
}

/// Identity summary kept with a submission receipt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub civility: Option<String>,
}

impl SubmissionSummary {
    /// Display name such as "Mme Awa Diallo"
    pub fn display_name(&self) -> String {
        [&self.civility, &self.first_name, &self.last_name]
            .iter()
            .filter_map(|p| p.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
