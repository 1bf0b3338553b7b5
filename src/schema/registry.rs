//! Section schema registry backed by embedded JSON Schema files

use rust_embed::RustEmbed;
use serde_json::Value;
use std::collections::HashMap;

use crate::entities::{ApplicationDraft, SectionKey};

#[derive(RustEmbed)]
#[folder = "schemas/"]
struct SchemaAssets;

/// Declarative schemas, one per application section
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<SectionKey, Value>,
}

impl SchemaRegistry {
    /// A registry with no schemas (every step is then unvalidatable)
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Load the schemas embedded in the binary
    pub fn embedded() -> Self {
        let mut registry = Self::empty();
        for key in SectionKey::all() {
            let file = format!("{}.schema.json", key.as_str());
            let Some(asset) = SchemaAssets::get(&file) else {
                tracing::warn!("no embedded schema for section {key}");
                continue;
            };
            match serde_json::from_slice::<Value>(&asset.data) {
                Ok(schema) => registry.insert(*key, schema),
                Err(e) => tracing::warn!("embedded schema {file} is not valid JSON: {e}"),
            }
        }
        registry
    }

    /// Register or replace the schema for a section
    pub fn insert(&mut self, key: SectionKey, schema: Value) {
        self.schemas.insert(key, schema);
    }

    pub fn get(&self, key: SectionKey) -> Option<&Value> {
        self.schemas.get(&key)
    }

    pub fn has_schema(&self, key: SectionKey) -> bool {
        self.schemas.contains_key(&key)
    }

    /// Schema of a single field within a section
    pub fn field_schema(&self, key: SectionKey, field: &str) -> Option<&Value> {
        self.get(key)?.get("properties")?.get(field)
    }

    /// Whether a field is listed as unconditionally required
    pub fn is_required(&self, key: SectionKey, field: &str) -> bool {
        self.get(key)
            .and_then(|s| s.get("required"))
            .and_then(|r| r.as_array())
            .is_some_and(|arr| arr.iter().any(|v| v.as_str() == Some(field)))
    }

    /// Field names declared by a section schema
    pub fn field_names(&self, key: SectionKey) -> Vec<String> {
        self.get(key)
            .and_then(|s| s.get("properties"))
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Draft populated from every `default` declared in the schemas
    pub fn defaults(&self) -> ApplicationDraft {
        let mut draft = ApplicationDraft::default();
        for key in SectionKey::all() {
            let Some(props) = self
                .get(*key)
                .and_then(|s| s.get("properties"))
                .and_then(|p| p.as_object())
            else {
                continue;
            };
            let section = draft.section_mut(*key);
            for (name, prop) in props {
                if let Some(default) = prop.get("default") {
                    section.insert(name.clone(), default.clone());
                }
            }
        }
        draft
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::embedded()
    }
}
