//! Document type definitions
//!
//! A schema names a document type, its fields (each optionally carrying a
//! default and a required flag) and the indexes declared over those fields.
//! Fields have no declared value type: any JSON value is accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::index::IndexSpec;

use super::errors::{SchemaError, SchemaResult};

/// Names every document carries as metadata; never usable as field names
pub const RESERVED_FIELD_NAMES: [&str; 3] = ["id", "sequence", "updated"];

/// Prefix reserved for internal document types
pub const INTERNAL_TYPE_PREFIX: &str = "__";

/// Field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Applied when the field is absent at construction or load time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Must resolve to a non-null value at save time
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    /// A required field without default
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            required: true,
        }
    }

    /// An optional field without default
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            required: false,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Complete definition of one document type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl Schema {
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    pub fn index(mut self, index: impl Into<IndexSpec>) -> Self {
        self.indexes.push(index.into());
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.field_def(name).is_some()
    }

    /// Declared index covering the same field set as `requested`
    pub fn find_index(&self, requested: &IndexSpec) -> SchemaResult<&IndexSpec> {
        self.indexes
            .iter()
            .find(|declared| declared.covers_same_fields(requested))
            .ok_or_else(|| SchemaError::undeclared_index(&self.doc_type, requested.fields()))
    }

    pub fn is_internal(&self) -> bool {
        self.doc_type.starts_with(INTERNAL_TYPE_PREFIX)
    }

    /// Check the definition itself. Internal types may use the reserved
    /// prefix; everything else is checked the same way.
    pub(crate) fn validate_structure(&self, allow_internal: bool) -> SchemaResult<()> {
        let doc_type = self.doc_type.as_str();

        if doc_type.is_empty() {
            return Err(SchemaError::invalid(doc_type, "type name is empty"));
        }
        if self.is_internal() && !allow_internal {
            return Err(SchemaError::invalid(
                doc_type,
                format!("type names starting with '{}' are reserved", INTERNAL_TYPE_PREFIX),
            ));
        }

        let mut seen = HashSet::new();
        for def in &self.fields {
            if def.name.is_empty() {
                return Err(SchemaError::invalid(doc_type, "field name is empty"));
            }
            if RESERVED_FIELD_NAMES.contains(&def.name.as_str()) {
                return Err(SchemaError::invalid(
                    doc_type,
                    format!("field name '{}' is reserved", def.name),
                ));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(SchemaError::invalid(
                    doc_type,
                    format!("field '{}' declared twice", def.name),
                ));
            }
            if def.required && def.default == Some(Value::Null) {
                return Err(SchemaError::invalid(
                    doc_type,
                    format!("required field '{}' has a null default", def.name),
                ));
            }
        }

        for (pos, index) in self.indexes.iter().enumerate() {
            if index.fields().is_empty() {
                return Err(SchemaError::invalid(doc_type, "index covers no fields"));
            }
            let mut in_index = HashSet::new();
            for field in index.fields() {
                if !self.declares(field) {
                    return Err(SchemaError::invalid(
                        doc_type,
                        format!("index field '{}' is not a declared field", field),
                    ));
                }
                if !in_index.insert(field.as_str()) {
                    return Err(SchemaError::invalid(
                        doc_type,
                        format!("field '{}' repeated within one index", field),
                    ));
                }
            }
            if self.indexes[..pos]
                .iter()
                .any(|earlier| earlier.covers_same_fields(index))
            {
                return Err(SchemaError::invalid(
                    doc_type,
                    format!("index on [{}] declared twice", index.fields().join(", ")),
                ));
            }
        }

        Ok(())
    }
}
