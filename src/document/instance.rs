//! In-memory document instances
//!
//! Lifecycle:
//!
//! ```text
//! Unsaved (no id) --save--> Saved --save--> Saved (updated refreshed)
//!                             |
//!                           delete
//!                             v
//!                       Unsaved (id cleared)
//! ```
//!
//! Identity fields are only ever assigned by the mapper after a commit.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::codec::FieldMap;
use crate::schema::{resolve_loaded, Schema};
use crate::storage::{format_timestamp, EntityRecord, StorageResult};

/// One document of a registered type
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    doc_type: String,
    id: Option<String>,
    sequence: Option<i64>,
    updated: Option<DateTime<Utc>>,
    fields: FieldMap,
}

impl Document {
    pub(crate) fn unsaved(doc_type: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: None,
            sequence: None,
            updated: None,
            fields,
        }
    }

    pub(crate) fn saved(
        doc_type: impl Into<String>,
        id: String,
        sequence: i64,
        updated: DateTime<Utc>,
        fields: FieldMap,
    ) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: Some(id),
            sequence: Some(sequence),
            updated: Some(updated),
            fields,
        }
    }

    /// Rebuild an instance from a stored record under the current schema
    pub(crate) fn from_record(schema: &Schema, record: EntityRecord) -> StorageResult<Self> {
        let stored = record.decode_body()?;
        Ok(Self::saved(
            record.doc_type,
            record.id,
            record.sequence,
            record.updated,
            resolve_loaded(schema, stored),
        ))
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn sequence(&self) -> Option<i64> {
        self.sequence
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    /// True until the first successful save, and again after delete
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, returning the previous value. Undeclared names are
    /// accepted here and rejected by the next save.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Clear a field so that its default applies at the next save
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Fields plus identity metadata as one JSON object
    pub fn to_json(&self) -> Value {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(id) = &self.id {
            map.insert("id".into(), Value::from(id.as_str()));
        }
        if let Some(sequence) = self.sequence {
            map.insert("sequence".into(), Value::from(sequence));
        }
        if let Some(updated) = &self.updated {
            map.insert("updated".into(), Value::from(format_timestamp(updated)));
        }
        Value::Object(map)
    }

    pub(crate) fn adopt(&mut self, persisted: Document) {
        *self = persisted;
    }

    pub(crate) fn clear_identity(&mut self) {
        self.id = None;
        self.sequence = None;
        self.updated = None;
    }
}
