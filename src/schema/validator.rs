//! Field resolution against a schema
//!
//! Two directions:
//! - save: defaults fill unset fields, then undeclared fields and
//!   unresolved required fields reject the write
//! - load: stored bodies are taken as they are; fields the schema dropped
//!   are ignored and fields it added resolve to their default
//!
//! Neither function touches storage.

use serde_json::Value;

use crate::codec::FieldMap;

use super::errors::{SchemaError, SchemaResult};
use super::types::Schema;

/// Resolve the body that a save will persist.
///
/// Every declared field appears in the result (`null` when it has neither
/// a value nor a default).
pub fn resolve_for_save(schema: &Schema, fields: &FieldMap) -> SchemaResult<FieldMap> {
    if let Some(extra) = fields.keys().find(|name| !schema.declares(name)) {
        return Err(SchemaError::unknown_field(&schema.doc_type, extra));
    }

    let mut resolved = FieldMap::new();
    for def in &schema.fields {
        let value = fields
            .get(&def.name)
            .or(def.default.as_ref())
            .cloned()
            .unwrap_or(Value::Null);

        if def.required && value.is_null() {
            return Err(SchemaError::required_field_missing(&schema.doc_type, &def.name));
        }
        resolved.insert(def.name.clone(), value);
    }

    Ok(resolved)
}

/// Initial values for a freshly constructed instance: every declared
/// field is present, unset ones holding their default (or `null`).
pub fn apply_defaults(schema: &Schema, fields: &mut FieldMap) {
    for def in &schema.fields {
        fields
            .entry(def.name.clone())
            .or_insert_with(|| def.default.clone().unwrap_or(Value::Null));
    }
}

/// Map a stored body onto the current schema.
pub fn resolve_loaded(schema: &Schema, mut stored: FieldMap) -> FieldMap {
    schema
        .fields
        .iter()
        .map(|def| {
            let value = stored
                .remove(&def.name)
                .or_else(|| def.default.clone())
                .unwrap_or(Value::Null);
            (def.name.clone(), value)
        })
        .collect()
}
