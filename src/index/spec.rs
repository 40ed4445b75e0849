//! Index declarations and key canonicalization
//!
//! An index covers one field or an ordered tuple of fields. Stored keys are
//! always laid out in the declared order; lookups may name the same fields
//! in any order and are rearranged before serialization, so equal logical
//! keys always produce equal bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::FieldMap;
use crate::schema::{SchemaError, SchemaResult};

/// One declared index: a single field or a compound field tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexSpec {
    fields: Vec<String>,
}

impl IndexSpec {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_compound(&self) -> bool {
        self.fields.len() > 1
    }

    /// Same field set, regardless of order
    pub fn covers_same_fields(&self, other: &IndexSpec) -> bool {
        self.fields.len() == other.fields.len()
            && other.fields.iter().all(|f| self.fields.contains(f))
    }

    /// Side table holding this index for `doc_type`
    pub fn table_name(&self, doc_type: &str) -> String {
        format!("index_{}_{}", doc_type, self.fields.join(","))
    }

    /// Key of a stored document: the bare field value for a single-field
    /// index, an array in declared order for a compound one. Unset fields
    /// contribute `null`.
    pub fn key_from(&self, body: &FieldMap) -> Value {
        let component = |field: &String| body.get(field).cloned().unwrap_or(Value::Null);
        if self.is_compound() {
            Value::Array(self.fields.iter().map(component).collect())
        } else {
            self.fields.first().map(component).unwrap_or(Value::Null)
        }
    }

    /// Rearrange a lookup key into this (declared) index's field order.
    ///
    /// `requested` names the fields the caller used, a permutation of the
    /// declared fields. Compound keys may be an array positioned like
    /// `requested` or an object keyed by field name.
    pub fn canonicalize(
        &self,
        doc_type: &str,
        requested: &IndexSpec,
        key: &Value,
    ) -> SchemaResult<Value> {
        if !self.is_compound() {
            return Ok(key.clone());
        }

        match key {
            Value::Array(items) => {
                if items.len() != self.fields.len() {
                    return Err(SchemaError::malformed_key(
                        doc_type,
                        &self.fields,
                        format!("{} components for {} fields", items.len(), self.fields.len()),
                    ));
                }
                let ordered = self
                    .fields
                    .iter()
                    .map(|field| {
                        requested
                            .fields
                            .iter()
                            .position(|f| f == field)
                            .map(|pos| items[pos].clone())
                            .ok_or_else(|| {
                                SchemaError::malformed_key(
                                    doc_type,
                                    &self.fields,
                                    format!("no component named '{}'", field),
                                )
                            })
                    })
                    .collect::<SchemaResult<Vec<_>>>()?;
                Ok(Value::Array(ordered))
            }
            Value::Object(map) => {
                if let Some(extra) = map.keys().find(|k| !self.fields.contains(k)) {
                    return Err(SchemaError::malformed_key(
                        doc_type,
                        &self.fields,
                        format!("unexpected component '{}'", extra),
                    ));
                }
                let ordered = self
                    .fields
                    .iter()
                    .map(|field| {
                        map.get(field).cloned().ok_or_else(|| {
                            SchemaError::malformed_key(
                                doc_type,
                                &self.fields,
                                format!("missing component '{}'", field),
                            )
                        })
                    })
                    .collect::<SchemaResult<Vec<_>>>()?;
                Ok(Value::Array(ordered))
            }
            other => Err(SchemaError::malformed_key(
                doc_type,
                &self.fields,
                format!("expected an array or object, got {}", json_type_name(other)),
            )),
        }
    }
}

impl From<&str> for IndexSpec {
    fn from(field: &str) -> Self {
        Self::new([field])
    }
}

impl From<String> for IndexSpec {
    fn from(field: String) -> Self {
        Self::new([field])
    }
}

impl From<&[&str]> for IndexSpec {
    fn from(fields: &[&str]) -> Self {
        Self::new(fields.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for IndexSpec {
    fn from(fields: [&str; N]) -> Self {
        Self::new(fields)
    }
}

impl From<Vec<&str>> for IndexSpec {
    fn from(fields: Vec<&str>) -> Self {
        Self::new(fields)
    }
}

impl From<Vec<String>> for IndexSpec {
    fn from(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaErrorCode;
    use serde_json::json;

    fn person_index() -> IndexSpec {
        IndexSpec::from(["birth_year", "last_name"])
    }

    #[test]
    fn test_table_name() {
        assert_eq!(IndexSpec::from("year").table_name("movie"), "index_movie_year");
        assert_eq!(person_index().table_name("person"), "index_person_birth_year,last_name");
    }

    #[test]
    fn test_key_from_body() {
        let mut body = FieldMap::new();
        body.insert("birth_year".into(), json!(1971));
        body.insert("last_name".into(), json!("Kay"));
        body.insert("first_name".into(), json!("Alan"));

        assert_eq!(person_index().key_from(&body), json!([1971, "Kay"]));
        assert_eq!(IndexSpec::from("first_name").key_from(&body), json!("Alan"));
        assert_eq!(IndexSpec::from("missing").key_from(&body), Value::Null);
    }

    #[test]
    fn test_canonicalize_positional_in_declared_order() {
        let index = person_index();
        let key = index.canonicalize("person", &index, &json!([1971, "Kay"])).unwrap();
        assert_eq!(key, json!([1971, "Kay"]));
    }

    #[test]
    fn test_canonicalize_permuted_request() {
        let index = person_index();
        let requested = IndexSpec::from(["last_name", "birth_year"]);
        let key = index.canonicalize("person", &requested, &json!(["Kay", 1971])).unwrap();
        assert_eq!(key, json!([1971, "Kay"]));
    }

    #[test]
    fn test_canonicalize_object_key() {
        let index = person_index();
        let key = index
            .canonicalize("person", &index, &json!({"last_name": "Kay", "birth_year": 1971}))
            .unwrap();
        assert_eq!(key, json!([1971, "Kay"]));
    }

    #[test]
    fn test_canonicalize_rejects_bad_shapes() {
        let index = person_index();

        let err = index.canonicalize("person", &index, &json!([1971])).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedKey);

        let err = index
            .canonicalize("person", &index, &json!({"birth_year": 1971}))
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedKey);

        let err = index
            .canonicalize("person", &index, &json!({"birth_year": 1971, "last_name": "Kay", "x": 1}))
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedKey);

        let err = index.canonicalize("person", &index, &json!("Kay")).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedKey);
    }

    #[test]
    fn test_single_field_key_passes_through() {
        let index = IndexSpec::from("tags");
        let key = index.canonicalize("post", &index, &json!(["a", "b"])).unwrap();
        assert_eq!(key, json!(["a", "b"]));
    }

    #[test]
    fn test_covers_same_fields() {
        assert!(person_index().covers_same_fields(&IndexSpec::from(["last_name", "birth_year"])));
        assert!(!person_index().covers_same_fields(&IndexSpec::from("last_name")));
    }

    #[test]
    fn test_serde_transparent() {
        let parsed: IndexSpec = serde_json::from_str(r#"["birth_year","last_name"]"#).unwrap();
        assert_eq!(parsed, person_index());
    }
}
