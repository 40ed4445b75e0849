//! Entity record types
//!
//! One row of the `entities` table:
//!
//! ```text
//! +----------+------------+-----------------+--------+-------------+
//! | sequence | id (uuid)  | updated (3339)  | type   | body (blob) |
//! +----------+------------+-----------------+--------+-------------+
//! ```

use chrono::{DateTime, SecondsFormat, Utc};

use crate::codec::{self, FieldMap};

use super::errors::{StorageError, StorageResult};

/// Identity assigned to an entity when it is first inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    /// Stable identifier, never reassigned
    pub id: String,
    /// Insertion order across all types, never reassigned
    pub sequence: i64,
    /// Time of this write
    pub updated: DateTime<Utc>,
}

/// A stored entity as read back from the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub sequence: i64,
    pub id: String,
    pub updated: DateTime<Utc>,
    pub doc_type: String,
    pub body: Vec<u8>,
}

impl EntityRecord {
    /// Decode the body, reporting damage against this record's id
    pub fn decode_body(&self) -> StorageResult<FieldMap> {
        codec::decode_body(&self.body)
            .map_err(|e| StorageError::corruption_for_document(&self.id, e.to_string()))
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntityRow> {
        Ok(RawEntityRow {
            sequence: row.get(0)?,
            id: row.get(1)?,
            updated: row.get(2)?,
            doc_type: row.get(3)?,
            body: row.get::<_, Option<Vec<u8>>>(4)?.unwrap_or_default(),
        })
    }
}

/// Row as returned by SQLite, before the timestamp is parsed
pub(crate) struct RawEntityRow {
    sequence: i64,
    id: String,
    updated: String,
    doc_type: String,
    body: Vec<u8>,
}

impl RawEntityRow {
    pub(crate) fn into_record(self) -> StorageResult<EntityRecord> {
        let updated = parse_timestamp(&self.updated)
            .ok_or_else(|| StorageError::corruption_for_document(&self.id, "unparseable updated timestamp"))?;
        Ok(EntityRecord {
            sequence: self.sequence,
            id: self.id,
            updated,
            doc_type: self.doc_type,
            body: self.body,
        })
    }
}

/// Fixed-width RFC 3339 with nanoseconds, so text order matches time order
/// and the value survives a round trip exactly.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_round_trip_is_exact() {
        let now = Utc::now();
        let formatted = format_timestamp(&now);
        assert!(formatted.ends_with('Z'));
        assert_eq!(parse_timestamp(&formatted), Some(now));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_decode_body_reports_id() {
        let record = EntityRecord {
            sequence: 1,
            id: "doc-1".into(),
            updated: Utc::now(),
            doc_type: "movie".into(),
            body: vec![1, 0, 0],
        };
        let err = record.decode_body().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.details(), Some("id: doc-1"));
    }

    #[test]
    fn test_decode_body_ok() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!("Blade Runner"));
        let record = EntityRecord {
            sequence: 7,
            id: "doc-7".into(),
            updated: Utc::now(),
            doc_type: "movie".into(),
            body: codec::encode_body(&fields).unwrap(),
        };
        assert_eq!(record.decode_body().unwrap(), fields);
    }
}
