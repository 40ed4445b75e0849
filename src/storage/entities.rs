//! Entity Store
//!
//! Owns the primary `entities` table. Every function runs against the
//! connection (or open transaction) it was built on; committing is the
//! caller's job.
//!
//! # API
//!
//! - `insert(type, body)` - fresh id + next sequence
//! - `update(type, id, body)` - rewrite body and `updated`, sequence untouched
//! - `delete(type, id)` - remove the row
//! - `query_by_type(type)` - all rows, newest insertion first
//! - `query_by_ids(type, ids)` - subset, newest insertion first
//! - `query_latest_by_type(type)` - greatest sequence of the type
//! - `query_latest_by_index(type, table, key)` - greatest sequence among index matches

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event};

use super::errors::{SqlContext, StorageError, StorageResult};
use super::record::{format_timestamp, EntityMeta, EntityRecord, RawEntityRow};

const SELECT_ENTITY: &str = "SELECT sequence, id, updated, type, body FROM entities";

/// Ids bound per `IN (...)` statement, well under SQLite's parameter limit
const ID_CHUNK: usize = 500;

/// Create the entity table and its secondary indexes if absent.
pub fn init_tables(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            updated TEXT NOT NULL,
            type TEXT NOT NULL,
            body BLOB
        );
        CREATE INDEX IF NOT EXISTS entities_by_id ON entities(id);
        CREATE INDEX IF NOT EXISTS entities_by_id_type ON entities(id, type);
        CREATE INDEX IF NOT EXISTS entities_by_type_sequence ON entities(type, sequence);
        "#,
    )
    .sql_context("create entities table")
}

/// Entity table operations bound to one connection or transaction.
pub struct EntityStore<'c> {
    conn: &'c Connection,
}

impl<'c> EntityStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert a new entity, assigning a fresh id and the next sequence.
    pub fn insert(&self, doc_type: &str, body: &[u8]) -> StorageResult<EntityMeta> {
        let id = Uuid::new_v4().to_string();
        let updated = Utc::now();

        self.conn
            .execute(
                "INSERT INTO entities (id, updated, type, body) VALUES (?1, ?2, ?3, ?4)",
                params![id, format_timestamp(&updated), doc_type, body],
            )
            .sql_context("insert entity")?;

        Ok(EntityMeta {
            id,
            sequence: self.conn.last_insert_rowid(),
            updated,
        })
    }

    /// Rewrite body and timestamp of an existing entity.
    ///
    /// A missing row is a consistency fault: the caller believed the entity
    /// existed.
    pub fn update(&self, doc_type: &str, id: &str, body: &[u8]) -> StorageResult<DateTime<Utc>> {
        let updated = Utc::now();
        let changed = self
            .conn
            .execute(
                "UPDATE entities SET body = ?1, updated = ?2 WHERE id = ?3 AND type = ?4",
                params![body, format_timestamp(&updated), id, doc_type],
            )
            .sql_context("update entity")?;

        if changed == 0 {
            return Err(consistency_fault(doc_type, id, "update matched no entity"));
        }
        Ok(updated)
    }

    /// Remove an entity row.
    pub fn delete(&self, doc_type: &str, id: &str) -> StorageResult<()> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM entities WHERE id = ?1 AND type = ?2",
                params![id, doc_type],
            )
            .sql_context("delete entity")?;

        if changed == 0 {
            return Err(consistency_fault(doc_type, id, "delete matched no entity"));
        }
        Ok(())
    }

    /// Load one entity of `doc_type` by id.
    pub fn get(&self, doc_type: &str, id: &str) -> StorageResult<Option<EntityRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1 AND type = ?2", SELECT_ENTITY),
                params![id, doc_type],
                EntityRecord::from_row,
            )
            .optional()
            .sql_context("load entity")?;

        raw.map(RawEntityRow::into_record).transpose()
    }

    /// All live entities of `doc_type`, newest insertion first.
    pub fn query_by_type(&self, doc_type: &str) -> StorageResult<Vec<EntityRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "{} WHERE type = ?1 ORDER BY sequence DESC",
                SELECT_ENTITY
            ))
            .sql_context("prepare type scan")?;

        let rows = stmt
            .query_map(params![doc_type], EntityRecord::from_row)
            .sql_context("scan entities by type")?
            .collect::<Result<Vec<_>, _>>()
            .sql_context("read entity row")?;

        rows.into_iter().map(RawEntityRow::into_record).collect()
    }

    /// Entities of `doc_type` whose id is in `ids`, newest insertion first.
    pub fn query_by_ids(
        &self,
        doc_type: &str,
        ids: &BTreeSet<String>,
    ) -> StorageResult<Vec<EntityRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "{} WHERE type = ?1 AND id IN ({})",
                SELECT_ENTITY,
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql).sql_context("prepare id scan")?;
            let rows = stmt
                .query_map(
                    params_from_iter(std::iter::once(doc_type).chain(chunk.iter().copied())),
                    EntityRecord::from_row,
                )
                .sql_context("scan entities by id")?
                .collect::<Result<Vec<_>, _>>()
                .sql_context("read entity row")?;

            for raw in rows {
                records.push(raw.into_record()?);
            }
        }

        records.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(records)
    }

    /// The entity of `doc_type` with the greatest sequence.
    pub fn query_latest_by_type(&self, doc_type: &str) -> StorageResult<Option<EntityRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE type = ?1 ORDER BY sequence DESC LIMIT 1",
                    SELECT_ENTITY
                ),
                params![doc_type],
                EntityRecord::from_row,
            )
            .optional()
            .sql_context("load latest entity")?;
        raw.map(RawEntityRow::into_record).transpose()
    }

    /// The entity of `doc_type` with the greatest sequence among those
    /// whose row in index table `index_table` (already quoted) holds
    /// `key`. One indexed probe, however many rows match.
    pub fn query_latest_by_index(
        &self,
        doc_type: &str,
        index_table: &str,
        key: &[u8],
    ) -> StorageResult<Option<EntityRecord>> {
        let raw = self
            .conn
            .prepare_cached(&format!(
                "SELECT e.sequence, e.id, e.updated, e.type, e.body
                 FROM entities e JOIN {} i ON i.id = e.id
                 WHERE i.value = ?1 AND e.type = ?2
                 ORDER BY e.sequence DESC LIMIT 1",
                index_table
            ))
            .sql_context("prepare latest by index")?
            .query_row(params![key, doc_type], EntityRecord::from_row)
            .optional()
            .sql_context("load latest entity by index")?;
        raw.map(RawEntityRow::into_record).transpose()
    }

    /// Number of live entities of `doc_type`.
    pub fn count_by_type(&self, doc_type: &str) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE type = ?1",
                params![doc_type],
                |row| row.get(0),
            )
            .sql_context("count entities")?;
        Ok(count as u64)
    }
}

/// `?2, ?3, ...` for `n` ids following the type parameter
fn placeholders(n: usize) -> String {
    (2..n + 2)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn consistency_fault(doc_type: &str, id: &str, reason: &str) -> StorageError {
    log_event_with_fields(
        Event::ConsistencyFault,
        &[("type", doc_type), ("id", id), ("reason", reason)],
    );
    StorageError::consistency_fault(id, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::errors::StorageErrorCode;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = conn();
        init_tables(&conn).unwrap();
    }

    #[test]
    fn test_insert_assigns_increasing_sequences() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let a = store.insert("movie", b"a").unwrap();
        let b = store.insert("person", b"b").unwrap();
        let c = store.insert("movie", b"c").unwrap();

        assert!(a.sequence < b.sequence);
        assert!(b.sequence < c.sequence);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_sequence_not_reused_after_delete() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let a = store.insert("movie", b"a").unwrap();
        store.delete("movie", &a.id).unwrap();
        let b = store.insert("movie", b"b").unwrap();

        assert!(b.sequence > a.sequence);
    }

    #[test]
    fn test_update_keeps_sequence() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let meta = store.insert("movie", b"old").unwrap();
        let updated = store.update("movie", &meta.id, b"new").unwrap();
        assert!(updated >= meta.updated);

        let record = store.get("movie", &meta.id).unwrap().unwrap();
        assert_eq!(record.sequence, meta.sequence);
        assert_eq!(record.body, b"new".to_vec());
        assert_eq!(record.updated, updated);
    }

    #[test]
    fn test_update_missing_is_consistency_fault() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let err = store.update("movie", "missing", b"x").unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::ConsistencyFault);
    }

    #[test]
    fn test_update_wrong_type_is_consistency_fault() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let meta = store.insert("movie", b"x").unwrap();
        let err = store.update("person", &meta.id, b"y").unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::ConsistencyFault);
    }

    #[test]
    fn test_delete_missing_is_consistency_fault() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let err = store.delete("movie", "missing").unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::ConsistencyFault);
    }

    #[test]
    fn test_query_by_type_newest_first_and_filtered() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let a = store.insert("movie", b"a").unwrap();
        store.insert("person", b"p").unwrap();
        let b = store.insert("movie", b"b").unwrap();

        let ids: Vec<String> = store
            .query_by_type("movie")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
        assert_eq!(store.count_by_type("movie").unwrap(), 2);
    }

    #[test]
    fn test_query_by_ids_filters_type() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let a = store.insert("movie", b"a").unwrap();
        let p = store.insert("person", b"p").unwrap();
        let b = store.insert("movie", b"b").unwrap();

        let ids: BTreeSet<String> = [a.id.clone(), p.id.clone(), b.id.clone()].into_iter().collect();
        let found: Vec<String> = store
            .query_by_ids("movie", &ids)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(found, vec![b.id, a.id]);
    }

    #[test]
    fn test_query_by_ids_spans_chunks() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        let mut ids = BTreeSet::new();
        for _ in 0..(ID_CHUNK + 20) {
            ids.insert(store.insert("movie", b"x").unwrap().id);
        }

        let records = store.query_by_ids("movie", &ids).unwrap();
        assert_eq!(records.len(), ID_CHUNK + 20);
        assert!(records.windows(2).all(|w| w[0].sequence > w[1].sequence));
    }

    #[test]
    fn test_query_latest() {
        let conn = conn();
        let store = EntityStore::new(&conn);

        assert!(store.query_latest_by_type("movie").unwrap().is_none());

        store.insert("movie", b"a").unwrap();
        let b = store.insert("movie", b"b").unwrap();
        store.insert("person", b"p").unwrap();

        let latest = store.query_latest_by_type("movie").unwrap().unwrap();
        assert_eq!(latest.id, b.id);
    }

    #[test]
    fn test_query_latest_by_index() {
        let conn = conn();
        conn.execute_batch("CREATE TABLE side (id TEXT NOT NULL, value BLOB NOT NULL);")
            .unwrap();
        let store = EntityStore::new(&conn);

        let a = store.insert("movie", b"a").unwrap();
        let b = store.insert("movie", b"b").unwrap();
        let p = store.insert("person", b"p").unwrap();
        for (id, key) in [(&a.id, b"k"), (&b.id, b"x"), (&p.id, b"k")] {
            conn.execute(
                "INSERT INTO side (id, value) VALUES (?1, ?2)",
                params![id, &key[..]],
            )
            .unwrap();
        }

        let latest = store
            .query_latest_by_index("movie", "side", b"k")
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, a.id);
        assert!(store
            .query_latest_by_index("movie", "side", b"none")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?2, ?3, ?4");
    }
}
