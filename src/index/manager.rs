//! Index Manager
//!
//! One side table per declared index, mapping canonical key bytes to
//! entity ids. Like the entity store it runs against whatever connection
//! or transaction it was built on.
//!
//! # API
//!
//! - `declare(type, index)` - create the side table (idempotent)
//! - `write(type, index, id, key, is_new)` - insert or rewrite the id's row
//! - `lookup(schema, requested, key)` - ids whose key equals `key`
//! - `latest(schema, requested, key)` - newest entity whose key equals `key`
//! - `remove(type, index, id)` - prune the id's row

use std::collections::BTreeSet;

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::codec;
use crate::observability::{log_event_with_fields, warn_event, Event};
use crate::schema::Schema;
use crate::storage::{EntityRecord, EntityStore, SqlContext, StorageResult};

use super::errors::IndexResult;
use super::spec::IndexSpec;

/// Quote an identifier for SQLite
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Index operations bound to one connection or transaction.
pub struct IndexManager<'c> {
    conn: &'c Connection,
}

impl<'c> IndexManager<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create the side table for `index` and its lookup indexes if absent.
    pub fn declare(&self, doc_type: &str, index: &IndexSpec) -> StorageResult<()> {
        let table = index.table_name(doc_type);
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (id TEXT NOT NULL, value BLOB NOT NULL);
                 CREATE INDEX IF NOT EXISTS {by_value} ON {table}(value);
                 CREATE INDEX IF NOT EXISTS {by_id} ON {table}(id);",
                table = quote_ident(&table),
                by_value = quote_ident(&format!("{}_value", table)),
                by_id = quote_ident(&format!("{}_id", table)),
            ))
            .sql_context("declare index")?;

        log_event_with_fields(
            Event::IndexDeclared,
            &[("type", doc_type), ("table", &table)],
        );
        Ok(())
    }

    /// Record `key` for entity `id`.
    ///
    /// New entities get a fresh row. For existing entities the row is
    /// rewritten in place; if there is none (the index was declared after
    /// the entity was stored) it is inserted. Returns whether that
    /// backfill happened.
    pub fn write(
        &self,
        doc_type: &str,
        index: &IndexSpec,
        id: &str,
        key: &Value,
        is_new: bool,
    ) -> IndexResult<bool> {
        let table = quote_ident(&index.table_name(doc_type));
        let bytes = codec::encode_index_key(key)?;

        if !is_new {
            let changed = self
                .conn
                .execute(
                    &format!("UPDATE {} SET value = ?1 WHERE id = ?2", table),
                    params![bytes, id],
                )
                .sql_context("update index row")?;
            if changed > 0 {
                return Ok(false);
            }
        }

        self.conn
            .execute(
                &format!("INSERT INTO {} (id, value) VALUES (?1, ?2)", table),
                params![id, bytes],
            )
            .sql_context("insert index row")?;

        if !is_new {
            warn_event(
                Event::IndexRowBackfilled,
                &[("type", doc_type), ("index", &index.fields().join(",")), ("id", id)],
            );
        }
        Ok(!is_new)
    }

    /// Quoted side table and key bytes for a lookup on `requested`
    fn resolve(
        &self,
        schema: &Schema,
        requested: &IndexSpec,
        key: &Value,
    ) -> IndexResult<(String, Vec<u8>)> {
        let declared = schema.find_index(requested)?;
        let canonical = declared.canonicalize(&schema.doc_type, requested, key)?;
        let bytes = codec::encode_index_key(&canonical)?;
        Ok((quote_ident(&declared.table_name(&schema.doc_type)), bytes))
    }

    /// Ids of `schema.doc_type` entities whose key on `requested` equals
    /// `key`. The fields may be named in any order of a declared index.
    pub fn lookup(
        &self,
        schema: &Schema,
        requested: &IndexSpec,
        key: &Value,
    ) -> IndexResult<BTreeSet<String>> {
        let (table, bytes) = self.resolve(schema, requested, key)?;
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT id FROM {} WHERE value = ?1", table))
            .sql_context("prepare index lookup")?;

        let ids = stmt
            .query_map(params![bytes], |row| row.get::<_, String>(0))
            .sql_context("index lookup")?
            .collect::<Result<BTreeSet<_>, _>>()
            .sql_context("read index row")?;
        Ok(ids)
    }

    /// Newest `schema.doc_type` entity whose key on `requested` equals
    /// `key`, without materializing every matching id.
    pub fn latest(
        &self,
        schema: &Schema,
        requested: &IndexSpec,
        key: &Value,
    ) -> IndexResult<Option<EntityRecord>> {
        let (table, bytes) = self.resolve(schema, requested, key)?;
        Ok(EntityStore::new(self.conn).query_latest_by_index(&schema.doc_type, &table, &bytes)?)
    }

    /// Remove every row for `id` from `index`.
    pub fn remove(&self, doc_type: &str, index: &IndexSpec, id: &str) -> StorageResult<usize> {
        let table = quote_ident(&index.table_name(doc_type));
        self.conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])
            .sql_context("prune index row")
    }

    /// Number of rows held for `index`
    pub fn row_count(&self, doc_type: &str, index: &IndexSpec) -> StorageResult<u64> {
        let table = quote_ident(&index.table_name(doc_type));
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .sql_context("count index rows")?;
        Ok(count as u64)
    }
}
