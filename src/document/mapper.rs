//! Document Mapper
//!
//! Binds one registered schema to the entity store, its index tables and
//! the views registered on its type.
//!
//! # Write path
//!
//! ```text
//! resolve fields ──► [ entity insert/update ─► index writes ─► views ] ──► adopt identity
//!   (no I/O)                    one transaction                           (after commit)
//! ```
//!
//! A failure anywhere inside the transaction rolls everything back and
//! leaves the caller's instance as it was.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use serde_json::Value;

use crate::codec::{self, FieldMap};
use crate::index::{IndexManager, IndexSpec};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{apply_defaults, resolve_for_save, Schema, SchemaError};
use crate::storage::{EntityStore, Store, StorageError};
use crate::view::{ChangeKind, ViewEngine, ViewStats};

use super::errors::{DocumentError, DocumentResult};
use super::instance::Document;
use super::query::{Documents, Query};

/// Outcome of the entity and index writes for one document
pub(crate) struct Persisted {
    pub(crate) document: Document,
    pub(crate) index_writes: u64,
}

/// Document-level operations for one document type
#[derive(Clone)]
pub struct DocumentMapper {
    store: Arc<Store>,
    schema: Arc<Schema>,
    views: Option<Arc<ViewEngine>>,
}

impl DocumentMapper {
    pub(crate) fn new(store: Arc<Store>, schema: Arc<Schema>, views: Option<Arc<ViewEngine>>) -> Self {
        Self {
            store,
            schema,
            views,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn doc_type(&self) -> &str {
        &self.schema.doc_type
    }

    /// Unsaved instance from a JSON object of initial values. Unset fields
    /// take their declared default.
    pub fn construct(&self, initial: Value) -> DocumentResult<Document> {
        let mut fields: FieldMap = match initial {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => FieldMap::new(),
            other => {
                let actual = match other {
                    Value::Array(_) => "array",
                    Value::String(_) => "string",
                    Value::Number(_) => "number",
                    _ => "bool",
                };
                return Err(SchemaError::malformed_document(self.doc_type(), actual).into());
            }
        };

        if let Some(extra) = fields.keys().find(|name| !self.schema.declares(name)) {
            return Err(SchemaError::unknown_field(self.doc_type(), extra).into());
        }

        apply_defaults(&self.schema, &mut fields);
        Ok(Document::unsaved(self.doc_type(), fields))
    }

    /// Unsaved instance holding only defaults
    pub fn new_document(&self) -> Document {
        let mut fields = FieldMap::new();
        apply_defaults(&self.schema, &mut fields);
        Document::unsaved(self.doc_type(), fields)
    }

    /// Insert a new document or update a saved one, together with its
    /// index rows and every view on this type, as one atomic write.
    pub fn save(&self, doc: &mut Document) -> DocumentResult<()> {
        self.check_type(doc)?;
        let fields = resolve_for_save(&self.schema, doc.fields())?;
        let change = if doc.is_new() {
            ChangeKind::Created
        } else {
            ChangeKind::Updated
        };

        let current: &Document = doc;
        let (persisted, views) = self.store.write(|tx| {
            let persisted = self.persist(tx, current, fields)?;
            let views = self.recompute_views(tx, &persisted.document, change)?;
            Ok::<_, DocumentError>((persisted, views))
        })?;

        self.record_write(&persisted.document, change, persisted.index_writes, &views);
        doc.adopt(persisted.document);
        Ok(())
    }

    /// Remove a saved document and its index rows, then recompute views.
    /// On success the instance is unsaved again.
    pub fn delete(&self, doc: &mut Document) -> DocumentResult<()> {
        self.check_type(doc)?;
        let Some(id) = doc.id().map(str::to_string) else {
            return Err(DocumentError::NotSaved {
                doc_type: self.doc_type().to_string(),
            });
        };

        let current: &Document = doc;
        let views = self.store.write(|tx| self.delete_in(tx, &id, current))?;

        self.record_write(doc, ChangeKind::Deleted, 0, &views);
        doc.clear_identity();
        Ok(())
    }

    /// Remove the document with `id` without holding an instance of it.
    ///
    /// Same transaction as `delete`: index rows are pruned and every view
    /// on this type is recomputed with the stored document as trigger.
    /// Not-found when no document of this type has that id.
    pub fn remove(&self, id: &str) -> DocumentResult<()> {
        let (removed, views) = self.store.write(|tx| {
            let record = EntityStore::new(tx)
                .get(self.doc_type(), id)?
                .ok_or_else(|| DocumentError::not_found(self.doc_type()))?;
            let removed = Document::from_record(&self.schema, record)?;
            let views = self.delete_in(tx, id, &removed)?;
            Ok::<_, DocumentError>((removed, views))
        })?;

        self.record_write(&removed, ChangeKind::Deleted, 0, &views);
        Ok(())
    }

    /// Load one document of this type by id
    pub fn get(&self, id: &str) -> DocumentResult<Document> {
        let record = self
            .store
            .read(|conn| EntityStore::new(conn).get(self.doc_type(), id))?
            .ok_or_else(|| DocumentError::not_found(self.doc_type()))?;
        Ok(Document::from_record(&self.schema, record)?)
    }

    /// Every document of this type, newest insertion first
    pub fn find_all(&self) -> DocumentResult<Documents> {
        self.find(Query::All)
    }

    /// Documents matching `query`, newest insertion first
    pub fn find(&self, query: Query) -> DocumentResult<Documents> {
        self.store.read(|conn| self.find_in(conn, &query))
    }

    /// Newest match; not-found when nothing matches
    pub fn find_one(&self, query: Query) -> DocumentResult<Document> {
        self.find(query)?
            .next()
            .unwrap_or_else(|| Err(DocumentError::not_found(self.doc_type())))
    }

    /// Match with the greatest sequence, if any
    pub fn find_latest(&self, query: Query) -> DocumentResult<Option<Document>> {
        self.store.read(|conn| self.find_latest_in(conn, &query))
    }

    pub fn count(&self) -> DocumentResult<u64> {
        Ok(self
            .store
            .read(|conn| EntityStore::new(conn).count_by_type(self.doc_type()))?)
    }

    pub(crate) fn find_in(&self, conn: &Connection, query: &Query) -> DocumentResult<Documents> {
        let entities = EntityStore::new(conn);
        let records = match query {
            Query::All => entities.query_by_type(self.doc_type())?,
            Query::Eq { index, key } => {
                let ids = self.lookup_in(conn, index, key)?;
                if ids.is_empty() {
                    return Ok(Documents::empty(Arc::clone(&self.schema)));
                }
                entities.query_by_ids(self.doc_type(), &ids)?
            }
        };
        Ok(Documents::new(Arc::clone(&self.schema), records))
    }

    pub(crate) fn find_latest_in(
        &self,
        conn: &Connection,
        query: &Query,
    ) -> DocumentResult<Option<Document>> {
        let record = match query {
            Query::All => EntityStore::new(conn).query_latest_by_type(self.doc_type())?,
            Query::Eq { index, key } => {
                let record = IndexManager::new(conn).latest(&self.schema, index, key)?;
                self.store.metrics().increment_index_lookups();
                record
            }
        };
        Ok(record
            .map(|r| Document::from_record(&self.schema, r))
            .transpose()?)
    }

    fn lookup_in(
        &self,
        conn: &Connection,
        index: &IndexSpec,
        key: &Value,
    ) -> DocumentResult<BTreeSet<String>> {
        let ids = IndexManager::new(conn).lookup(&self.schema, index, key)?;
        self.store.metrics().increment_index_lookups();
        Ok(ids)
    }

    /// Entity and index writes for `doc` with already-resolved `fields`.
    /// Runs inside the caller's transaction; commits nothing.
    pub(crate) fn persist(
        &self,
        conn: &Connection,
        doc: &Document,
        fields: FieldMap,
    ) -> DocumentResult<Persisted> {
        let doc_type = self.doc_type();
        let body = codec::encode_body(&fields)?;
        let entities = EntityStore::new(conn);
        let is_new = doc.is_new();

        let document = match doc.id() {
            None => {
                let meta = entities.insert(doc_type, &body)?;
                Document::saved(doc_type, meta.id, meta.sequence, meta.updated, fields)
            }
            Some(id) => {
                let sequence = doc.sequence().ok_or_else(|| {
                    StorageError::consistency_fault(id, "saved document carries no sequence")
                })?;
                let updated = entities.update(doc_type, id, &body)?;
                Document::saved(doc_type, id.to_string(), sequence, updated, fields)
            }
        };

        let index = IndexManager::new(conn);
        let mut index_writes = 0;
        if let Some(id) = document.id() {
            for spec in &self.schema.indexes {
                let key = spec.key_from(document.fields());
                index.write(doc_type, spec, id, &key, is_new)?;
                index_writes += 1;
            }
        }

        Ok(Persisted {
            document,
            index_writes,
        })
    }

    /// Entity delete, index pruning and the `Deleted` recompute, inside
    /// the caller's transaction
    fn delete_in(
        &self,
        conn: &Connection,
        id: &str,
        trigger: &Document,
    ) -> DocumentResult<ViewStats> {
        EntityStore::new(conn).delete(self.doc_type(), id)?;
        let index = IndexManager::new(conn);
        for spec in &self.schema.indexes {
            index.remove(self.doc_type(), spec, id)?;
        }
        self.recompute_views(conn, trigger, ChangeKind::Deleted)
    }

    fn recompute_views(
        &self,
        conn: &Connection,
        trigger: &Document,
        change: ChangeKind,
    ) -> DocumentResult<ViewStats> {
        match &self.views {
            Some(engine) => engine.recompute(conn, self, trigger, change),
            None => Ok(ViewStats::default()),
        }
    }

    fn check_type(&self, doc: &Document) -> DocumentResult<()> {
        if doc.doc_type() != self.doc_type() {
            return Err(SchemaError::type_mismatch(self.doc_type(), doc.doc_type()).into());
        }
        Ok(())
    }

    /// Counters and events for a committed write
    fn record_write(&self, doc: &Document, change: ChangeKind, index_writes: u64, views: &ViewStats) {
        let metrics = self.store.metrics();
        let event = match change {
            ChangeKind::Created => {
                metrics.increment_inserted();
                Event::DocumentInserted
            }
            ChangeKind::Updated => {
                metrics.increment_updated();
                Event::DocumentUpdated
            }
            ChangeKind::Deleted => {
                metrics.increment_deleted();
                Event::DocumentDeleted
            }
        };
        metrics.add_index_writes(index_writes + views.index_writes);
        metrics.add_views_recomputed(views.recomputed);
        metrics.add_view_results_persisted(views.persisted);

        let sequence = doc.sequence().map(|s| s.to_string()).unwrap_or_default();
        log_event_with_fields(
            event,
            &[
                ("type", self.doc_type()),
                ("id", doc.id().unwrap_or_default()),
                ("sequence", &sequence),
            ],
        );
    }
}

impl fmt::Debug for DocumentMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentMapper")
            .field("doc_type", &self.schema.doc_type)
            .field("indexes", &self.schema.indexes)
            .field("views", &self.views.is_some())
            .finish()
    }
}
