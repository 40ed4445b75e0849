//! View Engine
//!
//! Views are recomputed from the full snapshot of their owner type inside
//! the transaction of every save or delete of that type. Each non-empty
//! result is appended as a `__view_result` document, so the latest value
//! and the whole history live in the same store as the documents.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use rusqlite::Connection;
use serde_json::{json, Value};

use crate::codec::FieldMap;
use crate::document::{
    Document, DocumentError, DocumentMapper, DocumentResult, Documents, Persisted, Query,
};
use crate::index::IndexManager;
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::schema::{resolve_for_save, FieldDef, Schema, SchemaError};
use crate::storage::{StorageError, Store};

use super::context::{ChangeKind, ViewContext, ViewFn};

/// Reserved type holding persisted view results
pub const VIEW_RESULT_TYPE: &str = "__view_result";

const OWNER_FIELD: &str = "owner_type";
const NAME_FIELD: &str = "view_name";
const VALUE_FIELD: &str = "value";

fn view_result_schema() -> Schema {
    Schema::new(VIEW_RESULT_TYPE)
        .field(FieldDef::required(OWNER_FIELD))
        .field(FieldDef::required(NAME_FIELD))
        .field(FieldDef::optional(VALUE_FIELD))
        .index(OWNER_FIELD)
        .index([OWNER_FIELD, NAME_FIELD])
}

fn result_key(owner_type: &str, view_name: &str) -> Query {
    Query::eq([OWNER_FIELD, NAME_FIELD], json!([owner_type, view_name]))
}

fn result_value(doc: &Document) -> Value {
    doc.get(VALUE_FIELD).cloned().unwrap_or(Value::Null)
}

struct View {
    name: String,
    callback: ViewFn,
}

/// What the views of one write did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ViewStats {
    pub recomputed: u64,
    pub persisted: u64,
    pub index_writes: u64,
}

/// Registered views and their persisted results
pub struct ViewEngine {
    results: DocumentMapper,
    views: RwLock<HashMap<String, Vec<Arc<View>>>>,
}

impl ViewEngine {
    /// Ensure the result type's index tables exist
    pub(crate) fn new(store: Arc<Store>) -> DocumentResult<Self> {
        let schema = view_result_schema();
        schema.validate_structure(true)?;

        store.write(|tx| {
            let index = IndexManager::new(tx);
            for spec in &schema.indexes {
                index.declare(&schema.doc_type, spec)?;
            }
            Ok::<_, DocumentError>(())
        })?;

        Ok(Self {
            results: DocumentMapper::new(store, Arc::new(schema), None),
            views: RwLock::new(HashMap::new()),
        })
    }

    /// Bind `callback` to `owner_type` under `view_name`. The caller checks
    /// that the owner type is registered.
    pub(crate) fn register(
        &self,
        owner_type: &str,
        view_name: &str,
        callback: ViewFn,
    ) -> DocumentResult<()> {
        if view_name.is_empty() {
            return Err(SchemaError::invalid(owner_type, "view name is empty").into());
        }

        let mut views = self
            .views
            .write()
            .map_err(|_| StorageError::lock_poisoned("register view"))?;
        let registered = views.entry(owner_type.to_string()).or_default();
        if registered.iter().any(|view| view.name == view_name) {
            return Err(DocumentError::DuplicateView {
                owner_type: owner_type.to_string(),
                view_name: view_name.to_string(),
            });
        }
        registered.push(Arc::new(View {
            name: view_name.to_string(),
            callback,
        }));

        log_event_with_fields(
            Event::ViewRegistered,
            &[("owner_type", owner_type), ("view_name", view_name)],
        );
        Ok(())
    }

    /// Names of the views on `owner_type`, in run order
    pub fn view_names(&self, owner_type: &str) -> DocumentResult<Vec<String>> {
        Ok(self
            .views_of(owner_type)?
            .iter()
            .map(|view| view.name.clone())
            .collect())
    }

    pub fn is_registered(&self, owner_type: &str, view_name: &str) -> DocumentResult<bool> {
        Ok(self
            .views_of(owner_type)?
            .iter()
            .any(|view| view.name == view_name))
    }

    fn views_of(&self, owner_type: &str) -> DocumentResult<Vec<Arc<View>>> {
        let views = self
            .views
            .read()
            .map_err(|_| StorageError::lock_poisoned("read views"))?;
        Ok(views.get(owner_type).cloned().unwrap_or_default())
    }

    /// Run every view on the owner's type against the state inside `conn`
    /// and append the results there. Commits nothing.
    pub(crate) fn recompute(
        &self,
        conn: &Connection,
        owner: &DocumentMapper,
        trigger: &Document,
        change: ChangeKind,
    ) -> DocumentResult<ViewStats> {
        let owner_type = owner.doc_type();
        let views = self.views_of(owner_type)?;
        let mut stats = ViewStats::default();
        if views.is_empty() {
            return Ok(stats);
        }

        let documents = owner
            .find_in(conn, &Query::All)?
            .collect::<DocumentResult<Vec<_>>>()?;

        for view in &views {
            let previous = self.latest_in(conn, owner_type, &view.name)?;
            let context = ViewContext {
                owner_type,
                view_name: &view.name,
                documents: &documents,
                previous: previous.as_ref(),
                change,
                trigger,
            };
            stats.recomputed += 1;

            match (view.callback)(&context) {
                Some(value) => {
                    let persisted = self.append(conn, owner_type, &view.name, value)?;
                    stats.persisted += 1;
                    stats.index_writes += persisted.index_writes;
                    Logger::trace(
                        Event::ViewRecomputed.as_str(),
                        &[
                            ("owner_type", owner_type),
                            ("view_name", &view.name),
                            ("change", change.as_str()),
                        ],
                    );
                }
                None => {
                    Logger::trace(
                        Event::ViewSkipped.as_str(),
                        &[
                            ("owner_type", owner_type),
                            ("view_name", &view.name),
                            ("change", change.as_str()),
                        ],
                    );
                }
            }
        }

        Ok(stats)
    }

    fn latest_in(
        &self,
        conn: &Connection,
        owner_type: &str,
        view_name: &str,
    ) -> DocumentResult<Option<Value>> {
        Ok(self
            .results
            .find_latest_in(conn, &result_key(owner_type, view_name))?
            .map(|doc| result_value(&doc)))
    }

    fn append(
        &self,
        conn: &Connection,
        owner_type: &str,
        view_name: &str,
        value: Value,
    ) -> DocumentResult<Persisted> {
        let mut fields = FieldMap::new();
        fields.insert(OWNER_FIELD.to_string(), Value::from(owner_type));
        fields.insert(NAME_FIELD.to_string(), Value::from(view_name));
        fields.insert(VALUE_FIELD.to_string(), value);

        let doc = Document::unsaved(VIEW_RESULT_TYPE, fields);
        let resolved = resolve_for_save(self.results.schema(), doc.fields())?;
        self.results.persist(conn, &doc, resolved)
    }

    /// Most recent result of the view, if one was ever persisted
    pub fn latest(&self, owner_type: &str, view_name: &str) -> DocumentResult<Option<Value>> {
        Ok(self
            .results
            .find_latest(result_key(owner_type, view_name))?
            .map(|doc| result_value(&doc)))
    }

    /// Every persisted result of the view, newest first
    pub fn history(&self, owner_type: &str, view_name: &str) -> DocumentResult<ViewHistory> {
        Ok(ViewHistory {
            documents: self.results.find(result_key(owner_type, view_name))?,
        })
    }

    /// Number of results persisted across all views of `owner_type`
    pub fn result_count(&self, owner_type: &str) -> DocumentResult<usize> {
        Ok(self.results.find(Query::eq(OWNER_FIELD, owner_type))?.len())
    }
}

impl fmt::Debug for ViewEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self
            .views
            .read()
            .map(|views| views.values().map(Vec::len).sum::<usize>())
            .unwrap_or_default();
        f.debug_struct("ViewEngine")
            .field("registered", &registered)
            .finish_non_exhaustive()
    }
}

/// Persisted results of one view, newest first
#[derive(Debug)]
pub struct ViewHistory {
    documents: Documents,
}

impl Iterator for ViewHistory {
    type Item = DocumentResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents
            .next()
            .map(|doc| doc.map(|doc| result_value(&doc)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl ExactSizeIterator for ViewHistory {}

/// One registered view, as handed out by the database
#[derive(Debug, Clone)]
pub struct ViewHandle {
    engine: Arc<ViewEngine>,
    owner_type: String,
    view_name: String,
}

impl ViewHandle {
    pub(crate) fn new(engine: Arc<ViewEngine>, owner_type: &str, view_name: &str) -> Self {
        Self {
            engine,
            owner_type: owner_type.to_string(),
            view_name: view_name.to_string(),
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    pub fn latest(&self) -> DocumentResult<Option<Value>> {
        self.engine.latest(&self.owner_type, &self.view_name)
    }

    pub fn history(&self) -> DocumentResult<ViewHistory> {
        self.engine.history(&self.owner_type, &self.view_name)
    }
}
