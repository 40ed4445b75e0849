//! Database handle
//!
//! Wires one store to the schemas registered on it and to the view engine.
//! Document types are registered explicitly at startup; registration
//! declares their index tables before any instance is saved.
//!
//! ```ignore
//! let db = Database::open(StoreConfig::at("movies.db"))?;
//! let movies = db.register(
//!     Schema::new("movie")
//!         .field(FieldDef::required("name"))
//!         .field(FieldDef::optional("year"))
//!         .index("name"),
//! )?;
//!
//! let mut doc = movies.construct(json!({"name": "Alien", "year": 1979}))?;
//! movies.save(&mut doc)?;
//! let found = movies.find_one(Query::eq("name", "Alien"))?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::config::StoreConfig;
use crate::document::{DocumentError, DocumentMapper, DocumentResult};
use crate::index::IndexManager;
use crate::observability::{log_event_with_fields, Event, MetricsSnapshot};
use crate::schema::{Schema, SchemaError, INTERNAL_TYPE_PREFIX};
use crate::storage::{StorageError, Store};
use crate::view::{ViewContext, ViewEngine, ViewHandle};

/// Top-level handle: one store, its registered types and views
#[derive(Debug)]
pub struct Database {
    store: Arc<Store>,
    views: Arc<ViewEngine>,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl Database {
    /// Open the store described by `config`
    pub fn open(config: StoreConfig) -> DocumentResult<Self> {
        let store = Arc::new(Store::open(config)?);
        let views = Arc::new(ViewEngine::new(Arc::clone(&store))?);
        Ok(Self {
            store,
            views,
            schemas: RwLock::new(HashMap::new()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> DocumentResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Register a document type and declare its indexes.
    ///
    /// Registering a type again replaces its schema for mappers obtained
    /// afterwards; stored documents are read under whichever schema the
    /// mapper carries.
    pub fn register(&self, schema: Schema) -> DocumentResult<DocumentMapper> {
        schema.validate_structure(false)?;

        self.store.write(|tx| {
            let index = IndexManager::new(tx);
            for spec in &schema.indexes {
                index.declare(&schema.doc_type, spec)?;
            }
            Ok::<_, DocumentError>(())
        })?;

        let schema = Arc::new(schema);
        self.schemas
            .write()
            .map_err(|_| StorageError::lock_poisoned("register schema"))?
            .insert(schema.doc_type.clone(), Arc::clone(&schema));

        log_event_with_fields(
            Event::SchemaRegistered,
            &[
                ("type", &schema.doc_type),
                ("fields", &schema.fields.len().to_string()),
                ("indexes", &schema.indexes.len().to_string()),
            ],
        );
        Ok(self.bind(schema))
    }

    /// Mapper for a registered type
    pub fn mapper(&self, doc_type: &str) -> DocumentResult<DocumentMapper> {
        Ok(self.bind(self.schema(doc_type)?))
    }

    pub fn schema(&self, doc_type: &str) -> DocumentResult<Arc<Schema>> {
        self.schemas
            .read()
            .map_err(|_| StorageError::lock_poisoned("read schemas"))?
            .get(doc_type)
            .cloned()
            .ok_or_else(|| SchemaError::unknown_document_type(doc_type).into())
    }

    /// Registered type names, sorted
    pub fn document_types(&self) -> DocumentResult<Vec<String>> {
        let mut types: Vec<String> = self
            .schemas
            .read()
            .map_err(|_| StorageError::lock_poisoned("read schemas"))?
            .keys()
            .cloned()
            .collect();
        types.sort();
        Ok(types)
    }

    /// Bind a view to a registered type. Views run in registration order
    /// on every save and delete of that type.
    pub fn register_view<F>(
        &self,
        owner_type: &str,
        view_name: &str,
        callback: F,
    ) -> DocumentResult<ViewHandle>
    where
        F: Fn(&ViewContext<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        if owner_type.starts_with(INTERNAL_TYPE_PREFIX) {
            return Err(
                SchemaError::invalid(owner_type, "views cannot be bound to internal types").into(),
            );
        }
        self.schema(owner_type)?;

        self.views.register(owner_type, view_name, Arc::new(callback))?;
        Ok(self.view(owner_type, view_name))
    }

    /// Handle on the persisted results of a view. Results written before
    /// a reopen stay readable whether or not the view is registered again.
    pub fn view(&self, owner_type: &str, view_name: &str) -> ViewHandle {
        ViewHandle::new(Arc::clone(&self.views), owner_type, view_name)
    }

    pub fn views(&self) -> &ViewEngine {
        &self.views
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        self.store.config()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.store.metrics().snapshot()
    }

    fn bind(&self, schema: Arc<Schema>) -> DocumentMapper {
        DocumentMapper::new(Arc::clone(&self.store), schema, Some(Arc::clone(&self.views)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, SchemaErrorCode};
    use serde_json::json;

    fn movie() -> Schema {
        Schema::new("movie")
            .field(FieldDef::required("name"))
            .field(FieldDef::optional("year"))
            .index("name")
    }

    #[test]
    fn test_register_and_lookup_mapper() {
        let db = Database::open_in_memory().unwrap();
        db.register(movie()).unwrap();

        let mapper = db.mapper("movie").unwrap();
        assert_eq!(mapper.doc_type(), "movie");
        assert_eq!(db.document_types().unwrap(), vec!["movie"]);
    }

    #[test]
    fn test_unknown_type() {
        let db = Database::open_in_memory().unwrap();
        let err = db.mapper("movie").unwrap_err();
        assert_eq!(err.schema_code(), Some(SchemaErrorCode::UnknownDocumentType));
    }

    #[test]
    fn test_reserved_type_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .register(Schema::new("__view_result").field(FieldDef::optional("value")))
            .unwrap_err();
        assert_eq!(err.schema_code(), Some(SchemaErrorCode::SchemaInvalid));
    }

    #[test]
    fn test_register_view_requires_owner() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .register_view("movie", "count", |ctx| Some(json!(ctx.documents.len())))
            .unwrap_err();
        assert_eq!(err.schema_code(), Some(SchemaErrorCode::UnknownDocumentType));

        let err = db
            .register_view("__view_result", "count", |_| None)
            .unwrap_err();
        assert_eq!(err.schema_code(), Some(SchemaErrorCode::SchemaInvalid));
    }

    #[test]
    fn test_view_runs_on_save() {
        let db = Database::open_in_memory().unwrap();
        let movies = db.register(movie()).unwrap();
        let count = db
            .register_view("movie", "count", |ctx| Some(json!(ctx.documents.len())))
            .unwrap();

        let mut doc = movies.construct(json!({"name": "Alien"})).unwrap();
        movies.save(&mut doc).unwrap();

        assert_eq!(count.latest().unwrap(), Some(json!(1)));
        let metrics = db.metrics();
        assert_eq!(metrics.views_recomputed, 1);
        assert_eq!(metrics.view_results_persisted, 1);
    }
}
