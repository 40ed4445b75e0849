//! docsql - schema-flexible documents over SQLite
//!
//! Documents of registered types are stored as checksummed JSON bodies in
//! one entity table, searchable through declared equality indexes, with
//! views recomputed and persisted on every write.

pub mod codec;
pub mod config;
pub mod database;
pub mod document;
pub mod index;
pub mod observability;
pub mod schema;
pub mod storage;
pub mod view;

pub use config::{JournalMode, StoreConfig};
pub use database::Database;
pub use document::{Document, DocumentError, DocumentMapper, DocumentResult, Documents, Query};
pub use index::IndexSpec;
pub use schema::{FieldDef, Schema};
pub use view::{ChangeKind, ViewContext, ViewHandle};
