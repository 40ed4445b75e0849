//! Document subsystem for docsql
//!
//! Schema-bound document instances and the mapper that persists them.
//!
//! # Design Principles
//!
//! - A document is new exactly when it carries no id; that one check picks
//!   insert or update for the entity and for every index row
//! - Entity, index and view writes of one operation commit together
//! - Reads see committed state only
//!
//! # Invariants
//!
//! - `id` and `sequence` never change once assigned
//! - Result sequences are ordered by descending `sequence`
//! - A failed save or delete leaves the instance unchanged

mod errors;
mod instance;
mod mapper;
mod query;

pub use errors::{DocumentError, DocumentResult};
pub use instance::Document;
pub use mapper::DocumentMapper;
pub use query::{Documents, Query};

pub(crate) use mapper::Persisted;
