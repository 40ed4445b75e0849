//! Index Manager subsystem for docsql
//!
//! Equality indexes over one field or a field tuple, persisted as side
//! tables next to the entity table and maintained in the same transaction
//! as the entity write they describe.
//!
//! # Design Principles
//!
//! - Keys are canonical bytes: equal logical keys always compare equal
//! - Only declared indexes can be searched
//! - Lookups return ids; the entity store resolves them to documents
//!
//! # Invariants
//!
//! - Exactly one row per live entity per declared index
//! - Rows of deleted entities are pruned with the entity

mod errors;
mod manager;
mod spec;

pub use errors::{IndexError, IndexResult};
pub use manager::IndexManager;
pub use spec::IndexSpec;
