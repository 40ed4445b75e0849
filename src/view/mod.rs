//! View Engine subsystem for docsql
//!
//! A view is a named aggregate bound to one document type. Every save or
//! delete of that type recomputes it over the full current snapshot, and
//! each returned value is appended to the view's persisted history.
//!
//! # Design Principles
//!
//! - Full recompute, no incremental state to drift from the documents
//! - Fixed-shape context instead of optional callback arguments
//! - Results are ordinary documents of a reserved type
//!
//! # Invariants
//!
//! - Recompute and result write share the transaction of the triggering
//!   mutation
//! - A `None` result leaves history untouched
//! - History is ordered by insertion, newest first

mod context;
mod engine;

pub use context::{ChangeKind, ViewContext, ViewFn};
pub use engine::{ViewEngine, ViewHandle, ViewHistory, ViewStats, VIEW_RESULT_TYPE};
