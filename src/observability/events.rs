//! Observable events for docsql
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events in docsql
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Backing store opened and system tables ensured
    DatabaseOpen,
    /// Document type registered
    SchemaRegistered,
    /// Index side table ensured
    IndexDeclared,

    // Document writes
    /// New entity record inserted
    DocumentInserted,
    /// Existing entity record rewritten
    DocumentUpdated,
    /// Entity record removed
    DocumentDeleted,
    /// Missing index row inserted during an update
    IndexRowBackfilled,
    /// Transaction rolled back after a failure
    WriteRollback,
    /// Update/delete targeted an id absent from the entity table
    ConsistencyFault,
    /// Connection lock taken back after a panic on the write path
    LockRecovered,

    // Views
    /// View callback registered
    ViewRegistered,
    /// View recomputed and a new result appended
    ViewRecomputed,
    /// View recomputed but returned no result
    ViewSkipped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::DatabaseOpen => "DATABASE_OPEN",
            Event::SchemaRegistered => "SCHEMA_REGISTERED",
            Event::IndexDeclared => "INDEX_DECLARED",

            Event::DocumentInserted => "DOCUMENT_INSERTED",
            Event::DocumentUpdated => "DOCUMENT_UPDATED",
            Event::DocumentDeleted => "DOCUMENT_DELETED",
            Event::IndexRowBackfilled => "INDEX_ROW_BACKFILLED",
            Event::WriteRollback => "WRITE_ROLLBACK",
            Event::ConsistencyFault => "CONSISTENCY_FAULT",
            Event::LockRecovered => "LOCK_RECOVERED",

            Event::ViewRegistered => "VIEW_REGISTERED",
            Event::ViewRecomputed => "VIEW_RECOMPUTED",
            Event::ViewSkipped => "VIEW_SKIPPED",
        }
    }

    /// Returns true if this event indicates a broken invariant
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ConsistencyFault)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
