//! What a view callback sees

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

/// Mutation that triggered a recompute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input to one view recompute.
///
/// `documents` is the full set of live documents of the owner type after
/// the mutation, newest insertion first.
#[derive(Debug)]
pub struct ViewContext<'a> {
    pub owner_type: &'a str,
    pub view_name: &'a str,
    pub documents: &'a [Document],
    /// Latest persisted result of this view, if any
    pub previous: Option<&'a Value>,
    pub change: ChangeKind,
    /// The document whose save or delete caused this recompute
    pub trigger: &'a Document,
}

impl ViewContext<'_> {
    /// Values of `field` across the snapshot, skipping documents where it
    /// is unset or null
    pub fn values<'s>(&'s self, field: &'s str) -> impl Iterator<Item = &'s Value> + 's {
        let documents: &'s [Document] = self.documents;
        documents
            .iter()
            .filter_map(move |doc| doc.get(field))
            .filter(|value| !value.is_null())
    }
}

/// A view callback. Returning `None` leaves the history untouched.
///
/// Callbacks run while the write transaction holds the connection. Calls
/// back into the database from a callback fail with
/// `DOCSQL_REENTRANT_ACCESS`; the context carries everything a view needs.
/// A panicking callback rolls the whole write back.
pub type ViewFn = Arc<dyn Fn(&ViewContext<'_>) -> Option<Value> + Send + Sync>;
