//! Queries and lazy result sequences

use std::sync::Arc;

use serde_json::Value;

use crate::index::IndexSpec;
use crate::schema::Schema;
use crate::storage::EntityRecord;

use super::errors::DocumentResult;
use super::instance::Document;

/// Selection over one document type
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Every live document
    All,
    /// Documents whose key on a declared index equals `key`
    Eq { index: IndexSpec, key: Value },
}

impl Query {
    /// Equality on a declared index. Compound keys are an array ordered
    /// like `index`, or an object keyed by field name.
    pub fn eq(index: impl Into<IndexSpec>, key: impl Into<Value>) -> Self {
        Query::Eq {
            index: index.into(),
            key: key.into(),
        }
    }
}

/// Documents in descending sequence order, decoded one at a time.
///
/// Records are fetched eagerly under the connection lock; bodies are
/// decoded as the iterator advances.
#[derive(Debug)]
pub struct Documents {
    schema: Arc<Schema>,
    records: std::vec::IntoIter<EntityRecord>,
}

impl Documents {
    pub(crate) fn new(schema: Arc<Schema>, records: Vec<EntityRecord>) -> Self {
        Self {
            schema,
            records: records.into_iter(),
        }
    }

    pub(crate) fn empty(schema: Arc<Schema>) -> Self {
        Self::new(schema, Vec::new())
    }
}

impl Iterator for Documents {
    type Item = DocumentResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records
            .next()
            .map(|record| Document::from_record(&self.schema, record).map_err(Into::into))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Documents {}
