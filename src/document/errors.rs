//! Document-level errors
//!
//! What the mapper, view engine and database return. Wraps the subsystem
//! errors and adds the conditions that only make sense for whole documents.

use thiserror::Error;

use crate::codec::CodecError;
use crate::index::IndexError;
use crate::schema::{SchemaError, SchemaErrorCode};
use crate::storage::{StorageError, StorageErrorCode};

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
    /// A single-result lookup matched nothing
    #[error("[REJECT] DOCSQL_NOT_FOUND: no '{doc_type}' document matches")]
    NotFound { doc_type: String },

    /// Delete of an instance that was never saved
    #[error("[REJECT] DOCSQL_NOT_SAVED: '{doc_type}' document has no id")]
    NotSaved { doc_type: String },

    /// A view with the same owner and name is already registered
    #[error("[REJECT] DOCSQL_DUPLICATE_VIEW: view '{view_name}' already registered on '{owner_type}'")]
    DuplicateView {
        owner_type: String,
        view_name: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("[FATAL] DOCSQL_CODEC: {0}")]
    Codec(#[from] CodecError),
}

impl From<IndexError> for DocumentError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Schema(e) => DocumentError::Schema(e),
            IndexError::Storage(e) => DocumentError::Storage(e),
            IndexError::Codec(e) => DocumentError::Codec(e),
        }
    }
}

impl DocumentError {
    pub(crate) fn not_found(doc_type: &str) -> Self {
        DocumentError::NotFound {
            doc_type: doc_type.to_string(),
        }
    }

    /// Not-found condition raised for `doc_type` specifically
    pub fn is_not_found_for(&self, doc_type: &str) -> bool {
        matches!(self, DocumentError::NotFound { doc_type: t } if t == doc_type)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::NotFound { .. })
    }

    /// Save rejected by field rules (required, unknown field)
    pub fn is_validation(&self) -> bool {
        matches!(self, DocumentError::Schema(e) if e.code().is_validation())
    }

    /// Programmer error against the declared schema: undeclared index,
    /// malformed key, wrong document type, bad definition, duplicate view
    pub fn is_schema_misuse(&self) -> bool {
        match self {
            DocumentError::Schema(e) => !e.code().is_validation(),
            DocumentError::DuplicateView { .. } | DocumentError::NotSaved { .. } => true,
            _ => false,
        }
    }

    /// The backing engine or the stored bytes failed
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, DocumentError::Storage(_) | DocumentError::Codec(_))
    }

    /// Update or delete of an id that should exist but does not
    pub fn is_consistency_fault(&self) -> bool {
        matches!(
            self,
            DocumentError::Storage(e) if e.code() == StorageErrorCode::ConsistencyFault
        )
    }

    pub fn schema_code(&self) -> Option<SchemaErrorCode> {
        match self {
            DocumentError::Schema(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Stable string code
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::NotFound { .. } => "DOCSQL_NOT_FOUND",
            DocumentError::NotSaved { .. } => "DOCSQL_NOT_SAVED",
            DocumentError::DuplicateView { .. } => "DOCSQL_DUPLICATE_VIEW",
            DocumentError::Schema(e) => e.code().code(),
            DocumentError::Storage(e) => e.code().code(),
            DocumentError::Codec(_) => "DOCSQL_CODEC",
        }
    }
}
