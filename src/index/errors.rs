//! Index error types
//!
//! An index operation fails for one of three reasons: the request does not
//! fit the declared indexes, the key cannot be serialized, or the side
//! table rejected the statement. Each keeps the code of the subsystem it
//! came from.

use thiserror::Error;

use crate::codec::CodecError;
use crate::schema::{SchemaError, SchemaErrorCode};
use crate::storage::StorageError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Undeclared index or malformed key
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("[FATAL] DOCSQL_CODEC: {0}")]
    Codec(#[from] CodecError),
}

impl IndexError {
    pub fn schema_code(&self) -> Option<SchemaErrorCode> {
        match self {
            IndexError::Schema(e) => Some(e.code()),
            _ => None,
        }
    }
}
