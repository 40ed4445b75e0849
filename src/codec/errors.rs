//! # Codec Errors

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode body payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Body blob truncated: {0} bytes")]
    Truncated(usize),

    #[error("Unknown body format version: {0}")]
    UnknownFormat(u8),

    #[error("Body checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Body payload is not a field map")]
    NotAFieldMap,
}

impl CodecError {
    /// Whether the blob on disk is damaged, as opposed to a value that
    /// could not be encoded in the first place
    pub fn is_corruption(&self) -> bool {
        !matches!(self, CodecError::Encode(_))
    }
}
