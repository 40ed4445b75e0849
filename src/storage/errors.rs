//! Storage error types
//!
//! Error codes:
//! - DOCSQL_STORAGE_FAILED (ERROR severity)
//! - DOCSQL_CONSISTENCY_FAULT (FATAL severity)
//! - DOCSQL_DATA_CORRUPTION (FATAL severity)
//! - DOCSQL_LOCK_POISONED (FATAL severity)
//! - DOCSQL_REENTRANT_ACCESS (ERROR severity)

use std::fmt;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the store stays usable
    Error,
    /// An invariant is broken; the caller must not continue blindly
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Backing engine rejected a statement or a commit
    StorageFailed,
    /// Update/delete targeted an id absent from the entity table
    ConsistencyFault,
    /// Stored bytes failed format or checksum validation
    DataCorruption,
    /// Registry lock poisoned by a panicking thread
    LockPoisoned,
    /// The thread holding the write transaction asked for the connection
    /// again (a view callback calling back into the database)
    ReentrantAccess,
}

impl StorageErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::StorageFailed => "DOCSQL_STORAGE_FAILED",
            StorageErrorCode::ConsistencyFault => "DOCSQL_CONSISTENCY_FAULT",
            StorageErrorCode::DataCorruption => "DOCSQL_DATA_CORRUPTION",
            StorageErrorCode::LockPoisoned => "DOCSQL_LOCK_POISONED",
            StorageErrorCode::ReentrantAccess => "DOCSQL_REENTRANT_ACCESS",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::StorageFailed => Severity::Error,
            StorageErrorCode::ConsistencyFault => Severity::Fatal,
            StorageErrorCode::DataCorruption => Severity::Fatal,
            StorageErrorCode::LockPoisoned => Severity::Fatal,
            StorageErrorCode::ReentrantAccess => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error type with full context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<rusqlite::Error>,
}

impl StorageError {
    /// The backing engine rejected `operation`
    pub fn storage_failed(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        Self {
            code: StorageErrorCode::StorageFailed,
            message: operation.into(),
            details: None,
            source: Some(source),
        }
    }

    /// An update or delete found no row for `id`
    pub fn consistency_fault(id: &str, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::ConsistencyFault,
            message: reason.into(),
            details: Some(format!("id: {}", id)),
            source: None,
        }
    }

    /// Stored data for `id` could not be decoded
    pub fn corruption_for_document(id: &str, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::DataCorruption,
            message: reason.into(),
            details: Some(format!("id: {}", id)),
            source: None,
        }
    }

    /// A registry lock was poisoned
    pub fn lock_poisoned(operation: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::LockPoisoned,
            message: format!("lock poisoned during {}", operation.into()),
            details: None,
            source: None,
        }
    }

    /// `operation` was attempted from inside the running write transaction
    pub fn reentrant_access(operation: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::ReentrantAccess,
            message: format!("{} requested while this thread holds the write transaction", operation.into()),
            details: None,
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error signals a broken invariant
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Attach an operation label to a `rusqlite` failure
pub(crate) trait SqlContext<T> {
    fn sql_context(self, operation: &str) -> StorageResult<T>;
}

impl<T> SqlContext<T> for Result<T, rusqlite::Error> {
    fn sql_context(self, operation: &str) -> StorageResult<T> {
        self.map_err(|e| StorageError::storage_failed(operation, e))
    }
}
