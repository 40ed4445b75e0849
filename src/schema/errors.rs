//! Schema error types
//!
//! Error codes:
//! - DOCSQL_SCHEMA_INVALID (REJECT)
//! - DOCSQL_REQUIRED_FIELD_MISSING (REJECT)
//! - DOCSQL_UNKNOWN_FIELD (REJECT)
//! - DOCSQL_UNDECLARED_INDEX (REJECT)
//! - DOCSQL_MALFORMED_KEY (REJECT)
//! - DOCSQL_TYPE_MISMATCH (REJECT)
//! - DOCSQL_UNKNOWN_DOCUMENT_TYPE (REJECT)
//! - DOCSQL_MALFORMED_DOCUMENT (REJECT)

use std::fmt;

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Schema definition is structurally invalid
    SchemaInvalid,
    /// Required field has no value and no default at save time
    RequiredFieldMissing,
    /// Instance carries a field the schema does not declare
    UnknownField,
    /// Lookup on a field or tuple never declared as an index
    UndeclaredIndex,
    /// Index key value does not fit the index shape
    MalformedKey,
    /// Instance handed to the mapper of another document type
    TypeMismatch,
    /// Document type never registered
    UnknownDocumentType,
    /// Initial values are not a JSON object
    MalformedDocument,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::SchemaInvalid => "DOCSQL_SCHEMA_INVALID",
            SchemaErrorCode::RequiredFieldMissing => "DOCSQL_REQUIRED_FIELD_MISSING",
            SchemaErrorCode::UnknownField => "DOCSQL_UNKNOWN_FIELD",
            SchemaErrorCode::UndeclaredIndex => "DOCSQL_UNDECLARED_INDEX",
            SchemaErrorCode::MalformedKey => "DOCSQL_MALFORMED_KEY",
            SchemaErrorCode::TypeMismatch => "DOCSQL_TYPE_MISMATCH",
            SchemaErrorCode::UnknownDocumentType => "DOCSQL_UNKNOWN_DOCUMENT_TYPE",
            SchemaErrorCode::MalformedDocument => "DOCSQL_MALFORMED_DOCUMENT",
        }
    }

    /// Whether the error is a save-time validation failure, as opposed to
    /// programmer misuse of the schema
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchemaErrorCode::RequiredFieldMissing | SchemaErrorCode::UnknownField
        )
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Validation failure details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetails {
    /// Field name (or comma-joined field tuple)
    pub field: String,
    /// Expected condition
    pub expected: String,
    /// What was found
    pub actual: String,
}

impl ValidationDetails {
    pub fn new(field: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(field, "a value or a default", "missing")
    }

    pub fn extra_field(field: impl Into<String>) -> Self {
        Self::new(field, "no undeclared fields", "extra field present")
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}': expected {}, got {}", self.field, self.expected, self.actual)
    }
}

/// Schema error type with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    doc_type: Option<String>,
    details: Option<ValidationDetails>,
}

impl SchemaError {
    fn new(
        code: SchemaErrorCode,
        doc_type: Option<&str>,
        message: String,
        details: Option<ValidationDetails>,
    ) -> Self {
        Self {
            code,
            message,
            doc_type: doc_type.map(str::to_string),
            details,
        }
    }

    /// Schema definition rejected at registration
    pub fn invalid(doc_type: &str, reason: impl Into<String>) -> Self {
        Self::new(
            SchemaErrorCode::SchemaInvalid,
            Some(doc_type),
            format!("Invalid schema '{}': {}", doc_type, reason.into()),
            None,
        )
    }

    /// Required field unresolved at save time
    pub fn required_field_missing(doc_type: &str, field: &str) -> Self {
        let details = ValidationDetails::missing_field(field);
        Self::new(
            SchemaErrorCode::RequiredFieldMissing,
            Some(doc_type),
            format!("Document validation failed: {}", details),
            Some(details),
        )
    }

    /// Instance carries an undeclared field
    pub fn unknown_field(doc_type: &str, field: &str) -> Self {
        let details = ValidationDetails::extra_field(field);
        Self::new(
            SchemaErrorCode::UnknownField,
            Some(doc_type),
            format!("Document validation failed: {}", details),
            Some(details),
        )
    }

    /// Lookup against fields never declared as an index for `doc_type`
    pub fn undeclared_index(doc_type: &str, fields: &[String]) -> Self {
        Self::new(
            SchemaErrorCode::UndeclaredIndex,
            Some(doc_type),
            format!(
                "'{}' declares no index on [{}]; only indexed fields can be searched",
                doc_type,
                fields.join(", ")
            ),
            None,
        )
    }

    /// Key value does not match the index shape
    pub fn malformed_key(doc_type: &str, fields: &[String], reason: impl Into<String>) -> Self {
        let details = ValidationDetails::new(fields.join(","), "a key matching the index fields", reason);
        Self::new(
            SchemaErrorCode::MalformedKey,
            Some(doc_type),
            format!("Malformed index key: {}", details),
            Some(details),
        )
    }

    /// Instance of `actual` handed to the mapper for `expected`
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::new(
            SchemaErrorCode::TypeMismatch,
            Some(expected),
            format!("Expected a '{}' document, got '{}'", expected, actual),
            None,
        )
    }

    /// Document type never registered
    pub fn unknown_document_type(doc_type: &str) -> Self {
        Self::new(
            SchemaErrorCode::UnknownDocumentType,
            Some(doc_type),
            format!("Document type '{}' is not registered", doc_type),
            None,
        )
    }

    /// Initial values given as something other than an object
    pub fn malformed_document(doc_type: &str, actual: &str) -> Self {
        let details = ValidationDetails::new("*", "a JSON object of field values", actual);
        Self::new(
            SchemaErrorCode::MalformedDocument,
            Some(doc_type),
            format!("Cannot construct '{}': {}", doc_type, details),
            Some(details),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the document type if applicable
    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    /// Returns validation details if applicable
    pub fn details(&self) -> Option<&ValidationDetails> {
        self.details.as_ref()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REJECT] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
