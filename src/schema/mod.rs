//! Schema subsystem for docsql
//!
//! A schema is the resolved shape of one document type: an ordered field
//! list (name, optional default, required flag) plus the indexes declared
//! over those fields. Values are untyped JSON.
//!
//! # Design Principles
//!
//! - Schemas are plain values, registered explicitly with the database
//! - Structural checks at registration, field checks at save time
//! - Save-time violations abort before any storage mutation
//! - Loads never fail on schema drift: dropped fields are ignored, added
//!   fields take their default

mod errors;
mod types;
mod validator;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult, ValidationDetails};
pub use types::{FieldDef, Schema, INTERNAL_TYPE_PREFIX, RESERVED_FIELD_NAMES};
pub use validator::{apply_defaults, resolve_for_save, resolve_loaded};
