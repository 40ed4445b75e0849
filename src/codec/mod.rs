//! Serialization codec for docsql
//!
//! Pure functions, no state. Two encodings:
//!
//! ```text
//! body blob:   +--------+--------------+----------------------+
//!              | format | crc32 (u32LE)| JSON field map       |
//!              +--------+--------------+----------------------+
//!
//! index key:   canonical JSON bytes (no framing)
//! ```
//!
//! The body checksum covers the JSON payload only. Index keys are compared
//! by byte equality inside the backing store, so they carry no framing and
//! must be produced by [`encode_index_key`] on both the write and the lookup
//! path.
//!
//! # Invariants
//!
//! - Field maps serialize with keys in sorted order
//! - Integral floats canonicalize to integers inside index keys
//! - Every decode verifies the format byte and the checksum

mod checksum;
mod errors;

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{CodecError, CodecResult};

/// Field name to value mapping stored in an entity body
pub type FieldMap = BTreeMap<String, Value>;

/// Current body blob format
pub const BODY_FORMAT_V1: u8 = 1;

const HEADER_LEN: usize = 1 + 4;

/// Encode a field map into a framed, checksummed body blob.
pub fn encode_body(fields: &FieldMap) -> CodecResult<Vec<u8>> {
    let payload = serde_json::to_vec(fields).map_err(CodecError::Encode)?;
    let checksum = compute_checksum(&payload);

    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.push(BODY_FORMAT_V1);
    blob.extend_from_slice(&checksum.to_le_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Decode a body blob, verifying its checksum.
pub fn decode_body(blob: &[u8]) -> CodecResult<FieldMap> {
    if blob.len() < HEADER_LEN {
        return Err(CodecError::Truncated(blob.len()));
    }
    if blob[0] != BODY_FORMAT_V1 {
        return Err(CodecError::UnknownFormat(blob[0]));
    }

    let stored = u32::from_le_bytes([blob[1], blob[2], blob[3], blob[4]]);
    let payload = &blob[HEADER_LEN..];
    if !verify_checksum(payload, stored) {
        return Err(CodecError::ChecksumMismatch {
            stored,
            computed: compute_checksum(payload),
        });
    }

    match serde_json::from_slice::<Value>(payload).map_err(CodecError::Decode)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(CodecError::NotAFieldMap),
    }
}

/// Normalize a value so that logically equal keys share one representation.
///
/// Integral floats become integers, recursively through arrays and objects.
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            // Bounds are exact powers of two, so the cast below cannot saturate
            Some(f) if f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        Value::Object(map) => {
            let normalized: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonical_value(v)))
                .collect();
            Value::Object(normalized)
        }
        _ => value.clone(),
    }
}

/// Serialize an already-ordered index key to its stored byte form.
pub fn encode_index_key(key: &Value) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(&canonical_value(key)).map_err(CodecError::Encode)
}
