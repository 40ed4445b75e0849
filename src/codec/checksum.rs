//! Body checksums
//!
//! CRC32 (IEEE) over the JSON payload of a body blob. The frame header is
//! not covered; the format byte is checked on its own.

use crc32fast::Hasher;

/// CRC32 of a body payload
pub fn compute_checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Whether `payload` still hashes to the checksum stored in its frame
pub fn verify_checksum(payload: &[u8], stored: u32) -> bool {
    compute_checksum(payload) == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_changes_checksum() {
        let a = compute_checksum(br#"{"name":"Alien","year":1979}"#);
        let b = compute_checksum(br#"{"year":1979,"name":"Alien"}"#);
        assert_ne!(a, b);
    }

    #[test]
    fn test_single_bit_flip_fails_verification() {
        let mut payload = br#"{"price":3}"#.to_vec();
        let stored = compute_checksum(&payload);
        assert!(verify_checksum(&payload, stored));

        payload[9] ^= 0x01;
        assert!(!verify_checksum(&payload, stored));
    }
}
