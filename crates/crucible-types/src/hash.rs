use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::TypeError;

/// Content-addressed identifier for a stored blob.
///
/// A `BlobHash` is the SHA-256 of the blob's bytes. The canonical textual
/// form is 64 lowercase hex characters; identical content always produces
/// the same hash, making blobs deduplicatable and verifiable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHash([u8; 32]);

impl BlobHash {
    /// Compute the hash of raw bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&digest);
        Self(raw)
    }

    /// Wrap a pre-computed digest.
    pub const fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical 64-char lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    ///
    /// Mixed-case input is accepted and normalized; the canonical form
    /// produced by [`to_hex`](Self::to_hex) is always lowercase. Anything
    /// that is not exactly 64 hex characters is rejected.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != 64 {
            return Err(TypeError::InvalidLength {
                expected: 64,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&bytes);
        Ok(Self(raw))
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({})", self.short_hex())
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Hashes cross the wire and the database as hex strings, so serde uses the
// canonical textual form rather than a byte array.
impl Serialize for BlobHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_is_deterministic() {
        let h1 = BlobHash::of(b"hello world");
        let h2 = BlobHash::of(b"hello world");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_data_produces_different_hashes() {
        assert_ne!(BlobHash::of(b"hello"), BlobHash::of(b"world"));
    }

    #[test]
    fn known_digest_of_empty_input() {
        // SHA-256 of the empty string is a fixed constant.
        assert_eq!(
            BlobHash::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hex_roundtrip() {
        let h = BlobHash::of(b"roundtrip");
        assert_eq!(BlobHash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn from_hex_normalizes_uppercase() {
        let h = BlobHash::of(b"case");
        let upper = h.to_hex().to_uppercase();
        let parsed = BlobHash::from_hex(&upper).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(parsed.to_hex(), h.to_hex());
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = BlobHash::from_hex("abcd").unwrap_err();
        assert!(matches!(err, TypeError::InvalidLength { actual: 4, .. }));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let s = "z".repeat(64);
        assert!(matches!(
            BlobHash::from_hex(&s).unwrap_err(),
            TypeError::InvalidHex(_)
        ));
    }

    #[test]
    fn display_is_full_lowercase_hex() {
        let h = BlobHash::of(b"display");
        let s = format!("{h}");
        assert_eq!(s.len(), 64);
        assert_eq!(s, s.to_lowercase());
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(BlobHash::of(b"x").short_hex().len(), 8);
    }

    #[test]
    fn serde_uses_hex_string() {
        let h = BlobHash::of(b"serde");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let parsed: BlobHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, h);
    }
}
