//! # Content Digest: Content-Addressed Identifiers
//!
//! Defines `ContentDigest`, the 32-byte SHA-256 value that names every
//! snapshot, tree and commit in the version store and every leaf and node of
//! a Merkle batch.
//!
//! ## Security Invariant
//!
//! Content hashes of container data are computed only from `CanonicalBytes`
//! via [`sha256_digest()`]. [`sha256_raw()`] exists for Merkle interior nodes,
//! which hash the concatenation of two digests rather than a JSON document.
//!
//! Digests serialize as bare lowercase hex (64 characters). Parsing accepts an
//! optional `0x` prefix and either case, because that is how EVM tooling
//! prints `bytes32`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::{CanonicalizationError, ValidationError};

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Length of the digest in bytes.
    pub const LEN: usize = 32;

    /// The all-zero digest. The certification contract returns it for
    /// batch ids it has never seen.
    pub const ZERO: ContentDigest = ContentDigest([0u8; 32]);

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        if trimmed.len() != 64 {
            return Err(ValidationError::InvalidDigest(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in trimmed.as_bytes().chunks(2).enumerate() {
            let hi = hex_nibble(chunk[0]).ok_or_else(|| ValidationError::InvalidDigest(s.to_string()))?;
            let lo = hex_nibble(chunk[1]).ok_or_else(|| ValidationError::InvalidDigest(s.to_string()))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Render the digest as lowercase hex without a prefix.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Render the digest as `0x`-prefixed hex, the form used on the wire to
    /// the certification contract.
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Returns true for the all-zero digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for ContentDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the SHA-256 digest of canonical bytes.
///
/// Accepts only `&CanonicalBytes`, so every content hash in the system is
/// computed over the RFC 8785 encoding.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    sha256_raw(data.as_bytes())
}

/// SHA-256 over arbitrary bytes.
///
/// Reserved for structural hashing (Merkle nodes). Container payloads go
/// through [`content_hash()`] instead.
pub fn sha256_raw(data: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest(bytes)
}

/// Canonicalize a payload and hash it.
///
/// This is the content hash of a container version: reproducible bit-for-bit
/// by any implementation of RFC 8785 + SHA-256.
pub fn content_hash(data: &impl Serialize) -> Result<ContentDigest, CanonicalizationError> {
    let canonical = CanonicalBytes::new(data)?;
    Ok(sha256_digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sha256_vector() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        // Well-known SHA-256 of the two bytes `{}`.
        assert_eq!(
            sha256_digest(&cb).to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_empty_input_vector() {
        assert_eq!(
            sha256_raw(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":{"c":3,"d":2},"b":1}"#).unwrap();
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn test_different_inputs_different_digests() {
        let h1 = content_hash(&serde_json::json!({"a": 1})).unwrap();
        let h2 = content_hash(&serde_json::json!({"a": 2})).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hex_roundtrip_and_prefix() {
        let d = sha256_raw(b"gitchain");
        let hex = d.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(ContentDigest::from_hex(&hex).unwrap(), d);
        assert_eq!(ContentDigest::from_hex(&d.to_prefixed_hex()).unwrap(), d);
        assert_eq!(ContentDigest::from_hex(&hex.to_uppercase()).unwrap(), d);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ContentDigest::from_hex("").is_err());
        assert!(ContentDigest::from_hex("abcd").is_err());
        assert!(ContentDigest::from_hex(&"g".repeat(64)).is_err());
        assert!(ContentDigest::from_hex(&"0".repeat(66)).is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let d = sha256_raw(b"x");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_zero_digest() {
        assert!(ContentDigest::ZERO.is_zero());
        assert!(!sha256_raw(b"").is_zero());
    }
}
