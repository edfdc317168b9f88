//! # Canonical Serialization: RFC 8785 Byte Production
//!
//! This module defines `CanonicalBytes`, the sole construction path for bytes
//! used in content hashing across GitChain.
//!
//! ## Security Invariant
//!
//! The `CanonicalBytes` newtype has a private inner field. The only ways to
//! construct it are [`CanonicalBytes::new()`] and
//! [`CanonicalBytes::from_value()`], both of which run the JSON
//! Canonicalization Scheme (RFC 8785) via `serde_jcs`:
//!
//! 1. **Sorted keys**: object members ordered by UTF-16 code unit at every
//!    nesting level.
//! 2. **Fixed number formatting**: ECMAScript shortest round-trip form, so
//!    `1`, `1.0` and `1e0` all serialize as `1`.
//! 3. **Fixed string escaping**: only the mandatory JSON escapes; non-ASCII
//!    is emitted as raw UTF-8.
//! 4. **No insignificant whitespace.**
//!
//! Any function that hashes container content accepts `&CanonicalBytes`, so
//! hashing a non-canonical encoding is a type error rather than a silent
//! proof-breaking bug.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by RFC 8785 canonicalization.
///
/// # Invariants
///
/// - Object keys are sorted at every nesting level.
/// - Separators are compact (`,` and `:`), no whitespace.
/// - Numbers use the ECMAScript shortest round-trip representation.
/// - Output is valid UTF-8 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::SerializationFailed` if the value cannot
    /// be represented as JSON (e.g. a map with non-string keys).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Construct canonical bytes from an already-parsed JSON value tree.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        let bytes = serde_jcs::to_vec(&value)?;
        Ok(Self(bytes))
    }

    /// Parse arbitrary JSON text and canonicalize it.
    ///
    /// Used when re-verifying stored snapshots: the stored text is parsed back
    /// into a value tree and re-encoded, so a byte-level tamper that keeps the
    /// JSON valid still changes the digest.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, CanonicalizationError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the wrapper, returning the canonical byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
