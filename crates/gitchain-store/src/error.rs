//! # Version Store Errors
//!
//! `Storage`, `HeadMoved` and `Io` mean the write was not applied: the head
//! pointer did not advance. The store never retries internally; whether to
//! retry is the caller's decision.

use gitchain_core::{CanonicalizationError, ContentDigest, NamespaceKey, ValidationError};
use gitchain_crypto::CryptoError;
use thiserror::Error;

/// Errors from the version store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Persistent state is unreadable or inconsistent.
    #[error("storage error: {0}")]
    Storage(String),

    /// Another writer advanced the head between staging and commit.
    #[error("head of {namespace} moved during write: expected {expected}, found {found}")]
    HeadMoved {
        /// Namespace being written.
        namespace: NamespaceKey,
        /// Head observed when the write started (`none` for empty).
        expected: String,
        /// Head found just before the rename.
        found: String,
    },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested container, commit or version does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes no longer hash to their recorded digest.
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch {
        /// Digest the content is recorded under.
        expected: ContentDigest,
        /// Digest recomputed from the content.
        actual: ContentDigest,
    },

    /// Input rejected before any I/O.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Payload could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::IntegrityViolation {
                expected, actual, ..
            } => Self::HashMismatch { expected, actual },
            CryptoError::Io(e) => Self::Io(e),
            CryptoError::Validation(e) => Self::Validation(e),
            CryptoError::Canonicalization(e) => Self::Canonicalization(e),
            other @ CryptoError::MalformedObject { .. } => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_violation_becomes_hash_mismatch() {
        let err = StoreError::from(CryptoError::IntegrityViolation {
            path: "/x".into(),
            expected: ContentDigest::ZERO,
            actual: ContentDigest::from_bytes([1; 32]),
        });
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[test]
    fn malformed_object_becomes_storage() {
        let err = StoreError::from(CryptoError::MalformedObject {
            path: "/x".into(),
            reason: "eof".into(),
        });
        assert!(matches!(err, StoreError::Storage(ref m) if m.contains("eof")));
    }
}
