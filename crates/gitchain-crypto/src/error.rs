//! # Cryptographic Error Types
//!
//! Structured errors for object storage and Merkle operations.

use std::path::PathBuf;

use gitchain_core::{CanonicalizationError, ContentDigest, ValidationError};
use thiserror::Error;

/// Errors from `gitchain-crypto` operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A stored object no longer hashes to the digest in its filename.
    #[error("integrity violation: object at {path} has digest {actual} but filename says {expected}")]
    IntegrityViolation {
        /// Location of the offending object.
        path: PathBuf,
        /// Digest the object is stored under.
        expected: ContentDigest,
        /// Digest recomputed from the stored bytes.
        actual: ContentDigest,
    },

    /// A stored object could not be parsed as JSON.
    #[error("malformed object at {path}: {reason}")]
    MalformedObject {
        /// Location of the offending object.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// Canonicalization of an object failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Input rejected before any work was done.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// I/O error (CAS filesystem operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_violation_display() {
        let err = CryptoError::IntegrityViolation {
            path: PathBuf::from("/tmp/objects/blob/x.json"),
            expected: ContentDigest::ZERO,
            actual: ContentDigest::from_bytes([0xab; 32]),
        };
        let msg = err.to_string();
        assert!(msg.contains("integrity violation"));
        assert!(msg.contains(&"ab".repeat(32)));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = CryptoError::from(io_err);
        assert!(format!("{err}").contains("file missing"));
    }

    #[test]
    fn validation_from_conversion() {
        let err = CryptoError::from(ValidationError::EmptyBatch);
        assert_eq!(err.to_string(), "validation failed: batch is empty");
    }
}
