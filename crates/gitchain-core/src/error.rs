//! # Error Hierarchy
//!
//! Foundational error types shared by every GitChain crate, built with
//! `thiserror`. Higher layers wrap these with `#[from]`.

use thiserror::Error;

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// The payload could not be represented as JSON or encoded by JCS.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors raised before any I/O.
///
/// Each variant carries the offending input and the expected format so an
/// operator can fix the request without reading the source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Container type is not one of the closed set.
    #[error("invalid container type: \"{0}\" (expected one of product, campaign, project, memory, knowledge)")]
    InvalidContainerType(String),

    /// Namespace does not match `^[a-z0-9][a-z0-9-]{0,63}$`.
    #[error("invalid namespace: \"{0}\" (expected 1-64 chars of a-z, 0-9, '-', not starting with '-')")]
    InvalidNamespace(String),

    /// Identifier does not match `^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$` or contains `..`.
    #[error("invalid identifier: \"{0}\" (expected 1-128 chars of A-Z, a-z, 0-9, '.', '_', '-', starting alphanumeric, without '..')")]
    InvalidIdentifier(String),

    /// Textual container id is malformed.
    #[error("invalid container id: \"{0}\" (expected 0711:<type>:<namespace>:<identifier>:<latest|vN>)")]
    InvalidContainerId(String),

    /// Version component is neither `latest` nor a positive integer.
    #[error("invalid version: \"{0}\" (expected \"latest\", \"vN\" or N with N >= 1)")]
    InvalidVersion(String),

    /// Hex digest is not 32 bytes of hex.
    #[error("invalid digest: \"{0}\" (expected 64 hex characters, optional 0x prefix)")]
    InvalidDigest(String),

    /// A batch must contain at least one item.
    #[error("batch is empty")]
    EmptyBatch,

    /// Batch exceeds the configured maximum; the caller must chunk.
    #[error("batch of {size} items exceeds maximum of {max}")]
    BatchTooLarge {
        /// Number of items submitted.
        size: usize,
        /// Configured maximum batch size.
        max: usize,
    },

    /// A leaf index past the end of the batch.
    #[error("leaf index {index} out of range for batch of {size}")]
    LeafIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of leaves.
        size: usize,
    },
}
