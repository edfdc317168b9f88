//! # Anchoring Error Types
//!
//! [`LedgerError`] describes what went wrong talking to the chain and knows
//! whether it is worth retrying. [`AnchorError`] is what a submission
//! reports after the retry policy has run. [`RegistryError`] and
//! [`VerificationError`] cover the read path.

use gitchain_core::{ContentDigest, ValidationError};
use gitchain_store::StoreError;
use thiserror::Error;

/// Errors at the ledger boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The RPC call did not complete in time.
    #[error("ledger call timed out: {0}")]
    Timeout(String),

    /// Connection-level failure.
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// The sender's nonce was already used.
    #[error("nonce conflict: {0}")]
    NonceConflict(String),

    /// The node rejected the gas price as too low.
    #[error("transaction underpriced: {0}")]
    Underpriced(String),

    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// The reverted transaction.
        tx_hash: String,
    },

    /// The transaction disappeared from the mempool.
    #[error("transaction {tx_hash} dropped")]
    Dropped {
        /// The dropped transaction.
        tx_hash: String,
    },

    /// JSON-RPC error object not classified above.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response could not be interpreted.
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),

    /// The ledger client is misconfigured.
    #[error("ledger configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Transport(_)
                | Self::NonceConflict(_)
                | Self::Underpriced(_)
                | Self::Reverted { .. }
                | Self::Dropped { .. }
        )
    }
}

/// Errors from anchor submission.
#[derive(Error, Debug)]
pub enum AnchorError {
    /// The batch was rejected before any chain I/O.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The current fee estimate is above the configured ceiling; nothing was
    /// sent.
    #[error("gas price {current_wei} wei exceeds ceiling of {ceiling_wei} wei")]
    GasPriceExceeded {
        /// Fee estimate read from the chain.
        current_wei: u64,
        /// Configured ceiling.
        ceiling_wei: u64,
    },

    /// Every attempt of the retry cycle failed.
    #[error("anchoring failed after {attempts} attempts: {last_error}")]
    AnchorFailed {
        /// Attempts made in this cycle.
        attempts: u32,
        /// The error of the final attempt.
        last_error: String,
    },

    /// A non-transient ledger error ended the cycle early.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The journal file could not be read.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

/// Errors from the certification registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The lookup failed at the ledger.
    #[error("registry lookup failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Errors from verification calls that go beyond a boolean answer.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// Recomputed content does not hash to what was claimed.
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch {
        /// Hash that was expected.
        expected: ContentDigest,
        /// Hash that was computed.
        actual: ContentDigest,
    },

    /// The batch id is not known to the registry.
    #[error("batch {0} is not certified")]
    UnknownBatch(u64),

    /// The version store could not produce the content.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The registry could not be read.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The manifest declares a format this version does not read.
    #[error("unsupported manifest format {0:?}")]
    UnsupportedFormat(String),

    /// The manifest is malformed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors reading or writing an anchor journal.
#[derive(Error, Debug)]
pub enum JournalError {
    /// Filesystem failure.
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The journal is not valid JSON for this format.
    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Written by an incompatible version.
    #[error("unsupported journal version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version in the file.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },

    /// The journal was written for a different chain or contract.
    #[error("journal belongs to ledger {journal}, not {ledger}")]
    LedgerMismatch {
        /// Ledger recorded in the journal.
        journal: String,
        /// Ledger it was loaded against.
        ledger: String,
    },
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },

    /// A URL could not be parsed.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),

    /// A required setting is missing.
    #[error("{0} is required")]
    Missing(String),

    /// Settings are individually valid but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
