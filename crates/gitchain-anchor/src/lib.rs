//! # gitchain-anchor: Batch Certification
//!
//! Takes many container versions, folds their content hashes into one
//! Merkle root, gets that root recorded on a certification contract exactly
//! once, and later answers whether a given piece of content was part of an
//! anchored batch.
//!
//! ```text
//! BatchBuilder ──► Batch (root + proofs) ──► AnchorSubmitter ──► CertificationLedger
//!                        │                        │                 ├─ InMemoryLedger
//!                        ▼                        ▼                 └─ EvmLedger (feature "evm")
//!                  BatchManifest            AnchorJournal
//!
//! CertificationRegistry ──► ProofVerifier ──► VerificationReport
//! ```
//!
//! ## Crate Policy
//!
//! - The ledger boundary is the sealed [`CertificationLedger`] trait. Only
//!   the in-memory ledger and the EVM JSON-RPC ledger implement it.
//! - Anchoring is idempotent per Merkle root; see [`submitter`].
//! - Proof verification is pure and never touches the network; the chain is
//!   consulted only to learn which root a batch id stands for.

pub mod abi;
pub mod batch;
pub mod config;
pub mod error;
#[cfg(feature = "evm")]
pub mod evm;
pub mod journal;
pub mod ledger;
pub mod record;
pub mod registry;
pub mod submitter;
pub mod verifier;

pub use batch::{chunk_items, Batch, BatchBuilder, BatchItem, BatchManifest, MANIFEST_FORMAT};
pub use config::{AnchorConfig, EvmLedgerConfig};
pub use error::{AnchorError, ConfigError, JournalError, LedgerError, RegistryError, VerificationError};
#[cfg(feature = "evm")]
pub use evm::EvmLedger;
pub use journal::{AnchorJournal, JournalFile, JOURNAL_VERSION};
pub use ledger::{
    Certification, CertificationLedger, CertifyRequest, Fault, InMemoryLedger, TxHash, TxStatus,
};
pub use record::{AnchorResult, AnchorTransaction, AttemptStatus, BatchRecord, BatchState};
pub use registry::CertificationRegistry;
pub use submitter::{AnchorSubmitter, BatchOutcome, CertificationReport, ReconcileSummary};
pub use verifier::{verify, verify_version, ProofVerifier, VerificationReport};
