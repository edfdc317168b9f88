//! # gitchain-crypto: Object Storage and Merkle Proofs
//!
//! This crate provides the cryptographic building blocks used by the version
//! store and the anchoring pipeline:
//!
//! - **Content-Addressed Storage (CAS)** for blob, tree and commit objects,
//!   named by the SHA-256 of their canonical encoding and re-verified on every
//!   read.
//! - **Merkle batch trees** that fold many content hashes into one 32-byte
//!   root, with per-leaf inclusion proofs.
//! - **Proof verification**, a pure function usable without any store or
//!   chain connection.

pub mod cas;
pub mod error;
pub mod merkle;

// Re-export primary types.
pub use cas::{ObjectKind, ObjectStore};
pub use error::CryptoError;
pub use merkle::{merkle_root, node_hash, verify_proof, MerkleProof, MerkleTree, Position, ProofStep};
