#![deny(missing_docs)]

//! # gitchain-core: Foundational Types for GitChain
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies: only `serde`, `serde_json`, `serde_jcs`, `thiserror`,
//! `chrono`, and `sha2` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **[`CanonicalBytes`] is the sole path to content hashing.** A container
//!    payload is hashed only after RFC 8785 canonicalization, so two payloads
//!    that differ only in key order or number formatting share one
//!    [`ContentDigest`].
//!
//! 2. **Newtype identifiers.** [`Namespace`] and [`Identifier`] validate their
//!    format at construction; a [`ContainerId`] can only be assembled from
//!    validated parts and is therefore always safe to use as a storage path.
//!
//! 3. **UTC-only time.** [`Timestamp`] is second-precision UTC so commit
//!    objects canonicalize deterministically.
//!
//! 4. **Structured errors.** [`ValidationError`] and [`CanonicalizationError`]
//!    are `thiserror` enums; nothing here panics on bad input.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{content_hash, sha256_digest, sha256_raw, ContentDigest};
pub use error::{CanonicalizationError, ValidationError};
pub use identity::{
    ContainerId, ContainerRef, ContainerType, Identifier, Namespace, NamespaceKey, VersionSpec,
    CONTAINER_ID_PREFIX,
};
pub use temporal::Timestamp;
