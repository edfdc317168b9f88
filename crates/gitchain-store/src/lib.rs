//! # gitchain-store: Container Version Store
//!
//! Durable, append-only, content-addressed history of containers, scoped
//! per `(type, namespace)`. Every write canonicalizes the payload, stores the
//! snapshot under its content hash, appends a commit whose parent is the
//! current head and advances the head atomically.
//!
//! ```text
//! VersionStore ──(DashMap)──► Repository (one per namespace, Mutex-guarded writes)
//!                                  │
//!                                  └──► ObjectStore: blob / tree / commit
//! ```
//!
//! Reads never lock. A failed write leaves the head where it was and is not
//! retried here.

pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod repository;
pub mod store;

pub use commit::{Commit, Container, TouchedContainer, TreeEntry, WriteReceipt};
pub use config::StoreConfig;
pub use diff::{compute_changes, ChangeKind, DiffChange, DiffResult};
pub use error::StoreError;
pub use repository::{NamespaceMetadata, Repository};
pub use store::{NamespaceInfo, VersionStore};
