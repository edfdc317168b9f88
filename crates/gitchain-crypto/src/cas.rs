//! # Content-Addressed Storage (CAS)
//!
//! Filesystem storage for the version store's objects. Every object is the
//! RFC 8785 encoding of a JSON value, stored at
//! `{base_dir}/{kind}/{digest}.json` where `digest` is the SHA-256 of those
//! bytes.
//!
//! ## Integrity Invariant
//!
//! Every stored object's filename encodes its content digest. On retrieval
//! the bytes are re-canonicalized, the digest recomputed and compared against
//! the filename in constant time. Corruption or tampering is detected at read
//! time as [`CryptoError::IntegrityViolation`].
//!
//! ## Write Semantics
//!
//! Writes are create-if-absent. Bytes go to a uniquely named temporary file
//! in the target directory and are then renamed into place, so a reader never
//! observes a half-written object. Writing an object that already exists is a
//! no-op: identical digest means identical content.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use gitchain_core::{sha256_digest, CanonicalBytes, ContentDigest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// The kinds of object a namespace stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Canonical snapshot of a container's data. Digest = content hash.
    Blob,
    /// Canonical `{identifier: content_hash}` map for one commit.
    Tree,
    /// Canonical commit object. Digest = commit hash.
    Commit,
}

impl ObjectKind {
    /// Directory name under the object root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// A content-addressed object store backed by the filesystem.
///
/// Cheap to clone; holds only its root path. Safe to share between threads:
/// concurrent writers of the same object race only on an idempotent rename.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    base_dir: PathBuf,
}

impl ObjectStore {
    /// Create a store rooted at the given directory.
    ///
    /// The directory does not need to exist yet; it is created on the first
    /// write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Return the base directory path.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Filesystem path of an object.
    pub fn path_of(&self, kind: ObjectKind, digest: &ContentDigest) -> PathBuf {
        self.base_dir
            .join(kind.as_str())
            .join(format!("{}.json", digest.to_hex()))
    }

    /// Canonicalize a value, store it, and return its digest.
    pub fn put(&self, kind: ObjectKind, data: &impl Serialize) -> Result<ContentDigest, CryptoError> {
        let canonical = CanonicalBytes::new(data)?;
        self.put_canonical(kind, &canonical)
    }

    /// Store already-canonical bytes and return their digest.
    pub fn put_canonical(
        &self,
        kind: ObjectKind,
        canonical: &CanonicalBytes,
    ) -> Result<ContentDigest, CryptoError> {
        let digest = sha256_digest(canonical);
        let path = self.path_of(kind, &digest);
        if path.exists() {
            return Ok(digest);
        }

        let dir = self.base_dir.join(kind.as_str());
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            digest.to_hex(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let written = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .and_then(|mut f| {
                f.write_all(canonical.as_bytes())?;
                f.sync_all()
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(kind = %kind, digest = %digest, bytes = canonical.len(), "stored object");
        Ok(digest)
    }

    /// Read an object's bytes after verifying them against the digest.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    pub fn get(&self, kind: ObjectKind, digest: &ContentDigest) -> Result<Option<Vec<u8>>, CryptoError> {
        let path = self.path_of(kind, digest);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let recanon = CanonicalBytes::from_json_slice(&bytes).map_err(|e| CryptoError::MalformedObject {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let recomputed = sha256_digest(&recanon);
        if !bool::from(recomputed.as_bytes().ct_eq(digest.as_bytes())) {
            tracing::warn!(path = %path.display(), expected = %digest, actual = %recomputed, "object failed integrity check");
            return Err(CryptoError::IntegrityViolation {
                path,
                expected: *digest,
                actual: recomputed,
            });
        }

        Ok(Some(bytes))
    }

    /// Read and deserialize a verified object.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        kind: ObjectKind,
        digest: &ContentDigest,
    ) -> Result<Option<T>, CryptoError> {
        let Some(bytes) = self.get(kind, digest)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| CryptoError::MalformedObject {
            path: self.path_of(kind, digest),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Check whether an object exists, without verifying it.
    pub fn contains(&self, kind: ObjectKind, digest: &ContentDigest) -> bool {
        self.path_of(kind, digest).exists()
    }

    /// List all digests stored for a kind, sorted.
    ///
    /// Files whose stem is not a 64-char hex digest (including in-flight
    /// temporaries) are skipped.
    pub fn list(&self, kind: ObjectKind) -> Result<Vec<ContentDigest>, CryptoError> {
        let dir = self.base_dir.join(kind.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut digests = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(d) = ContentDigest::from_hex(stem) {
                    digests.push(d);
                }
            }
        }
        digests.sort();
        Ok(digests)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
