//! # Repository: One Namespace's History
//!
//! A [`Repository`] owns the on-disk history of one `(type, namespace)`:
//!
//! ```text
//! {root}/namespace.json                 namespace metadata
//! {root}/HEAD                           hex commit hash (absent when empty)
//! {root}/objects/{blob,tree,commit}/…   content-addressed objects
//! ```
//!
//! ## Concurrency
//!
//! Writes are serialized by a `parking_lot::Mutex` owned by the repository
//! handle; the [`VersionStore`](crate::VersionStore) hands out one handle per
//! namespace. Reads take no lock: `HEAD` is replaced with write-to-temp plus
//! `rename`, so a reader sees either the old or the new head, and every
//! object a head points at was written before the head moved.
//!
//! ## Failure
//!
//! Objects are staged before the head moves. Any failure up to and including
//! the rename leaves `HEAD` untouched; staged objects are unreachable garbage
//! and harmless. Before the rename the writer re-reads `HEAD`; a writer
//! outside this process that moved it causes [`StoreError::HeadMoved`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use gitchain_core::{
    content_hash, CanonicalBytes, ContainerId, ContainerType, ContentDigest, Identifier,
    NamespaceKey, Timestamp, VersionSpec,
};
use gitchain_crypto::{ObjectKind, ObjectStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commit::{Commit, CommitObject, Container, TouchedContainer, Tree, TreeEntry, WriteReceipt};
use crate::config::StoreConfig;
use crate::diff::{compute_changes, DiffResult};
use crate::error::StoreError;

/// On-disk layout revision written to `namespace.json`.
pub const LAYOUT_VERSION: u32 = 1;

const HEAD_FILE: &str = "HEAD";
const METADATA_FILE: &str = "namespace.json";

static HEAD_TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Contents of `namespace.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    /// Container type.
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    /// Namespace name.
    pub namespace: gitchain_core::Namespace,
    /// When the namespace was first created.
    pub created_at: Timestamp,
    /// On-disk layout revision.
    pub layout_version: u32,
}

/// Handle to one namespace's version history.
#[derive(Debug)]
pub struct Repository {
    key: NamespaceKey,
    root: PathBuf,
    objects: ObjectStore,
    author_name: String,
    author_email: String,
    write_lock: Mutex<()>,
}

impl Repository {
    /// Open the repository for `key` under the configured base directory.
    ///
    /// Nothing is created on disk until the first write or
    /// [`ensure_metadata()`](Self::ensure_metadata).
    pub fn open(config: &StoreConfig, key: NamespaceKey) -> Self {
        let root = config
            .base_dir
            .join(key.container_type.as_str())
            .join(key.namespace.as_str());
        Self {
            objects: ObjectStore::new(root.join("objects")),
            root,
            key,
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            write_lock: Mutex::new(()),
        }
    }

    /// The namespace this repository holds.
    pub fn key(&self) -> &NamespaceKey {
        &self.key
    }

    /// Directory holding this namespace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_id(&self, identifier: &Identifier) -> ContainerId {
        ContainerId::new(
            self.key.container_type,
            self.key.namespace.clone(),
            identifier.clone(),
        )
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Read `namespace.json`, if the namespace has been created.
    pub fn metadata(&self) -> Result<Option<NamespaceMetadata>, StoreError> {
        let path = self.root.join(METADATA_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                StoreError::Storage(format!("unreadable {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create `namespace.json` if it does not exist and return its contents.
    pub fn ensure_metadata(&self) -> Result<NamespaceMetadata, StoreError> {
        if let Some(existing) = self.metadata()? {
            return Ok(existing);
        }
        fs::create_dir_all(&self.root)?;
        let metadata = NamespaceMetadata {
            container_type: self.key.container_type,
            namespace: self.key.namespace.clone(),
            created_at: Timestamp::now(),
            layout_version: LAYOUT_VERSION,
        };
        let bytes = CanonicalBytes::new(&metadata)?;
        let path = self.root.join(METADATA_FILE);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                f.write_all(bytes.as_bytes())?;
                tracing::info!(namespace = %self.key, "created namespace");
                Ok(metadata)
            }
            // Lost a creation race; the winner's metadata stands.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => self
                .metadata()?
                .ok_or_else(|| StoreError::Storage(format!("{} vanished", path.display()))),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Head
    // -----------------------------------------------------------------------

    /// Current head commit hash, `None` for an empty namespace.
    pub fn head(&self) -> Result<Option<ContentDigest>, StoreError> {
        let path = self.root.join(HEAD_FILE);
        match fs::read_to_string(&path) {
            Ok(s) => ContentDigest::from_hex(s.trim())
                .map(Some)
                .map_err(|e| StoreError::Storage(format!("corrupt {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace `HEAD` with `new`, provided it still equals `expected`.
    fn advance_head(
        &self,
        expected: Option<ContentDigest>,
        new: &ContentDigest,
    ) -> Result<(), StoreError> {
        let tmp = self.root.join(format!(
            "{HEAD_FILE}.{}.{}.tmp",
            std::process::id(),
            HEAD_TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let result = self.write_and_swap_head(&tmp, expected, new);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn write_and_swap_head(
        &self,
        tmp: &Path,
        expected: Option<ContentDigest>,
        new: &ContentDigest,
    ) -> Result<(), StoreError> {
        let mut f = fs::OpenOptions::new().write(true).create_new(true).open(tmp)?;
        f.write_all(new.to_hex().as_bytes())?;
        f.sync_all()?;
        drop(f);

        let found = self.head()?;
        if found != expected {
            return Err(StoreError::HeadMoved {
                namespace: self.key.clone(),
                expected: describe_head(expected),
                found: describe_head(found),
            });
        }
        fs::rename(tmp, self.root.join(HEAD_FILE))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Object access
    // -----------------------------------------------------------------------

    fn load_commit(&self, hash: &ContentDigest) -> Result<Commit, StoreError> {
        let object: CommitObject = self
            .objects
            .get_json(ObjectKind::Commit, hash)?
            .ok_or_else(|| StoreError::NotFound(format!("commit {hash} in {}", self.key)))?;
        Ok(Commit::from_object(*hash, object))
    }

    fn load_tree(&self, hash: &ContentDigest) -> Result<Tree, StoreError> {
        self.objects
            .get_json(ObjectKind::Tree, hash)?
            .ok_or_else(|| StoreError::Storage(format!("tree {hash} missing in {}", self.key)))
    }

    fn load_blob(&self, hash: &ContentDigest) -> Result<Value, StoreError> {
        self.objects
            .get_json(ObjectKind::Blob, hash)?
            .ok_or_else(|| StoreError::Storage(format!("blob {hash} missing in {}", self.key)))
    }

    fn head_tree(&self) -> Result<(Option<ContentDigest>, Tree), StoreError> {
        match self.head()? {
            Some(head) => {
                let commit = self.load_commit(&head)?;
                Ok((Some(head), self.load_tree(&commit.tree)?))
            }
            None => Ok((None, Tree::new())),
        }
    }

    fn tree_at(&self, commit: &ContentDigest) -> Result<Tree, StoreError> {
        let commit = self.load_commit(commit)?;
        self.load_tree(&commit.tree)
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Commit a new version of `identifier`.
    ///
    /// Stages the snapshot, the new tree and the commit object, then advances
    /// `HEAD`. Serialized against other writers to this namespace.
    pub fn write(
        &self,
        identifier: &Identifier,
        data: &Value,
        message: &str,
    ) -> Result<WriteReceipt, StoreError> {
        let canonical = CanonicalBytes::new(data)?;

        let _guard = self.write_lock.lock();
        self.ensure_metadata()?;

        let content_hash = self.objects.put_canonical(ObjectKind::Blob, &canonical)?;

        let (parent, mut tree) = self.head_tree()?;
        let version = tree.get(identifier).map_or(1, |e| e.version + 1);
        tree.insert(
            identifier.clone(),
            TreeEntry {
                content_hash,
                version,
            },
        );
        let tree_hash = self.objects.put(ObjectKind::Tree, &tree)?;

        let object = CommitObject {
            parent,
            tree: tree_hash,
            author: self.author_name.clone(),
            email: self.author_email.clone(),
            timestamp: Timestamp::now(),
            message: message.to_string(),
            touched: vec![TouchedContainer {
                identifier: identifier.clone(),
                version,
                content_hash,
            }],
        };
        let commit_hash = self.objects.put(ObjectKind::Commit, &object)?;

        self.advance_head(parent, &commit_hash)?;

        tracing::info!(
            namespace = %self.key,
            identifier = %identifier,
            version,
            commit = %commit_hash,
            content_hash = %content_hash,
            "committed container version"
        );

        Ok(WriteReceipt {
            commit_hash,
            content_hash,
            version,
        })
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Latest data of `identifier`.
    pub fn read(&self, identifier: &Identifier) -> Result<Value, StoreError> {
        let (_, tree) = self.head_tree()?;
        let entry = tree
            .get(identifier)
            .ok_or_else(|| self.not_found(identifier))?;
        self.load_blob(&entry.content_hash)
    }

    /// Latest version of `identifier` as a full record.
    pub fn read_container(&self, identifier: &Identifier) -> Result<Container, StoreError> {
        let (head, tree) = self.head_tree()?;
        let entry = *tree
            .get(identifier)
            .ok_or_else(|| self.not_found(identifier))?;
        let commit = self
            .find_commit(head, identifier, entry.version)?
            .ok_or_else(|| StoreError::Storage(format!("no commit for {identifier} v{}", entry.version)))?;
        self.container_from(identifier, entry, commit.hash)
    }

    /// `identifier` as of version `version`.
    pub fn read_version(&self, identifier: &Identifier, version: u64) -> Result<Container, StoreError> {
        let commit = self
            .find_commit(self.head()?, identifier, version)?
            .ok_or_else(|| StoreError::NotFound(format!("{} v{version}", self.container_id(identifier))))?;
        let entry = commit
            .touched_entry(identifier)
            .map(|t| TreeEntry {
                content_hash: t.content_hash,
                version: t.version,
            })
            .ok_or_else(|| StoreError::Storage(format!("commit {} lost its entry", commit.hash)))?;
        self.container_from(identifier, entry, commit.hash)
    }

    /// Resolve a `latest` / `vN` reference.
    pub fn read_spec(&self, identifier: &Identifier, spec: VersionSpec) -> Result<Container, StoreError> {
        match spec {
            VersionSpec::Latest => self.read_container(identifier),
            VersionSpec::Exact(n) => self.read_version(identifier, n),
        }
    }

    fn container_from(
        &self,
        identifier: &Identifier,
        entry: TreeEntry,
        commit_hash: ContentDigest,
    ) -> Result<Container, StoreError> {
        let data = self.load_blob(&entry.content_hash)?;
        let recomputed = content_hash(&data)?;
        if recomputed != entry.content_hash {
            return Err(StoreError::HashMismatch {
                expected: entry.content_hash,
                actual: recomputed,
            });
        }
        Ok(Container {
            id: self.container_id(identifier),
            version: entry.version,
            data,
            content_hash: recomputed,
            commit_hash,
        })
    }

    fn find_commit(
        &self,
        from: Option<ContentDigest>,
        identifier: &Identifier,
        version: u64,
    ) -> Result<Option<Commit>, StoreError> {
        let mut cursor = from;
        while let Some(hash) = cursor {
            let commit = self.load_commit(&hash)?;
            match commit.touched_entry(identifier).map(|t| t.version) {
                Some(v) if v == version => return Ok(Some(commit)),
                // Versions only decrease walking back.
                Some(v) if v < version => return Ok(None),
                _ => {}
            }
            cursor = commit.parent_hash;
        }
        Ok(None)
    }

    /// Data of `identifier` in the tree of `commit`.
    pub fn read_at_commit(&self, identifier: &Identifier, commit: &ContentDigest) -> Result<Value, StoreError> {
        let tree = self.tree_at(commit)?;
        let entry = tree
            .get(identifier)
            .ok_or_else(|| StoreError::NotFound(format!("{} at commit {commit}", self.container_id(identifier))))?;
        self.load_blob(&entry.content_hash)
    }

    /// Recompute the content hash of `identifier` as of `commit`.
    pub fn content_hash_at(&self, identifier: &Identifier, commit: &ContentDigest) -> Result<ContentDigest, StoreError> {
        let data = self.read_at_commit(identifier, commit)?;
        Ok(content_hash(&data)?)
    }

    /// Commits that wrote `identifier`, newest first, at most `limit`.
    pub fn history(&self, identifier: &Identifier, limit: Option<usize>) -> Result<Vec<Commit>, StoreError> {
        self.walk(limit, |c| c.touched_entry(identifier).is_some())
    }

    /// Every commit in the namespace, newest first, at most `limit`.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<Commit>, StoreError> {
        self.walk(limit, |_| true)
    }

    fn walk(&self, limit: Option<usize>, keep: impl Fn(&Commit) -> bool) -> Result<Vec<Commit>, StoreError> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        let mut cursor = self.head()?;
        while let Some(hash) = cursor {
            if out.len() >= limit {
                break;
            }
            let commit = self.load_commit(&hash)?;
            cursor = commit.parent_hash;
            if keep(&commit) {
                out.push(commit);
            }
        }
        Ok(out)
    }

    /// Identifiers present at head, sorted.
    pub fn list_containers(&self) -> Result<Vec<Identifier>, StoreError> {
        let (_, tree) = self.head_tree()?;
        Ok(tree.into_keys().collect())
    }

    /// Number of containers at head.
    pub fn container_count(&self) -> Result<usize, StoreError> {
        Ok(self.head_tree()?.1.len())
    }

    /// Structural diff of `identifier` between two commits.
    pub fn diff(
        &self,
        identifier: &Identifier,
        from_commit: &ContentDigest,
        to_commit: &ContentDigest,
    ) -> Result<DiffResult, StoreError> {
        let from_tree = self.tree_at(from_commit)?;
        let to_tree = self.tree_at(to_commit)?;
        let from_entry = from_tree.get(identifier);
        let to_entry = to_tree.get(identifier);
        if from_entry.is_none() && to_entry.is_none() {
            return Err(self.not_found(identifier));
        }

        let from_data = from_entry.map(|e| self.load_blob(&e.content_hash)).transpose()?;
        let to_data = to_entry.map(|e| self.load_blob(&e.content_hash)).transpose()?;

        Ok(DiffResult {
            container_id: self.container_id(identifier),
            from_version: from_entry.map_or(0, |e| e.version),
            to_version: to_entry.map_or(0, |e| e.version),
            changes: compute_changes(from_data.as_ref(), to_data.as_ref()),
        })
    }

    fn not_found(&self, identifier: &Identifier) -> StoreError {
        StoreError::NotFound(self.container_id(identifier).to_string())
    }
}

fn describe_head(head: Option<ContentDigest>) -> String {
    head.map_or_else(|| "none".to_string(), |h| h.to_hex())
}
