//! # Commit and Tree Objects
//!
//! A namespace's history is a linear chain of commit objects. Each commit
//! names the tree (the full `{identifier: entry}` map after the commit), its
//! parent, and the containers it touched with the version each reached.
//!
//! Both objects are stored in canonical form; their digests are the tree hash
//! and the commit hash.

use std::collections::BTreeMap;

use gitchain_core::{ContainerId, ContentDigest, Identifier, Timestamp};
use serde::{Deserialize, Serialize};

/// One container's state in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Content hash of the container data (also the blob digest).
    pub content_hash: ContentDigest,
    /// Version the container is at in this tree.
    pub version: u64,
}

/// Full state of a namespace at one commit.
pub type Tree = BTreeMap<Identifier, TreeEntry>;

/// A container version introduced by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchedContainer {
    /// Identifier written.
    pub identifier: Identifier,
    /// Version it reached.
    pub version: u64,
    /// Content hash of the written data.
    pub content_hash: ContentDigest,
}

/// The stored commit object, hashed to produce the commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    /// Previous head; `None` for the first commit.
    pub parent: Option<ContentDigest>,
    /// Tree hash after this commit.
    pub tree: ContentDigest,
    /// Author name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// Commit time, whole seconds UTC.
    pub timestamp: Timestamp,
    /// Commit message.
    pub message: String,
    /// Containers written by this commit.
    pub touched: Vec<TouchedContainer>,
}

/// A commit as returned by history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Commit hash.
    pub hash: ContentDigest,
    /// Parent commit hash.
    pub parent_hash: Option<ContentDigest>,
    /// Author name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// Commit time.
    pub timestamp: Timestamp,
    /// Commit message.
    pub message: String,
    /// Tree hash.
    pub tree: ContentDigest,
    /// Containers written by this commit.
    pub touched: Vec<TouchedContainer>,
}

impl Commit {
    pub(crate) fn from_object(hash: ContentDigest, object: CommitObject) -> Self {
        Self {
            hash,
            parent_hash: object.parent,
            author: object.author,
            email: object.email,
            timestamp: object.timestamp,
            message: object.message,
            tree: object.tree,
            touched: object.touched,
        }
    }

    /// The entry for `identifier` if this commit wrote it.
    pub fn touched_entry(&self, identifier: &Identifier) -> Option<&TouchedContainer> {
        self.touched.iter().find(|t| &t.identifier == identifier)
    }
}

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// The new commit.
    pub commit_hash: ContentDigest,
    /// Content hash of the written data.
    pub content_hash: ContentDigest,
    /// Version the container reached.
    pub version: u64,
}

/// A container at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Identity.
    pub id: ContainerId,
    /// Version, starting at 1.
    pub version: u64,
    /// Payload.
    pub data: serde_json::Value,
    /// Content hash of `data`, recomputed on read.
    pub content_hash: ContentDigest,
    /// Commit that introduced this version.
    pub commit_hash: ContentDigest,
}
