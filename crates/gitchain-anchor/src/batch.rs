//! # Batches
//!
//! A [`Batch`] is a bounded, ordered list of `(container, content hash)`
//! items together with its Merkle tree. Content is frozen at construction:
//! there are no mutators, so every retry of a submission anchors the same
//! root.
//!
//! The off-chain item list published at a batch's `metadata_uri` is a
//! [`BatchManifest`]. Consumers must not trust it blindly;
//! [`BatchManifest::verify`] recomputes the root from the listed items.

use gitchain_core::{ContainerRef, ContentDigest, ValidationError};
use gitchain_crypto::{MerkleProof, MerkleTree};
use serde::{Deserialize, Serialize};

use crate::error::VerificationError;

/// Manifest format tag.
pub const MANIFEST_FORMAT: &str = "gitchain.batch-manifest/v1";

/// One item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// The certified container version.
    pub container: ContainerRef,
    /// Its content hash, which is the Merkle leaf.
    pub content_hash: ContentDigest,
}

impl BatchItem {
    /// Create an item.
    pub fn new(container: ContainerRef, content_hash: ContentDigest) -> Self {
        Self { container, content_hash }
    }
}

/// An immutable batch with its Merkle tree.
#[derive(Debug, Clone)]
pub struct Batch {
    items: Vec<BatchItem>,
    tree: MerkleTree,
    metadata_uri: String,
}

impl Batch {
    /// Build a batch from items in insertion order.
    ///
    /// Fails with `EmptyBatch` or `BatchTooLarge` before hashing anything.
    pub fn new(
        items: Vec<BatchItem>,
        metadata_uri: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, ValidationError> {
        if items.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if items.len() > max_size {
            return Err(ValidationError::BatchTooLarge {
                size: items.len(),
                max: max_size,
            });
        }
        let leaves: Vec<ContentDigest> = items.iter().map(|i| i.content_hash).collect();
        let tree = MerkleTree::build(&leaves)?;
        Ok(Self {
            items,
            tree,
            metadata_uri: metadata_uri.into(),
        })
    }

    /// The Merkle root.
    pub fn merkle_root(&self) -> ContentDigest {
        self.tree.root()
    }

    /// Items in leaf order.
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; empty batches cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Where the manifest is published.
    pub fn metadata_uri(&self) -> &str {
        &self.metadata_uri
    }

    /// The underlying tree.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Proof for the item at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, ValidationError> {
        self.tree.proof(index)
    }

    /// Proofs for every item, indexed like [`Batch::items`].
    pub fn proofs(&self) -> Vec<MerkleProof> {
        self.tree.proofs()
    }

    /// Proof for the first item referring to `container`.
    pub fn proof_for(&self, container: &ContainerRef) -> Option<MerkleProof> {
        let index = self.items.iter().position(|i| &i.container == container)?;
        self.tree.proof(index).ok()
    }

    /// The off-chain manifest for this batch.
    pub fn manifest(&self) -> BatchManifest {
        BatchManifest {
            format: MANIFEST_FORMAT.to_string(),
            merkle_root: self.merkle_root(),
            items: self.items.clone(),
        }
    }
}

/// Accumulates items and builds batches of bounded size.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    max_size: usize,
    items: Vec<BatchItem>,
}

impl BatchBuilder {
    /// A builder that produces batches of at most `max_size` items.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            items: Vec::new(),
        }
    }

    /// Append an item.
    pub fn push(&mut self, container: ContainerRef, content_hash: ContentDigest) -> &mut Self {
        self.items.push(BatchItem::new(container, content_hash));
        self
    }

    /// Append several items.
    pub fn extend(&mut self, items: impl IntoIterator<Item = BatchItem>) -> &mut Self {
        self.items.extend(items);
        self
    }

    /// Items collected so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Build a single batch. Fails if the items do not fit in one.
    pub fn build(self, metadata_uri: impl Into<String>) -> Result<Batch, ValidationError> {
        Batch::new(self.items, metadata_uri, self.max_size)
    }

    /// Split into as many batches as needed, preserving order.
    ///
    /// `metadata_uri` receives the chunk index and that chunk's items.
    pub fn build_chunked<F>(self, mut metadata_uri: F) -> Result<Vec<Batch>, ValidationError>
    where
        F: FnMut(usize, &[BatchItem]) -> String,
    {
        chunk_items(self.items, self.max_size)?
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let uri = metadata_uri(index, &chunk);
                Batch::new(chunk, uri, self.max_size)
            })
            .collect()
    }
}

/// Split `items` into ordered chunks of at most `max_size`.
pub fn chunk_items(items: Vec<BatchItem>, max_size: usize) -> Result<Vec<Vec<BatchItem>>, ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if max_size == 0 {
        return Err(ValidationError::BatchTooLarge {
            size: items.len(),
            max: 0,
        });
    }
    let mut chunks = Vec::with_capacity(items.len().div_ceil(max_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(max_size).collect());
    }
    Ok(chunks)
}

/// The off-chain item list referenced by a batch's `metadata_uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    /// Format tag, [`MANIFEST_FORMAT`].
    pub format: String,
    /// Root the publisher claims for these items.
    pub merkle_root: ContentDigest,
    /// Items in leaf order.
    pub items: Vec<BatchItem>,
}

impl BatchManifest {
    /// Root recomputed from the listed items.
    pub fn computed_root(&self) -> Result<ContentDigest, ValidationError> {
        let leaves: Vec<ContentDigest> = self.items.iter().map(|i| i.content_hash).collect();
        gitchain_crypto::merkle_root(&leaves)
    }

    /// Check the manifest against the root recorded on chain.
    ///
    /// The recomputed root must equal both the declared root and
    /// `expected_root`.
    pub fn verify(&self, expected_root: &ContentDigest) -> Result<(), VerificationError> {
        if self.format != MANIFEST_FORMAT {
            return Err(VerificationError::UnsupportedFormat(self.format.clone()));
        }
        let computed = self.computed_root()?;
        if computed != self.merkle_root {
            return Err(VerificationError::HashMismatch {
                expected: self.merkle_root,
                actual: computed,
            });
        }
        if computed != *expected_root {
            return Err(VerificationError::HashMismatch {
                expected: *expected_root,
                actual: computed,
            });
        }
        Ok(())
    }

    /// Rebuild the batch, e.g. to regenerate proofs from a published
    /// manifest.
    pub fn to_batch(&self, metadata_uri: impl Into<String>) -> Result<Batch, ValidationError> {
        Batch::new(self.items.clone(), metadata_uri, self.items.len().max(1))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use gitchain_core::{ContainerId, VersionSpec};
    use proptest::prelude::*;

    fn items(n: usize) -> Vec<BatchItem> {
        (0..n)
            .map(|i| {
                let id = ContainerId::parse(&format!("0711:knowledge:kb:doc-{i}")).unwrap();
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&(i as u64).to_be_bytes());
                BatchItem::new(id.at(VersionSpec::Exact(1)), ContentDigest::from_bytes(bytes))
            })
            .collect()
    }

    proptest! {
        #[test]
        fn chunking_preserves_order_and_bounds(n in 1usize..120, max in 1usize..30) {
            let all = items(n);
            let chunks = chunk_items(all.clone(), max).unwrap();
            prop_assert_eq!(chunks.len(), n.div_ceil(max));
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= max));
            let flat: Vec<BatchItem> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flat, all);
        }

        #[test]
        fn manifest_rebuilds_same_root(n in 1usize..60) {
            let batch = Batch::new(items(n), "mem://p", n).unwrap();
            let manifest = batch.manifest();
            prop_assert!(manifest.verify(&batch.merkle_root()).is_ok());
            let rebuilt = manifest.to_batch("mem://p").unwrap();
            prop_assert_eq!(rebuilt.merkle_root(), batch.merkle_root());
            prop_assert_eq!(rebuilt.proofs(), batch.proofs());
        }
    }
}
