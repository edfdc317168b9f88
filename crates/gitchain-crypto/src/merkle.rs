//! # Merkle Batch Tree
//!
//! Folds an ordered list of content hashes into one 32-byte root that is
//! anchored on-chain, and produces an inclusion proof for every leaf.
//!
//! ## Algorithm
//!
//! - Leaf: the 32-byte content hash itself. No prefix, no re-hash.
//! - Node: `SHA256(left || right)` over the raw digest bytes.
//! - A level with an odd number of nodes pairs its last node with itself.
//! - Leaves keep insertion order; they are never sorted.
//!
//! A single-leaf tree therefore has `root == leaf` and an empty proof, and
//! `[A, B, C]` has root `H(H(A||B) || H(C||C))`.
//!
//! ## Proofs
//!
//! A proof lists one sibling per level from the leaves up, each tagged with
//! the side the sibling sits on. [`verify_proof()`] is pure: it needs only
//! the root, the leaf and the proof.

use gitchain_core::{sha256_raw, ContentDigest, ValidationError};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Parent hash: `SHA256(left || right)`.
pub fn node_hash(left: &ContentDigest, right: &ContentDigest) -> ContentDigest {
    let mut input = [0u8; 64];
    input[..32].copy_from_slice(left.as_bytes());
    input[32..].copy_from_slice(right.as_bytes());
    sha256_raw(&input)
}

fn next_level(level: &[ContentDigest]) -> Vec<ContentDigest> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            node_hash(left, pair.get(1).unwrap_or(left))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Proof types
// ---------------------------------------------------------------------------

/// Which side of the running hash a sibling is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Sibling is the left operand: `H(sibling || current)`.
    Left,
    /// Sibling is the right operand: `H(current || sibling)`.
    Right,
}

/// One level of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling hash at this level.
    pub sibling: ContentDigest,
    /// Side the sibling sits on.
    pub position: Position,
}

/// Inclusion proof for one leaf of a [`MerkleTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The leaf the proof is for.
    pub leaf: ContentDigest,
    /// Index of the leaf in insertion order.
    pub leaf_index: usize,
    /// Siblings from the leaf level up to, not including, the root.
    pub siblings: Vec<ProofStep>,
}

impl MerkleProof {
    /// Fold the proof from its own leaf, returning the root it implies.
    pub fn compute_root(&self) -> ContentDigest {
        fold(&self.leaf, &self.siblings)
    }

    /// Shorthand for [`verify_proof(root, leaf, self)`](verify_proof).
    pub fn verify(&self, root: &ContentDigest, leaf: &ContentDigest) -> bool {
        verify_proof(root, leaf, self)
    }
}

fn fold(leaf: &ContentDigest, steps: &[ProofStep]) -> ContentDigest {
    steps.iter().fold(*leaf, |current, step| match step.position {
        Position::Left => node_hash(&step.sibling, &current),
        Position::Right => node_hash(&current, &step.sibling),
    })
}

/// Verify that `leaf` is included under `root`.
///
/// Returns `false` (never an error) when the proof is for a different leaf
/// or does not fold to `root`. The final comparison is constant-time.
pub fn verify_proof(root: &ContentDigest, leaf: &ContentDigest, proof: &MerkleProof) -> bool {
    if proof.leaf != *leaf {
        return false;
    }
    let computed = fold(leaf, &proof.siblings);
    bool::from(computed.as_bytes().ct_eq(root.as_bytes()))
}

// ---------------------------------------------------------------------------
// MerkleTree
// ---------------------------------------------------------------------------

/// A fully materialized Merkle tree over a non-empty leaf list.
///
/// `levels[0]` holds the leaves, the last level holds the root alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<ContentDigest>>,
}

impl MerkleTree {
    /// Build the tree. Leaves are taken in the given order.
    ///
    /// # Errors
    ///
    /// `ValidationError::EmptyBatch` if `leaves` is empty.
    pub fn build(leaves: &[ContentDigest]) -> Result<Self, ValidationError> {
        if leaves.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        let mut levels = vec![leaves.to_vec()];
        while levels.last().map_or(false, |l| l.len() > 1) {
            let next = next_level(&levels[levels.len() - 1]);
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// The root hash.
    pub fn root(&self) -> ContentDigest {
        // `build` guarantees at least one non-empty level.
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(ContentDigest::ZERO)
    }

    /// The leaves in insertion order.
    pub fn leaves(&self) -> &[ContentDigest] {
        &self.levels[0]
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    /// Always false; an empty tree cannot be built.
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Number of levels above the leaves, i.e. the proof length.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, ValidationError> {
        let size = self.len();
        if index >= size {
            return Err(ValidationError::LeafIndexOutOfRange { index, size });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut pos = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if pos % 2 == 1 {
                ProofStep {
                    sibling: level[pos - 1],
                    position: Position::Left,
                }
            } else {
                // Odd level: the last node is its own sibling.
                let sibling = level.get(pos + 1).copied().unwrap_or(level[pos]);
                ProofStep {
                    sibling,
                    position: Position::Right,
                }
            };
            siblings.push(step);
            pos /= 2;
        }

        Ok(MerkleProof {
            leaf: self.levels[0][index],
            leaf_index: index,
            siblings,
        })
    }

    /// Proofs for every leaf, in leaf order.
    pub fn proofs(&self) -> Vec<MerkleProof> {
        (0..self.len())
            .filter_map(|i| self.proof(i).ok())
            .collect()
    }
}

/// Root of a leaf list without keeping the tree around.
pub fn merkle_root(leaves: &[ContentDigest]) -> Result<ContentDigest, ValidationError> {
    if leaves.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    Ok(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchain_core::content_hash;

    fn leaf(tag: &str) -> ContentDigest {
        content_hash(&serde_json::json!({ "item": tag })).unwrap()
    }

    #[test]
    fn empty_batch_rejected() {
        assert_eq!(MerkleTree::build(&[]), Err(ValidationError::EmptyBatch));
        assert_eq!(merkle_root(&[]), Err(ValidationError::EmptyBatch));
    }

    #[test]
    fn single_leaf_root_is_leaf() {
        let a = leaf("a");
        let tree = MerkleTree::build(&[a]).unwrap();
        assert_eq!(tree.root(), a);
        assert_eq!(tree.depth(), 0);
        let proof = tree.proof(0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(verify_proof(&a, &a, &proof));
    }

    #[test]
    fn two_leaves() {
        let (a, b) = (leaf("a"), leaf("b"));
        let tree = MerkleTree::build(&[a, b]).unwrap();
        assert_eq!(tree.root(), node_hash(&a, &b));

        let p0 = tree.proof(0).unwrap();
        assert_eq!(p0.siblings, vec![ProofStep { sibling: b, position: Position::Right }]);
        let p1 = tree.proof(1).unwrap();
        assert_eq!(p1.siblings, vec![ProofStep { sibling: a, position: Position::Left }]);
    }

    #[test]
    fn three_leaves_pairs_last_with_itself() {
        let (a, b, c) = (leaf("a"), leaf("b"), leaf("c"));
        let tree = MerkleTree::build(&[a, b, c]).unwrap();
        let expected = node_hash(&node_hash(&a, &b), &node_hash(&c, &c));
        assert_eq!(tree.root(), expected);

        let p2 = tree.proof(2).unwrap();
        assert_eq!(p2.siblings[0], ProofStep { sibling: c, position: Position::Right });
        assert_eq!(
            p2.siblings[1],
            ProofStep { sibling: node_hash(&a, &b), position: Position::Left }
        );
        assert!(verify_proof(&expected, &c, &p2));
    }

    #[test]
    fn insertion_order_matters() {
        let (a, b) = (leaf("a"), leaf("b"));
        let ab = MerkleTree::build(&[a, b]).unwrap().root();
        let ba = MerkleTree::build(&[b, a]).unwrap().root();
        assert_ne!(ab, ba);
    }

    #[test]
    fn proof_for_other_leaf_fails() {
        let (a, b) = (leaf("a"), leaf("b"));
        let tree = MerkleTree::build(&[a, b]).unwrap();
        let root = tree.root();
        assert!(verify_proof(&root, &a, &tree.proof(0).unwrap()));
        assert!(!verify_proof(&root, &a, &tree.proof(1).unwrap()));
    }

    #[test]
    fn tampered_sibling_fails() {
        let leaves: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|t| leaf(t)).collect();
        let tree = MerkleTree::build(&leaves).unwrap();
        let root = tree.root();
        let mut proof = tree.proof(3).unwrap();
        assert!(verify_proof(&root, &leaves[3], &proof));

        let mut bytes = *proof.siblings[1].sibling.as_bytes();
        bytes[0] ^= 0x01;
        proof.siblings[1].sibling = ContentDigest::from_bytes(bytes);
        assert!(!verify_proof(&root, &leaves[3], &proof));
    }

    #[test]
    fn flipped_position_fails() {
        let (a, b) = (leaf("a"), leaf("b"));
        let tree = MerkleTree::build(&[a, b]).unwrap();
        let mut proof = tree.proof(0).unwrap();
        proof.siblings[0].position = Position::Left;
        assert!(!verify_proof(&tree.root(), &a, &proof));
    }

    #[test]
    fn out_of_range_index() {
        let tree = MerkleTree::build(&[leaf("a")]).unwrap();
        assert_eq!(
            tree.proof(1),
            Err(ValidationError::LeafIndexOutOfRange { index: 1, size: 1 })
        );
    }

    #[test]
    fn proof_serializes_with_hex_and_positions() {
        let (a, b) = (leaf("a"), leaf("b"));
        let proof = MerkleTree::build(&[a, b]).unwrap().proof(1).unwrap();
        let v = serde_json::to_value(&proof).unwrap();
        assert_eq!(v["leaf"], b.to_hex());
        assert_eq!(v["leaf_index"], 1);
        assert_eq!(v["siblings"][0]["position"], "left");
        assert_eq!(v["siblings"][0]["sibling"], a.to_hex());
        let back: MerkleProof = serde_json::from_value(v).unwrap();
        assert_eq!(back, proof);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn digests() -> impl Strategy<Value = Vec<ContentDigest>> {
        prop::collection::vec(any::<[u8; 32]>().prop_map(ContentDigest::from_bytes), 1..40)
    }

    proptest! {
        #[test]
        fn every_proof_verifies(leaves in digests()) {
            let tree = MerkleTree::build(&leaves).unwrap();
            let root = tree.root();
            prop_assert_eq!(root, merkle_root(&leaves).unwrap());
            for (i, proof) in tree.proofs().iter().enumerate() {
                prop_assert_eq!(proof.leaf_index, i);
                prop_assert_eq!(proof.siblings.len(), tree.depth());
                prop_assert!(verify_proof(&root, &leaves[i], proof));
            }
        }

        #[test]
        fn any_single_bit_flip_in_leaf_is_detected(
            leaves in digests(),
            pick in any::<prop::sample::Index>(),
            byte in 0usize..32,
            bit in 0u8..8,
        ) {
            let tree = MerkleTree::build(&leaves).unwrap();
            let i = pick.index(leaves.len());
            let mut proof = tree.proof(i).unwrap();
            let mut bytes = *proof.leaf.as_bytes();
            bytes[byte] ^= 1 << bit;
            let forged = ContentDigest::from_bytes(bytes);
            proof.leaf = forged;
            prop_assert!(!verify_proof(&tree.root(), &forged, &proof));
        }
    }
}
