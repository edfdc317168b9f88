//! # Proof Verifier
//!
//! Answers "was this exact content included in this anchored batch?".
//!
//! The core check is [`verify`], a pure function of `(root, leaf, proof)`
//! that a third party can reimplement from the published rules: the leaf is
//! the content hash itself, each step hashes `current || sibling` or
//! `sibling || current` with SHA-256 according to the step's position, and
//! odd levels pair the last node with itself. A failed check is `false`,
//! never an error.
//!
//! [`ProofVerifier`] adds the chain: it resolves the root for a batch id
//! through the [`CertificationRegistry`] and checks published manifests.
//! [`verify_version`] re-derives a stored version's content hash.

use gitchain_core::{content_hash, ContainerId, ContentDigest};
use gitchain_crypto::MerkleProof;
use gitchain_store::{StoreError, VersionStore};
use serde::{Deserialize, Serialize};

use crate::batch::BatchManifest;
use crate::error::{RegistryError, VerificationError};
use crate::ledger::{Certification, CertificationLedger};
use crate::registry::CertificationRegistry;

/// Check that `proof` leads from `leaf` to `root`.
///
/// Returns `false` if the proof was issued for a different leaf.
pub fn verify(root: &ContentDigest, leaf: &ContentDigest, proof: &MerkleProof) -> bool {
    gitchain_crypto::verify_proof(root, leaf, proof)
}

/// Answer to "is this content in batch N?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Batch id asked about.
    pub batch_id: u64,
    /// The content hash checked.
    pub content_hash: ContentDigest,
    /// True if the proof leads to the anchored root.
    pub included: bool,
    /// What the chain recorded; `None` for an unknown batch.
    pub certification: Option<Certification>,
}

/// Chain-backed verification.
#[derive(Debug, Clone)]
pub struct ProofVerifier<L> {
    registry: CertificationRegistry<L>,
}

impl<L: CertificationLedger> ProofVerifier<L> {
    /// Verify against the given registry.
    pub fn new(registry: CertificationRegistry<L>) -> Self {
        Self { registry }
    }

    /// The registry used to resolve batch ids.
    pub fn registry(&self) -> &CertificationRegistry<L> {
        &self.registry
    }

    /// Check `content_hash` with `proof` against the root anchored as
    /// `batch_id`. An unknown batch is `included = false`.
    pub async fn verify_against_batch(
        &self,
        batch_id: u64,
        content_hash: &ContentDigest,
        proof: &MerkleProof,
    ) -> Result<VerificationReport, RegistryError> {
        let certification = self.registry.get(batch_id).await?;
        let included = certification
            .as_ref()
            .is_some_and(|c| verify(&c.merkle_root, content_hash, proof));
        tracing::debug!(batch_id, content_hash = %content_hash, included, "proof checked against chain");
        Ok(VerificationReport {
            batch_id,
            content_hash: *content_hash,
            included,
            certification,
        })
    }

    /// Check a published manifest against the root anchored as `batch_id`.
    pub async fn verify_manifest(
        &self,
        batch_id: u64,
        manifest: &BatchManifest,
    ) -> Result<Certification, VerificationError> {
        let certification = self
            .registry
            .get(batch_id)
            .await?
            .ok_or(VerificationError::UnknownBatch(batch_id))?;
        manifest.verify(&certification.merkle_root)?;
        Ok(certification)
    }
}

/// Re-derive the content hash of `id` as of `commit` and compare it with
/// `expected`.
///
/// Any disagreement, whether caught by the object store or here, is
/// [`VerificationError::HashMismatch`].
pub fn verify_version(
    store: &VersionStore,
    id: &ContainerId,
    commit: &ContentDigest,
    expected: &ContentDigest,
) -> Result<(), VerificationError> {
    let repo = store.repository(&id.namespace_key());
    let data = match repo.read_at_commit(&id.identifier, commit) {
        Ok(data) => data,
        Err(StoreError::HashMismatch { expected, actual }) => {
            return Err(VerificationError::HashMismatch { expected, actual })
        }
        Err(e) => return Err(e.into()),
    };
    let actual = content_hash(&data).map_err(StoreError::from)?;
    if actual != *expected {
        tracing::warn!(container = %id, commit = %commit, expected = %expected, actual = %actual, "content hash mismatch");
        return Err(VerificationError::HashMismatch {
            expected: *expected,
            actual,
        });
    }
    Ok(())
}
