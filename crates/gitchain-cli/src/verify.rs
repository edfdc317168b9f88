//! # Verify Subcommand
//!
//! Checks a Merkle proof or a published manifest, either against a root
//! given on the command line (no network) or against the root anchored
//! under a batch id.
//!
//! ```bash
//! gitchain verify --root <hex> --content-hash <hex> --proof proof.json
//! gitchain verify --batch-id 42 --chain evm --proof bundle-entry.json
//! gitchain verify --batch-id 42 --chain evm --manifest manifest.json
//! ```
//!
//! Exit code 0 means verified, 1 means not verified.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use gitchain_anchor::{
    verify, BatchManifest, CertificationLedger, CertificationRegistry, InMemoryLedger, ProofVerifier,
    VerificationError,
};
use gitchain_core::ContentDigest;
use gitchain_crypto::MerkleProof;
use serde::{Deserialize, Serialize};

use crate::batch::ProofEntry;
use crate::certify::Chain;
use crate::config::CliConfig;
use crate::{print_json, read_json, runtime};

/// Verify subcommand arguments.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Merkle root to check against.
    #[arg(long, required_unless_present = "batch_id", conflicts_with = "batch_id")]
    pub root: Option<ContentDigest>,

    /// On-chain batch id whose anchored root to check against.
    #[arg(long)]
    pub batch_id: Option<u64>,

    /// Content hash being proven. Taken from the proof file when it is a
    /// bundle entry.
    #[arg(long)]
    pub content_hash: Option<ContentDigest>,

    /// Proof file: a bare proof or an entry from a batch bundle.
    #[arg(long, required_unless_present = "manifest", conflicts_with = "manifest")]
    pub proof: Option<PathBuf>,

    /// Manifest file to check instead of a single proof.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Ledger used to resolve `--batch-id`.
    #[arg(long, value_enum, default_value_t = Chain::Mock)]
    pub chain: Chain,
}

/// A proof file in either accepted shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProofFile {
    /// Entry from a batch bundle, carrying its content hash.
    Entry(ProofEntry),
    /// Just the proof.
    Bare(MerkleProof),
}

impl ProofFile {
    fn into_parts(self, content_hash: Option<ContentDigest>) -> Result<(ContentDigest, MerkleProof)> {
        match self {
            Self::Entry(entry) => Ok((content_hash.unwrap_or(entry.content_hash), entry.proof)),
            Self::Bare(proof) => {
                let hash = content_hash.ok_or_else(|| anyhow!("--content-hash is required with a bare proof"))?;
                Ok((hash, proof))
            }
        }
    }
}

/// Printed verification result.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutput {
    /// Whether the check passed.
    pub verified: bool,
    /// Root checked against, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<ContentDigest>,
    /// Batch id checked against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<u64>,
    /// On-chain record of the batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification: Option<gitchain_anchor::Certification>,
    /// Why verification failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerifyOutput {
    fn against_root(root: ContentDigest, verified: bool, reason: Option<String>) -> Self {
        Self {
            verified,
            merkle_root: Some(root),
            batch_id: None,
            certification: None,
            reason,
        }
    }
}

/// Execute the verify subcommand.
pub fn run_verify(args: &VerifyArgs, config: &CliConfig) -> Result<u8> {
    let output = match (args.root, args.batch_id) {
        (Some(root), _) => verify_offline(args, root)?,
        (None, Some(batch_id)) => {
            let rt = runtime()?;
            match args.chain {
                Chain::Mock => {
                    let ledger = Arc::new(InMemoryLedger::default());
                    rt.block_on(verify_on_chain(ledger, config, args, batch_id))?
                }
                Chain::Evm => rt.block_on(verify_evm(config, args, batch_id))?,
            }
        }
        (None, None) => return Err(anyhow!("one of --root or --batch-id is required")),
    };
    print_json(&output)?;
    Ok(if output.verified { 0 } else { 1 })
}

fn verify_offline(args: &VerifyArgs, root: ContentDigest) -> Result<VerifyOutput> {
    if let Some(path) = &args.manifest {
        let manifest: BatchManifest = read_json(path)?;
        return Ok(match manifest.verify(&root) {
            Ok(()) => VerifyOutput::against_root(root, true, None),
            Err(e) => VerifyOutput::against_root(root, false, Some(rejection(e)?)),
        });
    }
    let (content_hash, proof) = load_proof(args)?;
    let verified = verify(&root, &content_hash, &proof);
    let reason = (!verified).then(|| format!("proof for {content_hash} does not lead to {root}"));
    Ok(VerifyOutput::against_root(root, verified, reason))
}

#[cfg(feature = "evm")]
async fn verify_evm(config: &CliConfig, args: &VerifyArgs, batch_id: u64) -> Result<VerifyOutput> {
    let ledger = gitchain_anchor::EvmLedger::new(config.evm_or_env()?)?;
    ledger.check_chain_id().await?;
    verify_on_chain(Arc::new(ledger), config, args, batch_id).await
}

#[cfg(not(feature = "evm"))]
async fn verify_evm(_config: &CliConfig, _args: &VerifyArgs, _batch_id: u64) -> Result<VerifyOutput> {
    anyhow::bail!("this build has no EVM support; rebuild with `--features evm`")
}

async fn verify_on_chain<L: CertificationLedger>(
    ledger: Arc<L>,
    config: &CliConfig,
    args: &VerifyArgs,
    batch_id: u64,
) -> Result<VerifyOutput> {
    let timeout = Duration::from_secs(config.anchor.rpc_timeout_secs);
    let verifier = ProofVerifier::new(CertificationRegistry::new(ledger, timeout));

    if let Some(path) = &args.manifest {
        let manifest: BatchManifest = read_json(path)?;
        return Ok(match verifier.verify_manifest(batch_id, &manifest).await {
            Ok(certification) => VerifyOutput {
                verified: true,
                merkle_root: Some(certification.merkle_root),
                batch_id: Some(batch_id),
                certification: Some(certification),
                reason: None,
            },
            Err(e) => VerifyOutput {
                verified: false,
                merkle_root: None,
                batch_id: Some(batch_id),
                certification: None,
                reason: Some(rejection(e)?),
            },
        });
    }

    let (content_hash, proof) = load_proof(args)?;
    let report = verifier.verify_against_batch(batch_id, &content_hash, &proof).await?;
    let reason = match (&report.certification, report.included) {
        (None, _) => Some(format!("batch {batch_id} is not anchored")),
        (Some(_), false) => Some(format!("proof for {content_hash} does not lead to the anchored root")),
        (Some(_), true) => None,
    };
    Ok(VerifyOutput {
        verified: report.included,
        merkle_root: report.certification.as_ref().map(|c| c.merkle_root),
        batch_id: Some(batch_id),
        certification: report.certification,
        reason,
    })
}

fn load_proof(args: &VerifyArgs) -> Result<(ContentDigest, MerkleProof)> {
    let path = args
        .proof
        .as_ref()
        .ok_or_else(|| anyhow!("one of --proof or --manifest is required"))?;
    let file: ProofFile = read_json(path)?;
    file.into_parts(args.content_hash)
}

/// Verification failures become a "not verified" answer; anything else
/// (I/O, ledger errors) stays an error.
fn rejection(e: VerificationError) -> Result<String> {
    match e {
        VerificationError::HashMismatch { .. }
        | VerificationError::UnknownBatch(_)
        | VerificationError::UnsupportedFormat(_)
        | VerificationError::Validation(_) => Ok(e.to_string()),
        other => Err(other.into()),
    }
}
