//! # Batch Subcommand
//!
//! Builds the Merkle tree for an item set without touching any ledger.
//! The output bundle holds the root, the manifest to publish at the
//! metadata URI, and one proof per item.
//!
//! ```bash
//! gitchain batch build --items items.json --metadata-uri ipfs://… --out bundle.json
//! gitchain batch build --container 0711:product:acme:drill --container 0711:product:acme:saw:v2
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use gitchain_anchor::{Batch, BatchItem, BatchManifest};
use gitchain_core::{ContainerRef, ContentDigest, VersionSpec};
use gitchain_crypto::MerkleProof;
use gitchain_store::VersionStore;
use serde::{Deserialize, Serialize};

use crate::{print_json, read_json, write_json};

/// Where the items of a batch come from.
#[derive(Args, Debug, Clone, Default)]
pub struct ItemSource {
    /// JSON array of `{"container": "0711:…:vN", "content_hash": "…"}`.
    #[arg(long)]
    pub items: Option<PathBuf>,

    /// Container reference to read from the store; repeatable. A reference
    /// without a version is pinned to the current latest version.
    #[arg(long = "container", value_parser = ContainerRef::parse)]
    pub containers: Vec<ContainerRef>,
}

impl ItemSource {
    /// Collect items: the file's first, then store references in order.
    pub fn load(&self, store: &VersionStore) -> Result<Vec<BatchItem>> {
        let mut items: Vec<BatchItem> = match &self.items {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        for reference in &self.containers {
            let container = store.read_ref(reference)?;
            items.push(BatchItem::new(
                container.id.at(VersionSpec::Exact(container.version)),
                container.content_hash,
            ));
        }
        if items.is_empty() {
            bail!("no items: pass --items FILE or at least one --container");
        }
        Ok(items)
    }
}

/// Proof for one item, as written to bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEntry {
    /// The certified container version.
    pub container: ContainerRef,
    /// Its content hash.
    pub content_hash: ContentDigest,
    /// Inclusion proof under the bundle's root.
    pub proof: MerkleProof,
}

/// Everything produced for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchBundle {
    /// Merkle root.
    pub merkle_root: ContentDigest,
    /// Where the manifest is expected to be published.
    pub metadata_uri: String,
    /// Number of items.
    pub item_count: usize,
    /// Manifest to publish at `metadata_uri`.
    pub manifest: BatchManifest,
    /// One proof per item, in leaf order.
    pub proofs: Vec<ProofEntry>,
}

impl BatchBundle {
    /// Bundle for a built batch.
    pub fn from_batch(batch: &Batch) -> Self {
        let proofs = batch
            .items()
            .iter()
            .zip(batch.proofs())
            .map(|(item, proof)| ProofEntry {
                container: item.container.clone(),
                content_hash: item.content_hash,
                proof,
            })
            .collect();
        Self {
            merkle_root: batch.merkle_root(),
            metadata_uri: batch.metadata_uri().to_string(),
            item_count: batch.len(),
            manifest: batch.manifest(),
            proofs,
        }
    }
}

/// Batch subcommand arguments.
#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(subcommand)]
    pub command: BatchCommand,
}

/// Available batch subcommands.
#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// Build the Merkle tree, proofs and manifest for an item set.
    Build {
        #[command(flatten)]
        source: ItemSource,
        /// Metadata URI recorded in the bundle.
        #[arg(long, default_value = "")]
        metadata_uri: String,
        /// Write the bundle here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Execute the batch subcommand.
pub fn run_batch(args: &BatchArgs, store: &VersionStore, max_batch_size: usize) -> Result<u8> {
    match &args.command {
        BatchCommand::Build {
            source,
            metadata_uri,
            out,
        } => {
            let items = source.load(store)?;
            let batch = Batch::new(items, metadata_uri.as_str(), max_batch_size)?;
            let bundle = BatchBundle::from_batch(&batch);
            tracing::info!(merkle_root = %bundle.merkle_root, items = bundle.item_count, "batch built");
            emit(&bundle, out.as_deref())?;
        }
    }
    Ok(0)
}

fn emit(bundle: &BatchBundle, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            write_json(path, bundle)?;
            println!("{}", bundle.merkle_root);
            Ok(())
        }
        None => print_json(bundle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchain_core::{content_hash, ContainerId};
    use gitchain_store::StoreConfig;
    use serde_json::json;

    #[test]
    fn items_from_file_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(StoreConfig::with_base_dir(dir.path().join("repos")));
        let id = ContainerId::parse("0711:product:acme:drill").unwrap();
        store.write(&id, &json!({"a": 1}), "one").unwrap();
        let second = store.write(&id, &json!({"a": 2}), "two").unwrap();

        let file_item = BatchItem::new(
            ContainerRef::parse("0711:campaign:acme:launch:v3").unwrap(),
            content_hash(&json!({"c": true})).unwrap(),
        );
        let items_path = dir.path().join("items.json");
        write_json(&items_path, &vec![file_item.clone()]).unwrap();

        let source = ItemSource {
            items: Some(items_path),
            containers: vec![ContainerRef::parse("0711:product:acme:drill").unwrap()],
        };
        let items = source.load(&store).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], file_item);
        assert_eq!(items[1].container.version, VersionSpec::Exact(2));
        assert_eq!(items[1].content_hash, second.content_hash);
    }

    #[test]
    fn empty_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(StoreConfig::with_base_dir(dir.path()));
        assert!(ItemSource::default().load(&store).is_err());
    }

    #[test]
    fn bundle_proofs_verify_against_root() {
        let items: Vec<BatchItem> = (1..=3)
            .map(|n| {
                BatchItem::new(
                    ContainerRef::parse(&format!("0711:knowledge:docs:page-{n}:v1")).unwrap(),
                    content_hash(&json!({ "page": n })).unwrap(),
                )
            })
            .collect();
        let batch = Batch::new(items, "mem://docs", 10).unwrap();
        let bundle = BatchBundle::from_batch(&batch);
        assert_eq!(bundle.item_count, 3);
        bundle.manifest.verify(&bundle.merkle_root).unwrap();
        for entry in &bundle.proofs {
            assert!(gitchain_crypto::verify_proof(&bundle.merkle_root, &entry.content_hash, &entry.proof));
        }
    }
}
