//! # Certify Subcommand
//!
//! Anchors an item set on a ledger, split into batches of at most
//! `anchor.max_batch_size` items. Each batch succeeds or fails on its own;
//! the exit code is 1 if any batch was not anchored.
//!
//! With `--journal`, every broadcast transaction and every settled batch is
//! written to the journal as it happens. Re-running after a crash or a
//! failure reconciles those transactions instead of sending the root again.
//! A journal belongs to the chain and contract it was written for; using it
//! with another ledger is an error.
//!
//! ```bash
//! gitchain certify --items items.json --metadata-uri 'ipfs://bafy…/{index}' \
//!     --chain evm --journal /var/lib/gitchain/anchor-journal.json --manifest-dir manifests/
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use gitchain_anchor::{
    AnchorConfig, AnchorSubmitter, BatchItem, CertificationLedger, CertificationReport,
    InMemoryLedger,
};
use gitchain_core::ContentDigest;
use gitchain_store::VersionStore;
use serde::Serialize;

use crate::batch::ItemSource;
use crate::config::CliConfig;
use crate::{print_json, runtime, write_json};

/// Placeholder in `--metadata-uri` replaced by the batch index.
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Which ledger to anchor on.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// Process-local in-memory ledger; a dry run.
    Mock,
    /// EVM JSON-RPC endpoint from the `evm` config section.
    Evm,
}

/// Certify subcommand arguments.
#[derive(Args, Debug)]
pub struct CertifyArgs {
    #[command(flatten)]
    pub source: ItemSource,

    /// Manifest location recorded on chain. `{index}` is replaced by the
    /// batch index; without it, `#{index}` is appended when there is more
    /// than one batch.
    #[arg(long)]
    pub metadata_uri: String,

    /// Ledger to use.
    #[arg(long, value_enum, default_value_t = Chain::Mock)]
    pub chain: Chain,

    /// Load and save submission state here.
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Write each batch's manifest as `{merkle_root}.json` here.
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,
}

/// Outcome of one batch, as printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Batch index.
    pub index: usize,
    /// Merkle root.
    pub merkle_root: ContentDigest,
    /// Manifest location.
    pub metadata_uri: String,
    /// Items in the batch.
    pub item_count: usize,
    /// `anchored` or `failed`.
    pub status: &'static str,
    /// Batch id on chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<u64>,
    /// Confirmed transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Block of the confirmed transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Why the batch was not anchored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-batch summaries of a report.
pub fn summarize(report: &CertificationReport) -> Vec<BatchSummary> {
    report
        .batches
        .iter()
        .map(|outcome| {
            let batch = &outcome.batch;
            let mut summary = BatchSummary {
                index: outcome.index,
                merkle_root: batch.merkle_root(),
                metadata_uri: batch.metadata_uri().to_string(),
                item_count: batch.len(),
                status: "failed",
                batch_id: None,
                tx_hash: None,
                block_number: None,
                error: None,
            };
            match &outcome.result {
                Ok(result) => {
                    summary.status = "anchored";
                    summary.batch_id = Some(result.on_chain_batch_id);
                    summary.tx_hash = Some(result.tx_hash.to_string());
                    summary.block_number = Some(result.block_number);
                }
                Err(e) => summary.error = Some(e.to_string()),
            }
            summary
        })
        .collect()
}

/// Metadata URI for batch `index` out of `total`.
pub fn metadata_uri_for(template: &str, index: usize, total: usize) -> String {
    if template.contains(INDEX_PLACEHOLDER) {
        template.replace(INDEX_PLACEHOLDER, &index.to_string())
    } else if total > 1 {
        format!("{template}#{index}")
    } else {
        template.to_string()
    }
}

/// Execute the certify subcommand.
pub fn run_certify(args: &CertifyArgs, store: &VersionStore, config: &CliConfig) -> Result<u8> {
    let items = args.source.load(store)?;
    let rt = runtime()?;
    let report = match args.chain {
        Chain::Mock => {
            let ledger = Arc::new(InMemoryLedger::default());
            rt.block_on(certify_with(ledger, config.anchor.clone(), items, args))?
        }
        Chain::Evm => rt.block_on(certify_evm(config, items, args))?,
    };

    if let Some(dir) = &args.manifest_dir {
        for outcome in &report.batches {
            let path = dir.join(format!("{}.json", outcome.batch.merkle_root()));
            write_json(&path, &outcome.batch.manifest())?;
        }
    }

    print_json(&summarize(&report))?;
    Ok(if report.is_complete() { 0 } else { 1 })
}

#[cfg(feature = "evm")]
async fn certify_evm(config: &CliConfig, items: Vec<BatchItem>, args: &CertifyArgs) -> Result<CertificationReport> {
    let ledger = gitchain_anchor::EvmLedger::new(config.evm_or_env()?)?;
    ledger.check_chain_id().await?;
    certify_with(Arc::new(ledger), config.anchor.clone(), items, args).await
}

#[cfg(not(feature = "evm"))]
async fn certify_evm(_config: &CliConfig, _items: Vec<BatchItem>, _args: &CertifyArgs) -> Result<CertificationReport> {
    anyhow::bail!("this build has no EVM support; rebuild with `--features evm`")
}

async fn certify_with<L: CertificationLedger>(
    ledger: Arc<L>,
    anchor: AnchorConfig,
    items: Vec<BatchItem>,
    args: &CertifyArgs,
) -> Result<CertificationReport> {
    let total = items.len().div_ceil(anchor.max_batch_size.max(1));
    let submitter = match &args.journal {
        Some(path) => AnchorSubmitter::open_journal(ledger, anchor, path)
            .with_context(|| format!("failed to open journal: {}", path.display()))?,
        None => AnchorSubmitter::new(ledger, anchor),
    };

    if args.journal.is_some() {
        let summary = submitter.reconcile_pending().await;
        if summary.checked > 0 {
            tracing::info!(
                checked = summary.checked,
                anchored = summary.anchored,
                superseded = summary.superseded,
                "reconciled journal"
            );
        }
    }

    let template = args.metadata_uri.as_str();
    let report = submitter
        .certify_all(items, |index, _| metadata_uri_for(template, index, total))
        .await;

    if let Some(path) = &args.journal {
        submitter
            .flush_journal()
            .await
            .with_context(|| format!("failed to save journal: {}", path.display()))?;
    }
    Ok(report?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchain_anchor::AnchorJournal;

    #[test]
    fn metadata_uri_templates() {
        assert_eq!(metadata_uri_for("ipfs://x/{index}.json", 3, 5), "ipfs://x/3.json");
        assert_eq!(metadata_uri_for("ipfs://x", 2, 5), "ipfs://x#2");
        assert_eq!(metadata_uri_for("ipfs://x", 0, 1), "ipfs://x");
    }

    #[test]
    fn mock_certify_chunks_and_journals() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(gitchain_store::StoreConfig::with_base_dir(dir.path().join("repos")));
        let mut containers = Vec::new();
        for n in 0..5 {
            let id = gitchain_core::ContainerId::parse(&format!("0711:memory:agents:s{n}")).unwrap();
            store.write(&id, &serde_json::json!({ "turn": n }), "log").unwrap();
            containers.push(id.at(gitchain_core::VersionSpec::Latest));
        }

        let mut config = CliConfig::default();
        config.anchor.max_batch_size = 2;
        let args = CertifyArgs {
            source: ItemSource {
                items: None,
                containers,
            },
            metadata_uri: "mem://agents".into(),
            chain: Chain::Mock,
            journal: Some(dir.path().join("journal.json")),
            manifest_dir: Some(dir.path().join("manifests")),
        };

        assert_eq!(run_certify(&args, &store, &config).unwrap(), 0);

        let journal = AnchorJournal::load(&dir.path().join("journal.json")).unwrap();
        assert_eq!(journal.len(), 3);
        assert!(journal.records.iter().all(|r| r.is_anchored()));
        assert_eq!(std::fs::read_dir(dir.path().join("manifests")).unwrap().count(), 3);
        let mut uris: Vec<_> = journal.records.iter().map(|r| r.metadata_uri.clone()).collect();
        uris.sort();
        assert_eq!(uris, ["mem://agents#0", "mem://agents#1", "mem://agents#2"]);
        assert_eq!(journal.ledger.as_deref(), Some("memory:in-memory"));
    }

    #[test]
    fn journal_of_another_ledger_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(gitchain_store::StoreConfig::with_base_dir(dir.path().join("repos")));
        let id = gitchain_core::ContainerId::parse("0711:memory:agents:s0").unwrap();
        store.write(&id, &serde_json::json!({ "turn": 0 }), "log").unwrap();
        let args = |journal: PathBuf| CertifyArgs {
            source: ItemSource {
                items: None,
                containers: vec![id.at(gitchain_core::VersionSpec::Latest)],
            },
            metadata_uri: "mem://agents".into(),
            chain: Chain::Mock,
            journal: Some(journal),
            manifest_dir: None,
        };
        let config = CliConfig::default();

        // A journal written against an EVM contract.
        let path = dir.path().join("journal.json");
        assert_eq!(run_certify(&args(path.clone()), &store, &config).unwrap(), 0);
        let mut journal = AnchorJournal::load(&path).unwrap();
        journal.ledger = Some(format!("eip155:1:0x{}", "ab".repeat(20)));
        journal.save(&path).unwrap();

        let err = run_certify(&args(path.clone()), &store, &config).unwrap_err();
        assert!(format!("{err:#}").contains("eip155:1"), "{err:#}");
        assert_eq!(AnchorJournal::load(&path).unwrap(), journal);
    }
}
