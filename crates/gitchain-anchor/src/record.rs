//! Per-batch submission state.
//!
//! One [`BatchRecord`] exists per Merkle root. It lists every transaction
//! ever broadcast for that root; at most one of them is `Confirmed`.

use gitchain_core::ContentDigest;
use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::ledger::TxHash;

/// Outcome of one broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Broadcast, outcome unknown.
    Pending,
    /// The winning transaction.
    Confirmed,
    /// Mined and reverted.
    Reverted,
    /// Gone from the mempool.
    Dropped,
    /// Mined after another attempt had already won.
    Superseded,
}

/// One broadcast `certify` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTransaction {
    /// Attempt number within the batch's lifetime, starting at 1.
    pub attempt: u32,
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Gas price the transaction was sent with.
    pub gas_price_wei: u64,
    /// Current knowledge about it.
    pub status: AttemptStatus,
    /// Batch id assigned on chain, once mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain_batch_id: Option<u64>,
    /// Block it was mined in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Known, nothing attempted.
    New,
    /// A retry cycle is running or was interrupted.
    Submitting,
    /// Exactly one transaction confirmed.
    Anchored,
    /// The last retry cycle gave up. Pending transactions may still confirm.
    Failed,
}

/// Result of a successful anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorResult {
    /// Anchored root.
    pub merkle_root: ContentDigest,
    /// Batch id assigned by the contract.
    pub on_chain_batch_id: u64,
    /// The confirmed transaction.
    pub tx_hash: TxHash,
    /// Block of the confirmed transaction.
    pub block_number: u64,
    /// Attempts made for this batch up to confirmation.
    pub attempts: u32,
    /// True if the confirmation was discovered by reconciliation rather than
    /// while waiting on the transaction.
    pub reconciled: bool,
}

/// Everything known about the submission of one Merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// The root; also the record key.
    pub merkle_root: ContentDigest,
    /// Manifest location sent with every attempt.
    pub metadata_uri: String,
    /// Items in the batch.
    pub item_count: u64,
    /// Lifecycle state.
    pub state: BatchState,
    /// Attempts made so far across all retry cycles.
    pub attempts: u32,
    /// Broadcast transactions, oldest first.
    pub transactions: Vec<AnchorTransaction>,
    /// Set once, when the first transaction confirms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnchorResult>,
    /// Error of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl BatchRecord {
    /// A fresh record for `batch`.
    pub fn new(batch: &Batch) -> Self {
        Self {
            merkle_root: batch.merkle_root(),
            metadata_uri: batch.metadata_uri().to_string(),
            item_count: batch.len() as u64,
            state: BatchState::New,
            attempts: 0,
            transactions: Vec::new(),
            result: None,
            last_error: None,
        }
    }

    /// Transactions whose outcome is still unknown.
    pub fn pending(&self) -> impl Iterator<Item = &AnchorTransaction> {
        self.transactions
            .iter()
            .filter(|t| t.status == AttemptStatus::Pending)
    }

    /// True if any transaction is still pending.
    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    /// True once a transaction has confirmed.
    pub fn is_anchored(&self) -> bool {
        self.result.is_some()
    }

    /// True if nothing about this record can change without a new submit:
    /// anchored or failed, with no transaction left pending.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, BatchState::Anchored | BatchState::Failed) && !self.has_pending()
    }

    /// Indices of pending transactions, oldest first.
    pub(crate) fn pending_indices(&self) -> Vec<usize> {
        self.transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == AttemptStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchItem;
    use gitchain_core::{ContainerRef, VersionSpec};

    fn batch() -> Batch {
        let container = ContainerRef::parse("0711:product:acme:sku:v1").unwrap();
        assert_eq!(container.version, VersionSpec::Exact(1));
        Batch::new(
            vec![BatchItem::new(container, ContentDigest::from_bytes([3; 32]))],
            "mem://1",
            10,
        )
        .unwrap()
    }

    #[test]
    fn new_record_mirrors_batch() {
        let b = batch();
        let record = BatchRecord::new(&b);
        assert_eq!(record.merkle_root, b.merkle_root());
        assert_eq!(record.item_count, 1);
        assert_eq!(record.state, BatchState::New);
        assert!(!record.has_pending());
        assert!(!record.is_anchored());
        assert!(!record.is_settled());
    }

    #[test]
    fn record_serializes_without_empty_optionals() {
        let mut record = BatchRecord::new(&batch());
        record.transactions.push(AnchorTransaction {
            attempt: 1,
            tx_hash: TxHash::new("0xabc"),
            gas_price_wei: 5,
            status: AttemptStatus::Pending,
            on_chain_batch_id: None,
            block_number: None,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["state"], "new");
        assert_eq!(json["transactions"][0]["status"], "pending");
        assert!(json["transactions"][0].get("block_number").is_none());

        let back: BatchRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert!(back.has_pending());
    }

    #[test]
    fn failed_record_with_pending_tx_is_not_settled() {
        let mut record = BatchRecord::new(&batch());
        record.state = BatchState::Failed;
        record.transactions.push(AnchorTransaction {
            attempt: 1,
            tx_hash: TxHash::new("0xabc"),
            gas_price_wei: 5,
            status: AttemptStatus::Pending,
            on_chain_batch_id: None,
            block_number: None,
        });
        assert!(!record.is_settled());
        assert_eq!(record.pending_indices(), vec![0]);

        record.transactions[0].status = AttemptStatus::Dropped;
        assert!(record.is_settled());
        assert!(record.pending_indices().is_empty());
    }
}
