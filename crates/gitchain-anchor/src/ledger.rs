//! # Ledger Boundary
//!
//! The chain is an untrusted, slow, message-passing dependency. Everything
//! the core needs from it goes through [`CertificationLedger`]: read the fee
//! estimate, send one `certify` transaction, ask what became of a
//! transaction, and read a certification back.
//!
//! The trait is sealed. Two implementations exist:
//!
//! - [`InMemoryLedger`]: deterministic and fault-injectable, used by tests
//!   and dry runs.
//! - `EvmLedger` (feature `evm`): JSON-RPC over HTTPS.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;

use gitchain_core::{sha256_raw, ContentDigest, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A transaction hash as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Wrap a hash string.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments of one `certify` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifyRequest {
    /// Root to record.
    pub merkle_root: ContentDigest,
    /// Where the manifest lives.
    pub metadata_uri: String,
    /// Number of items in the batch.
    pub item_count: u64,
    /// Gas price for this attempt, read fresh from the chain.
    pub gas_price_wei: u64,
}

/// What the ledger currently knows about a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Known but not yet mined, or mined with too few confirmations.
    Pending,
    /// Mined successfully.
    Confirmed {
        /// Batch id assigned by the contract.
        batch_id: u64,
        /// Block the transaction was mined in.
        block_number: u64,
    },
    /// Mined and reverted.
    Reverted,
    /// No longer known to the node.
    Dropped,
}

/// A certification as recorded by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    /// Anchored root.
    pub merkle_root: ContentDigest,
    /// Manifest location.
    pub metadata_uri: String,
    /// Block timestamp of the certifying transaction.
    pub timestamp: Timestamp,
    /// Account that certified, `0x`-prefixed.
    pub issuer_address: String,
}

/// The certification contract as seen from the core.
///
/// Sealed: only implementations within this crate are permitted.
/// Implementations must not report `Confirmed` for a transaction that has
/// not been mined successfully.
pub trait CertificationLedger: private::Sealed + Send + Sync {
    /// Name used in logs and reports.
    fn chain_name(&self) -> &str;

    /// Identity of the chain and contract certifications land on. Journals
    /// are bound to it, so records from one ledger are never taken as
    /// anchored on another.
    fn ledger_id(&self) -> String;

    /// Current network fee estimate in wei.
    fn gas_price(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Broadcast one `certify` transaction.
    fn send_certify(
        &self,
        request: &CertifyRequest,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send;

    /// Current status of a transaction.
    fn transaction_status(
        &self,
        tx_hash: &TxHash,
    ) -> impl Future<Output = Result<TxStatus, LedgerError>> + Send;

    /// Read a certification. Unknown ids are `None`.
    fn get_certification(
        &self,
        batch_id: u64,
    ) -> impl Future<Output = Result<Option<Certification>, LedgerError>> + Send;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::InMemoryLedger {}
    #[cfg(feature = "evm")]
    impl Sealed for crate::evm::EvmLedger {}
}

// ---------------------------------------------------------------------------
// In-memory ledger
// ---------------------------------------------------------------------------

/// Unix time of block 0 on the in-memory chain.
const GENESIS_UNIX: i64 = 1_700_000_000;

/// Seconds between in-memory blocks.
const BLOCK_TIME_SECS: i64 = 12;

/// A scripted misbehavior, consumed by the next `send_certify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No fault: broadcast and mine on the first poll.
    Succeed,
    /// Send times out; nothing is broadcast.
    Timeout,
    /// Connection fails; nothing is broadcast.
    Transport,
    /// Node rejects the nonce; nothing is broadcast.
    NonceConflict,
    /// Node rejects the gas price; nothing is broadcast.
    Underpriced,
    /// Broadcast, then mined as reverted.
    Revert,
    /// Broadcast, then evicted from the mempool.
    Drop,
    /// Broadcast, pending for this many status polls, then mined.
    Delay(u32),
    /// Broadcast and pending until [`InMemoryLedger::mine`] is called.
    Stall,
}

#[derive(Debug, Clone)]
enum MockTxState {
    Pending { polls_left: Option<u32> },
    Mined { batch_id: u64, block_number: u64 },
    Reverted,
    Dropped,
}

#[derive(Debug, Clone)]
struct MockTx {
    request: CertifyRequest,
    state: MockTxState,
}

#[derive(Debug)]
struct LedgerState {
    gas_price_wei: u64,
    block_number: u64,
    next_batch_id: u64,
    tx_counter: u64,
    gas_reads: u64,
    certifications: BTreeMap<u64, Certification>,
    txs: HashMap<TxHash, MockTx>,
    sent: Vec<(TxHash, CertifyRequest)>,
    faults: VecDeque<Fault>,
}

impl LedgerState {
    fn mine(&mut self, tx_hash: &TxHash, issuer: &str) -> Option<(u64, u64)> {
        let tx = self.txs.get(tx_hash)?;
        match tx.state {
            MockTxState::Mined { batch_id, block_number } => return Some((batch_id, block_number)),
            MockTxState::Pending { .. } => {}
            MockTxState::Reverted | MockTxState::Dropped => return None,
        }
        let request = tx.request.clone();
        self.block_number += 1;
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        let block_number = self.block_number;
        let timestamp = Timestamp::from_unix_seconds(GENESIS_UNIX + block_number as i64 * BLOCK_TIME_SECS)
            .unwrap_or_else(Timestamp::now);
        self.certifications.insert(
            batch_id,
            Certification {
                merkle_root: request.merkle_root,
                metadata_uri: request.metadata_uri,
                timestamp,
                issuer_address: issuer.to_string(),
            },
        );
        if let Some(tx) = self.txs.get_mut(tx_hash) {
            tx.state = MockTxState::Mined { batch_id, block_number };
        }
        Some((batch_id, block_number))
    }
}

/// Deterministic in-process ledger.
///
/// Every broadcast transaction is mined on its first status poll unless a
/// [`Fault`] says otherwise. Batch ids start at 1 and increase by one per
/// mined `certify`, like the contract's counter.
#[derive(Debug)]
pub struct InMemoryLedger {
    chain_name: String,
    issuer_address: String,
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryLedger {
    /// A fresh chain with a 1 gwei fee estimate.
    pub fn new(chain_name: impl Into<String>) -> Self {
        Self {
            chain_name: chain_name.into(),
            issuer_address: format!("0x{}", "11".repeat(20)),
            state: Mutex::new(LedgerState {
                gas_price_wei: 1_000_000_000,
                block_number: 0,
                next_batch_id: 1,
                tx_counter: 0,
                gas_reads: 0,
                certifications: BTreeMap::new(),
                txs: HashMap::new(),
                sent: Vec::new(),
                faults: VecDeque::new(),
            }),
        }
    }

    /// Builder-style fee estimate.
    pub fn with_gas_price(self, wei: u64) -> Self {
        self.set_gas_price(wei);
        self
    }

    /// Change the fee estimate.
    pub fn set_gas_price(&self, wei: u64) {
        self.state.lock().gas_price_wei = wei;
    }

    /// Queue faults for the next sends, in order.
    pub fn inject(&self, faults: impl IntoIterator<Item = Fault>) {
        self.state.lock().faults.extend(faults);
    }

    /// Mine a pending transaction now. Returns `(batch_id, block_number)`,
    /// or `None` if the transaction is unknown, reverted or dropped.
    pub fn mine(&self, tx_hash: &TxHash) -> Option<(u64, u64)> {
        self.state.lock().mine(tx_hash, &self.issuer_address)
    }

    /// Every request that reached the mempool, in order.
    pub fn sent(&self) -> Vec<CertifyRequest> {
        self.state.lock().sent.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Hashes of every broadcast transaction, in order.
    pub fn sent_hashes(&self) -> Vec<TxHash> {
        self.state.lock().sent.iter().map(|(h, _)| h.clone()).collect()
    }

    /// Number of broadcast transactions.
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// Number of fee estimate reads.
    pub fn gas_price_reads(&self) -> u64 {
        self.state.lock().gas_reads
    }

    /// Number of recorded certifications.
    pub fn certification_count(&self) -> usize {
        self.state.lock().certifications.len()
    }

    /// The account all certifications are issued by.
    pub fn issuer_address(&self) -> &str {
        &self.issuer_address
    }

    fn send(&self, request: &CertifyRequest) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock();
        let fault = state.faults.pop_front();
        let initial = match fault {
            Some(Fault::Timeout) => return Err(LedgerError::Timeout("eth_sendTransaction".into())),
            Some(Fault::Transport) => return Err(LedgerError::Transport("connection reset".into())),
            Some(Fault::NonceConflict) => return Err(LedgerError::NonceConflict("nonce too low".into())),
            Some(Fault::Underpriced) => {
                return Err(LedgerError::Underpriced("replacement transaction underpriced".into()))
            }
            Some(Fault::Revert) => {
                state.block_number += 1;
                MockTxState::Reverted
            }
            Some(Fault::Drop) => MockTxState::Dropped,
            Some(Fault::Delay(polls)) => MockTxState::Pending { polls_left: Some(polls) },
            Some(Fault::Stall) => MockTxState::Pending { polls_left: None },
            Some(Fault::Succeed) | None => MockTxState::Pending { polls_left: Some(0) },
        };

        state.tx_counter += 1;
        let seed = format!("{}:{}:{}", self.chain_name, state.tx_counter, request.merkle_root);
        let tx_hash = TxHash::new(sha256_raw(seed.as_bytes()).to_prefixed_hex());
        state.sent.push((tx_hash.clone(), request.clone()));
        state.txs.insert(
            tx_hash.clone(),
            MockTx {
                request: request.clone(),
                state: initial,
            },
        );
        Ok(tx_hash)
    }

    fn status(&self, tx_hash: &TxHash) -> TxStatus {
        let mut state = self.state.lock();
        match state.txs.get_mut(tx_hash).map(|tx| &mut tx.state) {
            None | Some(MockTxState::Dropped) => return TxStatus::Dropped,
            Some(MockTxState::Reverted) => return TxStatus::Reverted,
            Some(MockTxState::Mined { batch_id, block_number }) => {
                return TxStatus::Confirmed {
                    batch_id: *batch_id,
                    block_number: *block_number,
                }
            }
            Some(MockTxState::Pending { polls_left: None }) => return TxStatus::Pending,
            Some(MockTxState::Pending { polls_left: Some(n) }) => {
                if *n > 0 {
                    *n -= 1;
                    return TxStatus::Pending;
                }
            }
        }
        match state.mine(tx_hash, &self.issuer_address) {
            Some((batch_id, block_number)) => TxStatus::Confirmed { batch_id, block_number },
            None => TxStatus::Dropped,
        }
    }
}

impl CertificationLedger for InMemoryLedger {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    fn ledger_id(&self) -> String {
        format!("memory:{}", self.chain_name)
    }

    fn gas_price(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send {
        let mut state = self.state.lock();
        state.gas_reads += 1;
        std::future::ready(Ok(state.gas_price_wei))
    }

    fn send_certify(
        &self,
        request: &CertifyRequest,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send {
        std::future::ready(self.send(request))
    }

    fn transaction_status(
        &self,
        tx_hash: &TxHash,
    ) -> impl Future<Output = Result<TxStatus, LedgerError>> + Send {
        std::future::ready(Ok(self.status(tx_hash)))
    }

    fn get_certification(
        &self,
        batch_id: u64,
    ) -> impl Future<Output = Result<Option<Certification>, LedgerError>> + Send {
        std::future::ready(Ok(self.state.lock().certifications.get(&batch_id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(n: u8) -> CertifyRequest {
        CertifyRequest {
            merkle_root: ContentDigest::from_bytes([n; 32]),
            metadata_uri: format!("mem://batch/{n}"),
            item_count: 2,
            gas_price_wei: 1_000_000_000,
        }
    }

    #[tokio::test]
    async fn send_then_poll_mines_with_increasing_ids() {
        let ledger = InMemoryLedger::default();
        let tx1 = ledger.send_certify(&request(1)).await.unwrap();
        let tx2 = ledger.send_certify(&request(2)).await.unwrap();
        assert_ne!(tx1, tx2);
        assert!(tx1.as_str().starts_with("0x"));

        let s1 = ledger.transaction_status(&tx1).await.unwrap();
        let s2 = ledger.transaction_status(&tx2).await.unwrap();
        assert_eq!(s1, TxStatus::Confirmed { batch_id: 1, block_number: 1 });
        assert_eq!(s2, TxStatus::Confirmed { batch_id: 2, block_number: 2 });
        // Polling again is stable.
        assert_eq!(ledger.transaction_status(&tx1).await.unwrap(), s1);

        let cert = ledger.get_certification(2).await.unwrap().unwrap();
        assert_eq!(cert.merkle_root, ContentDigest::from_bytes([2; 32]));
        assert_eq!(cert.metadata_uri, "mem://batch/2");
        assert_eq!(cert.issuer_address, ledger.issuer_address());
        assert_eq!(cert.timestamp.unix_seconds(), GENESIS_UNIX + 2 * BLOCK_TIME_SECS);
        assert!(ledger.get_certification(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pre_broadcast_faults_send_nothing() {
        let ledger = InMemoryLedger::default();
        ledger.inject([Fault::Timeout, Fault::NonceConflict, Fault::Underpriced, Fault::Transport]);
        for _ in 0..4 {
            let err = ledger.send_certify(&request(1)).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert_eq!(ledger.sent_count(), 0);
        ledger.send_certify(&request(1)).await.unwrap();
        assert_eq!(ledger.sent_count(), 1);
    }

    #[tokio::test]
    async fn revert_drop_delay_and_stall() {
        let ledger = InMemoryLedger::default();
        ledger.inject([Fault::Revert, Fault::Drop, Fault::Delay(2), Fault::Stall]);
        let reverted = ledger.send_certify(&request(1)).await.unwrap();
        let dropped = ledger.send_certify(&request(2)).await.unwrap();
        let delayed = ledger.send_certify(&request(3)).await.unwrap();
        let stalled = ledger.send_certify(&request(4)).await.unwrap();

        assert_eq!(ledger.transaction_status(&reverted).await.unwrap(), TxStatus::Reverted);
        assert_eq!(ledger.transaction_status(&dropped).await.unwrap(), TxStatus::Dropped);

        assert_eq!(ledger.transaction_status(&delayed).await.unwrap(), TxStatus::Pending);
        assert_eq!(ledger.transaction_status(&delayed).await.unwrap(), TxStatus::Pending);
        assert!(matches!(
            ledger.transaction_status(&delayed).await.unwrap(),
            TxStatus::Confirmed { batch_id: 1, .. }
        ));

        for _ in 0..10 {
            assert_eq!(ledger.transaction_status(&stalled).await.unwrap(), TxStatus::Pending);
        }
        let (batch_id, _) = ledger.mine(&stalled).unwrap();
        assert_eq!(batch_id, 2);
        assert!(matches!(
            ledger.transaction_status(&stalled).await.unwrap(),
            TxStatus::Confirmed { batch_id: 2, .. }
        ));
        assert!(ledger.mine(&reverted).is_none());
        assert_eq!(ledger.certification_count(), 2);
    }

    #[tokio::test]
    async fn unknown_transaction_is_dropped() {
        let ledger = InMemoryLedger::default();
        let status = ledger.transaction_status(&TxHash::new("0xdead")).await.unwrap();
        assert_eq!(status, TxStatus::Dropped);
    }

    #[tokio::test]
    async fn gas_price_reads_are_counted() {
        let ledger = InMemoryLedger::new("test").with_gas_price(42);
        assert_eq!(ledger.gas_price().await.unwrap(), 42);
        ledger.set_gas_price(7);
        assert_eq!(ledger.gas_price().await.unwrap(), 7);
        assert_eq!(ledger.gas_price_reads(), 2);
        assert_eq!(ledger.chain_name(), "test");
    }

    #[test]
    fn ledger_id_follows_chain_name() {
        assert_eq!(InMemoryLedger::new("a").ledger_id(), "memory:a");
        assert_ne!(InMemoryLedger::new("a").ledger_id(), InMemoryLedger::new("b").ledger_id());
        assert_eq!(InMemoryLedger::default().ledger_id(), "memory:in-memory");
    }

    #[test]
    fn tx_status_serializes_with_tag() {
        let json = serde_json::to_value(TxStatus::Confirmed { batch_id: 3, block_number: 9 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "confirmed", "batch_id": 3, "block_number": 9}));
    }
}
