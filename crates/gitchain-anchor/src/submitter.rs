//! # Anchor Submitter
//!
//! Gets a batch's `(merkle_root, metadata_uri, item_count)` recorded on
//! chain exactly once, despite an unreliable network and volatile gas
//! prices.
//!
//! ## Retry cycle
//!
//! Each call to [`AnchorSubmitter::submit`] runs at most `max_attempts`
//! attempts. An attempt re-reads the gas price, refuses to send above the
//! ceiling ([`AnchorError::GasPriceExceeded`], no retry), broadcasts one
//! transaction and polls it until it is mined or the confirmation window
//! closes. Transient failures back off `base × 2^(n-1)` (capped) before the
//! next attempt.
//!
//! ## Idempotency
//!
//! State lives in one [`BatchRecord`] per Merkle root, guarded by a
//! `tokio::sync::Mutex` so two submits of the same batch never race. An
//! anchored record answers immediately. Before every attempt the pending
//! transactions of earlier attempts are polled; if one of them confirmed,
//! that is the result and nothing new is sent. A transaction that confirms
//! after another one already won is recorded as `superseded`.
//!
//! Giving up on a transaction never cancels it. Pending transactions stay in
//! the record until [`AnchorSubmitter::reconcile`] or the background
//! reconciler resolves them.
//!
//! ## Persistence
//!
//! A submitter opened with [`AnchorSubmitter::open_journal`] writes the
//! record to its [`JournalFile`] after every broadcast and when a submit or
//! reconciliation finishes. The journal is bound to the ledger's
//! [`ledger_id`](CertificationLedger::ledger_id); records from another
//! chain or contract are refused rather than reported as anchored.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gitchain_core::{ContentDigest, ValidationError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};

use crate::batch::{Batch, BatchBuilder, BatchItem};
use crate::config::AnchorConfig;
use crate::error::{AnchorError, JournalError, LedgerError};
use crate::journal::{AnchorJournal, JournalFile};
use crate::ledger::{CertificationLedger, CertifyRequest, TxStatus};
use crate::record::{AnchorResult, AnchorTransaction, AttemptStatus, BatchRecord, BatchState};

/// Outcome of one attempt inside a retry cycle.
enum Attempt {
    Anchored(AnchorResult),
    Retry(String),
    Fatal(AnchorError),
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Records that had pending transactions.
    pub checked: usize,
    /// Records that became anchored in this pass.
    pub anchored: usize,
    /// Transactions marked superseded in this pass.
    pub superseded: usize,
}

#[derive(Default)]
struct Reconciled {
    anchored: Option<AnchorResult>,
    superseded: usize,
    changed: bool,
}

/// Outcome of one chunk of [`AnchorSubmitter::certify_all`].
#[derive(Debug)]
pub struct BatchOutcome {
    /// Chunk index, in submission order.
    pub index: usize,
    /// The batch, for proofs and the manifest.
    pub batch: Batch,
    /// Anchoring result.
    pub result: Result<AnchorResult, AnchorError>,
}

/// Per-batch results of certifying a large item set.
///
/// Confirmed batches stay confirmed when later ones fail.
#[derive(Debug, Default)]
pub struct CertificationReport {
    /// One entry per chunk.
    pub batches: Vec<BatchOutcome>,
}

impl CertificationReport {
    /// Chunks that were anchored.
    pub fn anchored(&self) -> impl Iterator<Item = (&Batch, &AnchorResult)> {
        self.batches
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| (&o.batch, r)))
    }

    /// Chunks that failed.
    pub fn failed(&self) -> impl Iterator<Item = (&Batch, &AnchorError)> {
        self.batches
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.batch, e)))
    }

    /// Number of anchored chunks.
    pub fn anchored_count(&self) -> usize {
        self.anchored().count()
    }

    /// Number of failed chunks.
    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// True if every chunk was anchored.
    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Submits batches to a [`CertificationLedger`].
///
/// Cheap to clone; clones share records and the ledger.
pub struct AnchorSubmitter<L> {
    ledger: Arc<L>,
    config: AnchorConfig,
    records: Arc<DashMap<ContentDigest, Arc<Mutex<BatchRecord>>>>,
    journal_file: Option<Arc<JournalFile>>,
}

impl<L> Clone for AnchorSubmitter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            config: self.config.clone(),
            records: Arc::clone(&self.records),
            journal_file: self.journal_file.clone(),
        }
    }
}

impl<L> std::fmt::Debug for AnchorSubmitter<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorSubmitter")
            .field("config", &self.config)
            .field("records", &self.records.len())
            .field("journal", &self.journal_file.as_ref().map(|j| j.path().to_path_buf()))
            .finish()
    }
}

impl<L: CertificationLedger> AnchorSubmitter<L> {
    /// A submitter with no history.
    pub fn new(ledger: Arc<L>, config: AnchorConfig) -> Self {
        Self {
            ledger,
            config,
            records: Arc::new(DashMap::new()),
            journal_file: None,
        }
    }

    /// A submitter that resumes from a journal snapshot. Fails if the
    /// journal was written for another ledger.
    pub fn with_journal(ledger: Arc<L>, config: AnchorConfig, journal: AnchorJournal) -> Result<Self, JournalError> {
        journal.check_ledger(&ledger.ledger_id())?;
        let submitter = Self::new(ledger, config);
        for record in journal.records {
            submitter
                .records
                .insert(record.merkle_root, Arc::new(Mutex::new(record)));
        }
        Ok(submitter)
    }

    /// A submitter that resumes from the journal at `path`, if any, and
    /// keeps it current.
    pub fn open_journal(ledger: Arc<L>, config: AnchorConfig, path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let file = JournalFile::new(path, ledger.ledger_id());
        let journal = file.load()?;
        tracing::debug!(
            path = %file.path().display(),
            records = journal.len(),
            ledger = %ledger.ledger_id(),
            "journal opened"
        );
        let mut submitter = Self::with_journal(ledger, config, journal)?;
        submitter.journal_file = Some(Arc::new(file));
        Ok(submitter)
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// The submission policy.
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    fn slot(&self, batch: &Batch) -> Result<Arc<Mutex<BatchRecord>>, JournalError> {
        let root = batch.merkle_root();
        if let Some(slot) = self.existing_slot(&root) {
            return Ok(slot);
        }
        // Evicted records come back from the journal file.
        let stored = match &self.journal_file {
            Some(file) => file.find(&root)?,
            None => None,
        };
        let record = stored.unwrap_or_else(|| BatchRecord::new(batch));
        Ok(self
            .records
            .entry(root)
            .or_insert_with(|| Arc::new(Mutex::new(record)))
            .clone())
    }

    /// Write `record` to the journal file, if there is one.
    fn persist(&self, record: &BatchRecord) {
        let Some(file) = &self.journal_file else {
            return;
        };
        if let Err(e) = file.upsert([record]) {
            tracing::error!(
                merkle_root = %record.merkle_root,
                path = %file.path().display(),
                error = %e,
                "failed to write anchor journal"
            );
        }
    }

    fn existing_slot(&self, merkle_root: &ContentDigest) -> Option<Arc<Mutex<BatchRecord>>> {
        self.records.get(merkle_root).map(|r| Arc::clone(r.value()))
    }

    /// Anchor a batch, or return the result of an earlier anchoring.
    pub async fn submit(&self, batch: &Batch) -> Result<AnchorResult, AnchorError> {
        if batch.len() > self.config.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: batch.len(),
                max: self.config.max_batch_size,
            }
            .into());
        }

        let slot = self.slot(batch)?;
        let mut record = slot.lock().await;

        if let Some(result) = &record.result {
            tracing::debug!(
                merkle_root = %record.merkle_root,
                batch_id = result.on_chain_batch_id,
                "batch already anchored"
            );
            return Ok(result.clone());
        }
        let outcome = self.run_cycle(&mut record).await;
        self.persist(&record);
        outcome
    }

    async fn run_cycle(&self, record: &mut BatchRecord) -> Result<AnchorResult, AnchorError> {
        let root = record.merkle_root;
        if let Some(result) = self.reconcile_record(record).await.anchored {
            return Ok(result);
        }

        record.state = BatchState::Submitting;
        let mut last_error = String::new();
        for n in 1..=self.config.max_attempts {
            if n > 1 {
                let delay = self.config.backoff_before(n);
                tracing::warn!(
                    merkle_root = %root,
                    attempt = n,
                    max_attempts = self.config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "retrying anchor submission"
                );
                sleep(delay).await;
                if let Some(result) = self.reconcile_record(record).await.anchored {
                    return Ok(result);
                }
            }

            match self.attempt(record).await {
                Attempt::Anchored(result) => return Ok(result),
                Attempt::Retry(error) => {
                    record.last_error = Some(error.clone());
                    last_error = error;
                }
                Attempt::Fatal(error) => {
                    record.state = BatchState::Failed;
                    record.last_error = Some(error.to_string());
                    tracing::warn!(merkle_root = %root, error = %error, "anchor submission aborted");
                    return Err(error);
                }
            }
        }

        record.state = BatchState::Failed;
        tracing::warn!(
            merkle_root = %root,
            attempts = self.config.max_attempts,
            pending = record.pending().count(),
            error = %last_error,
            "anchor submission failed"
        );
        Err(AnchorError::AnchorFailed {
            attempts: self.config.max_attempts,
            last_error,
        })
    }

    async fn attempt(&self, record: &mut BatchRecord) -> Attempt {
        record.attempts += 1;
        let attempt = record.attempts;

        let gas_price_wei = match self.ledger.gas_price().await {
            Ok(price) => price,
            Err(e) => return classify(e),
        };
        if gas_price_wei > self.config.gas_price_ceiling_wei {
            tracing::warn!(
                merkle_root = %record.merkle_root,
                gas_price_wei,
                ceiling_wei = self.config.gas_price_ceiling_wei,
                "gas price above ceiling, not sending"
            );
            return Attempt::Fatal(AnchorError::GasPriceExceeded {
                current_wei: gas_price_wei,
                ceiling_wei: self.config.gas_price_ceiling_wei,
            });
        }

        let request = CertifyRequest {
            merkle_root: record.merkle_root,
            metadata_uri: record.metadata_uri.clone(),
            item_count: record.item_count,
            gas_price_wei,
        };
        let tx_hash = match self.ledger.send_certify(&request).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => return classify(e),
        };
        tracing::info!(
            merkle_root = %record.merkle_root,
            tx_hash = %tx_hash,
            attempt,
            gas_price_wei,
            chain = self.ledger.chain_name(),
            "certify transaction sent"
        );
        record.transactions.push(AnchorTransaction {
            attempt,
            tx_hash,
            gas_price_wei,
            status: AttemptStatus::Pending,
            on_chain_batch_id: None,
            block_number: None,
        });
        self.persist(record);
        let index = record.transactions.len() - 1;
        self.await_confirmation(record, index).await
    }

    /// Poll every pending transaction of `record`, oldest first, until one
    /// is mined, the newest one (`index`) fails, or the confirmation window
    /// closes. An earlier attempt mined first wins over the newest.
    async fn await_confirmation(&self, record: &mut BatchRecord, index: usize) -> Attempt {
        let tx_hash = record.transactions[index].tx_hash.clone();
        let deadline = Instant::now() + self.config.confirmation_timeout();
        loop {
            for i in record.pending_indices() {
                let polled = record.transactions[i].tx_hash.clone();
                let newest = i == index;
                match self.ledger.transaction_status(&polled).await {
                    Ok(TxStatus::Confirmed { batch_id, block_number }) => {
                        return Attempt::Anchored(self.apply_confirmation(record, i, batch_id, block_number, !newest));
                    }
                    Ok(TxStatus::Reverted) => {
                        record.transactions[i].status = AttemptStatus::Reverted;
                        if newest {
                            return Attempt::Retry(LedgerError::Reverted { tx_hash: polled.to_string() }.to_string());
                        }
                    }
                    Ok(TxStatus::Dropped) => {
                        record.transactions[i].status = AttemptStatus::Dropped;
                        if newest {
                            return Attempt::Retry(LedgerError::Dropped { tx_hash: polled.to_string() }.to_string());
                        }
                    }
                    Ok(TxStatus::Pending) => {}
                    Err(e) if newest && !e.is_transient() => return Attempt::Fatal(e.into()),
                    Err(e) => {
                        tracing::debug!(tx_hash = %polled, error = %e, "status poll failed");
                    }
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    tx_hash = %tx_hash,
                    timeout_secs = self.config.confirmation_timeout_secs,
                    "transaction not confirmed in time, leaving it pending"
                );
                return Attempt::Retry(format!(
                    "transaction {tx_hash} not confirmed within {}s",
                    self.config.confirmation_timeout_secs
                ));
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Record that `transactions[index]` was mined. Returns the batch's
    /// winning result, which is this transaction unless another one already
    /// won.
    fn apply_confirmation(
        &self,
        record: &mut BatchRecord,
        index: usize,
        batch_id: u64,
        block_number: u64,
        reconciled: bool,
    ) -> AnchorResult {
        let root = record.merkle_root;
        let tx = &mut record.transactions[index];
        tx.on_chain_batch_id = Some(batch_id);
        tx.block_number = Some(block_number);

        if let Some(winner) = &record.result {
            tx.status = AttemptStatus::Superseded;
            tracing::warn!(
                merkle_root = %root,
                tx_hash = %tx.tx_hash,
                batch_id,
                winning_batch_id = winner.on_chain_batch_id,
                "late confirmation of an abandoned attempt, recorded as superseded"
            );
            return winner.clone();
        }

        tx.status = AttemptStatus::Confirmed;
        let result = AnchorResult {
            merkle_root: root,
            on_chain_batch_id: batch_id,
            tx_hash: tx.tx_hash.clone(),
            block_number,
            attempts: record.attempts,
            reconciled,
        };
        tracing::info!(
            merkle_root = %root,
            batch_id,
            tx_hash = %result.tx_hash,
            block_number,
            attempts = record.attempts,
            reconciled,
            chain = self.ledger.chain_name(),
            "batch anchored"
        );
        record.result = Some(result.clone());
        record.state = BatchState::Anchored;
        record.last_error = None;
        result
    }

    /// Poll every pending transaction of `record` once.
    async fn reconcile_record(&self, record: &mut BatchRecord) -> Reconciled {
        let mut out = Reconciled::default();
        let was_anchored = record.is_anchored();

        for index in record.pending_indices() {
            let tx_hash = record.transactions[index].tx_hash.clone();
            match self.ledger.transaction_status(&tx_hash).await {
                Ok(TxStatus::Confirmed { batch_id, block_number }) => {
                    self.apply_confirmation(record, index, batch_id, block_number, true);
                    if record.transactions[index].status == AttemptStatus::Superseded {
                        out.superseded += 1;
                    }
                    out.changed = true;
                }
                Ok(TxStatus::Reverted) => {
                    record.transactions[index].status = AttemptStatus::Reverted;
                    out.changed = true;
                }
                Ok(TxStatus::Dropped) => {
                    record.transactions[index].status = AttemptStatus::Dropped;
                    out.changed = true;
                }
                Ok(TxStatus::Pending) => {}
                Err(e) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "could not reconcile attempt");
                }
            }
        }

        if !was_anchored {
            out.anchored = record.result.clone();
        }
        out
    }

    /// Resolve pending transactions of one batch. Returns its result if it
    /// is anchored, whether just now or earlier.
    pub async fn reconcile(&self, merkle_root: &ContentDigest) -> Option<AnchorResult> {
        let slot = self.existing_slot(merkle_root)?;
        let mut record = slot.lock().await;
        if self.reconcile_record(&mut record).await.changed {
            self.persist(&record);
        }
        record.result.clone()
    }

    /// Resolve pending transactions of every batch.
    pub async fn reconcile_pending(&self) -> ReconcileSummary {
        let slots: Vec<Arc<Mutex<BatchRecord>>> =
            self.records.iter().map(|r| Arc::clone(r.value())).collect();
        let mut summary = ReconcileSummary::default();
        for slot in slots {
            let mut record = slot.lock().await;
            if !record.has_pending() {
                continue;
            }
            summary.checked += 1;
            let reconciled = self.reconcile_record(&mut record).await;
            if reconciled.anchored.is_some() {
                summary.anchored += 1;
            }
            summary.superseded += reconciled.superseded;
            if reconciled.changed {
                self.persist(&record);
            }
        }
        summary
    }

    /// Drop settled records from memory after writing them to the journal
    /// file. Returns how many were dropped.
    ///
    /// Without a journal file memory is the only copy, so nothing is
    /// evicted. A record in use by a submit is kept.
    pub fn evict_settled(&self) -> Result<usize, JournalError> {
        let Some(file) = &self.journal_file else {
            return Ok(0);
        };
        let settled: Vec<BatchRecord> = self
            .records
            .iter()
            .filter_map(|entry| {
                let record = entry.value().try_lock().ok()?;
                record.is_settled().then(|| record.clone())
            })
            .collect();
        if settled.is_empty() {
            return Ok(0);
        }
        file.upsert(&settled)?;

        let mut evicted = 0;
        for record in &settled {
            let removed = self.records.remove_if(&record.merkle_root, |_, slot| {
                Arc::strong_count(slot) == 1 && slot.try_lock().map(|r| *r == *record).unwrap_or(false)
            });
            if removed.is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Number of records held in memory.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Write every in-memory record to the journal file. A no-op without
    /// one.
    pub async fn flush_journal(&self) -> Result<(), JournalError> {
        let Some(file) = &self.journal_file else {
            return Ok(());
        };
        let journal = self.journal().await;
        file.upsert(&journal.records)?;
        tracing::debug!(path = %file.path().display(), records = journal.len(), "journal flushed");
        Ok(())
    }

    /// Run [`reconcile_pending`](Self::reconcile_pending) every `interval`
    /// until `shutdown` turns true or its sender is dropped.
    pub async fn run_reconciler(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval_ms = interval.as_millis() as u64, "reconciler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.reconcile_pending().await;
                    if summary.anchored > 0 || summary.superseded > 0 {
                        tracing::info!(
                            checked = summary.checked,
                            anchored = summary.anchored,
                            superseded = summary.superseded,
                            "reconciled pending anchor transactions"
                        );
                    }
                    match self.evict_settled() {
                        Ok(0) => {}
                        Ok(evicted) => tracing::debug!(evicted, "evicted settled anchor records"),
                        Err(e) => tracing::warn!(error = %e, "could not evict settled anchor records"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("reconciler stopped");
    }

    /// Snapshot of one batch's record.
    pub async fn record(&self, merkle_root: &ContentDigest) -> Option<BatchRecord> {
        let slot = self.existing_slot(merkle_root)?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    /// Snapshot of the records held in memory, bound to this ledger.
    pub async fn journal(&self) -> AnchorJournal {
        let slots: Vec<Arc<Mutex<BatchRecord>>> =
            self.records.iter().map(|r| Arc::clone(r.value())).collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            records.push(slot.lock().await.clone());
        }
        AnchorJournal::new(self.ledger.ledger_id(), records)
    }

    /// Split `items` into batches of at most `max_batch_size` and anchor
    /// each independently, in order.
    ///
    /// `metadata_uri` is called with the chunk index and its items. Fails
    /// only if `items` is empty; per-batch failures are in the report.
    pub async fn certify_all<F>(
        &self,
        items: Vec<BatchItem>,
        metadata_uri: F,
    ) -> Result<CertificationReport, AnchorError>
    where
        F: FnMut(usize, &[BatchItem]) -> String,
    {
        let mut builder = BatchBuilder::new(self.config.max_batch_size);
        builder.extend(items);
        let batches = builder.build_chunked(metadata_uri)?;
        let total = batches.len();

        let mut report = CertificationReport::default();
        for (index, batch) in batches.into_iter().enumerate() {
            let result = self.submit(&batch).await;
            if let Err(e) = &result {
                tracing::warn!(
                    chunk = index,
                    total,
                    merkle_root = %batch.merkle_root(),
                    error = %e,
                    "batch not anchored"
                );
            }
            report.batches.push(BatchOutcome { index, batch, result });
        }
        tracing::info!(
            batches = total,
            anchored = report.anchored_count(),
            failed = report.failed_count(),
            "certification finished"
        );
        Ok(report)
    }
}

impl<L: CertificationLedger + 'static> AnchorSubmitter<L> {
    /// Run [`submit`](Self::submit) on its own task.
    ///
    /// Dropping or timing out the handle does not cancel the submission.
    pub fn spawn_submit(&self, batch: Batch) -> JoinHandle<Result<AnchorResult, AnchorError>> {
        let this = self.clone();
        tokio::spawn(async move { this.submit(&batch).await })
    }
}

fn classify(e: LedgerError) -> Attempt {
    if e.is_transient() {
        Attempt::Retry(e.to_string())
    } else {
        Attempt::Fatal(e.into())
    }
}
