//! Persisted submission state.
//!
//! A journal is a JSON snapshot of every [`BatchRecord`] a submitter knows,
//! bound to the ledger it was written for. Loading it into a new submitter
//! keeps the no-double-anchor guarantee across process restarts: an
//! anchored root is answered from the journal, and transactions left
//! pending by a crash are reconciled before any new attempt.
//!
//! A submitter opened on a [`JournalFile`] rewrites the file after every
//! broadcast and every settled batch, so a crash loses nothing that was
//! sent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use gitchain_core::ContentDigest;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::JournalError;
use crate::record::BatchRecord;

/// Journal format version.
pub const JOURNAL_VERSION: u32 = 2;

/// Snapshot of all batch records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorJournal {
    /// Format version, [`JOURNAL_VERSION`].
    pub version: u32,
    /// Ledger the records were anchored on, see
    /// [`CertificationLedger::ledger_id`](crate::CertificationLedger::ledger_id).
    /// Unset only while the journal is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<String>,
    /// Records ordered by Merkle root.
    pub records: Vec<BatchRecord>,
}

impl Default for AnchorJournal {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            ledger: None,
            records: Vec::new(),
        }
    }
}

impl AnchorJournal {
    /// A journal of `records` anchored on `ledger`, sorted by root for
    /// stable output.
    pub fn new(ledger: impl Into<String>, mut records: Vec<BatchRecord>) -> Self {
        records.sort_by(|a, b| a.merkle_root.cmp(&b.merkle_root));
        Self {
            version: JOURNAL_VERSION,
            ledger: Some(ledger.into()),
            records,
        }
    }

    /// Fail unless this journal may be used with `ledger_id`. An empty
    /// journal fits any ledger.
    pub fn check_ledger(&self, ledger_id: &str) -> Result<(), JournalError> {
        match &self.ledger {
            Some(id) if id == ledger_id => Ok(()),
            None if self.records.is_empty() => Ok(()),
            other => Err(JournalError::LedgerMismatch {
                journal: other.clone().unwrap_or_else(|| "<unbound>".to_string()),
                ledger: ledger_id.to_string(),
            }),
        }
    }

    /// Read a journal file.
    pub fn load(path: &Path) -> Result<Self, JournalError> {
        let bytes = fs::read(path)?;
        let journal: Self = serde_json::from_slice(&bytes)?;
        if journal.version != JOURNAL_VERSION {
            return Err(JournalError::UnsupportedVersion {
                found: journal.version,
                expected: JOURNAL_VERSION,
            });
        }
        Ok(journal)
    }

    /// Read a journal file, or start empty if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, JournalError> {
        match Self::load(path) {
            Err(JournalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            other => other,
        }
    }

    /// Write the journal atomically: temp file in the same directory, then
    /// rename.
    pub fn save(&self, path: &Path) -> Result<(), JournalError> {
        let json = serde_json::to_vec_pretty(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "journal".to_string());
        let tmp = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));
        let written = (|| -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
            fs::rename(&tmp, path)
        })();
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written.map_err(JournalError::from)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A journal on disk, bound to one ledger.
///
/// Every update re-reads the file and replaces the touched records, so the
/// file stays the complete history even when a submitter evicts settled
/// records from memory.
#[derive(Debug)]
pub struct JournalFile {
    path: PathBuf,
    ledger_id: String,
    lock: Mutex<()>,
}

impl JournalFile {
    /// A handle on `path` for records anchored on `ledger_id`.
    pub fn new(path: impl Into<PathBuf>, ledger_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ledger_id: ledger_id.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents. A missing file is an empty journal; a journal of
    /// another ledger is an error.
    pub fn load(&self) -> Result<AnchorJournal, JournalError> {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// The record for `merkle_root`, if the file has one.
    pub fn find(&self, merkle_root: &ContentDigest) -> Result<Option<BatchRecord>, JournalError> {
        Ok(self
            .load()?
            .records
            .into_iter()
            .find(|r| r.merkle_root == *merkle_root))
    }

    /// Insert or replace `records` and write the file.
    pub fn upsert<'a>(&self, records: impl IntoIterator<Item = &'a BatchRecord>) -> Result<(), JournalError> {
        let _guard = self.lock.lock();
        let mut all = self.load_unlocked()?.records;
        for record in records {
            match all.iter_mut().find(|r| r.merkle_root == record.merkle_root) {
                Some(existing) => *existing = record.clone(),
                None => all.push(record.clone()),
            }
        }
        AnchorJournal::new(self.ledger_id.clone(), all).save(&self.path)
    }

    fn load_unlocked(&self) -> Result<AnchorJournal, JournalError> {
        let journal = AnchorJournal::load_or_default(&self.path)?;
        journal.check_ledger(&self.ledger_id)?;
        Ok(journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Batch, BatchItem};
    use gitchain_core::{ContainerRef, ContentDigest};

    fn record(n: u8) -> BatchRecord {
        let item = BatchItem::new(
            ContainerRef::parse(&format!("0711:memory:agents:s{n}:v1")).unwrap(),
            ContentDigest::from_bytes([n; 32]),
        );
        BatchRecord::new(&Batch::new(vec![item], format!("mem://{n}"), 1).unwrap())
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.json");
        let journal = AnchorJournal::new("memory:test", vec![record(9), record(1)]);
        assert!(journal.records[0].merkle_root < journal.records[1].merkle_root);
        journal.save(&path).unwrap();

        let loaded = AnchorJournal::load(&path).unwrap();
        assert_eq!(loaded, journal);
        assert_eq!(loaded.len(), 2);

        // No temp files left behind.
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn missing_file_is_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AnchorJournal::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(journal.is_empty());
        assert!(AnchorJournal::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn wrong_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");
        fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();
        assert!(matches!(
            AnchorJournal::load(&path),
            Err(JournalError::UnsupportedVersion { found: 99, .. })
        ));
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            AnchorJournal::load_or_default(&path),
            Err(JournalError::Serialization(_))
        ));
    }

    #[test]
    fn journal_is_bound_to_its_ledger() {
        let journal = AnchorJournal::new("memory:a", vec![record(1)]);
        assert!(journal.check_ledger("memory:a").is_ok());
        assert!(matches!(
            journal.check_ledger("memory:b"),
            Err(JournalError::LedgerMismatch { ref journal, ref ledger }) if journal == "memory:a" && ledger == "memory:b"
        ));

        assert!(AnchorJournal::default().check_ledger("memory:b").is_ok());
        let unbound = AnchorJournal {
            ledger: None,
            ..journal
        };
        assert!(unbound.check_ledger("memory:a").is_err());
    }

    #[test]
    fn journal_file_upserts_by_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = JournalFile::new(dir.path().join("j.json"), "memory:a");
        assert!(file.load().unwrap().is_empty());

        let mut first = record(1);
        file.upsert([&first, &record(2)]).unwrap();
        first.last_error = Some("timed out".into());
        file.upsert([&first]).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.ledger.as_deref(), Some("memory:a"));
        let found = file.find(&first.merkle_root).unwrap().unwrap();
        assert_eq!(found.last_error.as_deref(), Some("timed out"));
        assert!(file.find(&ContentDigest::from_bytes([7; 32])).unwrap().is_none());

        let other = JournalFile::new(dir.path().join("j.json"), "memory:b");
        assert!(matches!(other.load(), Err(JournalError::LedgerMismatch { .. })));
        assert!(other.upsert([&record(3)]).is_err());
        assert_eq!(file.load().unwrap().len(), 2);
    }
}
