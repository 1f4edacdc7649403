//! Persistence handle for the verbum engine.
//!
//! Live state is held by the engine's components; the store only makes it
//! durable. With a data directory, [`DurableStore`](durable::DurableStore)
//! applies every [`Batch`] in one redb transaction and is read back once at
//! startup. Without one, commits are accepted and dropped, and a restart
//! begins empty.
//!
//! A [`Store`] is constructed once at engine start and shared by reference.

pub mod durable;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single write within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// Writes applied together or not at all.
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `value` and queue it under `key`.
    pub fn put<T: Serialize>(&mut self, key: String, value: &T) -> StoreResult<()> {
        let value = encode(value)?;
        self.ops.push(WriteOp::Put { key, value });
        Ok(())
    }

    pub fn delete(&mut self, key: String) {
        self.ops.push(WriteOp::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode record: {e}"),
    })
}

pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to decode {key}: {e}"),
    })
}

/// Optional durable tier behind one commit/read interface.
#[derive(Debug)]
pub struct Store {
    durable: Option<durable::DurableStore>,
}

impl Store {
    /// Create a memory-only store (no persistence).
    pub fn memory_only() -> Self {
        Self { durable: None }
    }

    /// Open or create a durable store under `data_dir`.
    pub fn with_persistence(data_dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            durable: Some(durable::DurableStore::open(data_dir)?),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.durable.is_some()
    }

    /// Apply `batch` atomically. A no-op without a durable tier.
    pub fn commit(&self, batch: Batch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(durable) = &self.durable {
            durable.apply(&batch.ops)?;
            tracing::trace!(ops = batch.len(), "store batch committed");
        }
        Ok(())
    }

    /// Read and decode one record.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match &self.durable {
            Some(d) => d.get(key)?.map(|bytes| decode(key, &bytes)).transpose(),
            None => Ok(None),
        }
    }

    /// Decode every record under `prefix`, in key order.
    pub fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<T>> {
        let raw = match &self.durable {
            Some(d) => d.scan_prefix(prefix)?,
            None => Vec::new(),
        };
        raw.iter().map(|(key, bytes)| decode(key, bytes)).collect()
    }
}

/// Key layout. Ids never contain `/`, so every namespace is prefix-safe.
pub mod keys {
    use crate::ids::{DomainId, MedallionId, RunId, UserId};
    use crate::settlement::ClaimKey;

    pub const CONTRIBUTOR: &str = "cwm/";
    pub const DOMAIN_WORDMAP: &str = "dwm/";
    pub const OWNERSHIP: &str = "own/";
    pub const CLAIM: &str = "claim/";
    pub const WEIGHT: &str = "weight/";
    pub const ACTIVITY: &str = "act/";
    pub const RUN: &str = "run/";
    pub const MEDALLION: &str = "med/";
    pub const ESCROW: &str = "escrow/";
    pub const AUDIT: &str = "audit/";
    pub const TREASURY: &str = "treasury";

    pub fn contributor(user: &UserId) -> String {
        format!("{CONTRIBUTOR}{user}")
    }

    pub fn domain_wordmap(domain: &DomainId) -> String {
        format!("{DOMAIN_WORDMAP}{domain}")
    }

    pub fn ownership(domain: &DomainId, user: &UserId) -> String {
        format!("{OWNERSHIP}{domain}/{user}")
    }

    pub fn claim(key: &ClaimKey) -> String {
        format!("{CLAIM}{}/{}/{}", key.domain, key.user, key.content_hash)
    }

    pub fn weight(user: &UserId) -> String {
        format!("{WEIGHT}{user}")
    }

    pub fn activity(user: &UserId) -> String {
        format!("{ACTIVITY}{user}")
    }

    pub fn run(run_id: &RunId) -> String {
        format!("{RUN}{run_id}")
    }

    /// Zero-padded so key order is id order.
    pub fn medallion(id: MedallionId) -> String {
        format!("{MEDALLION}{:020}", id.get())
    }

    pub fn escrow(user: &UserId) -> String {
        format!("{ESCROW}{user}")
    }

    pub fn audit(seq: u64) -> String {
        format!("{AUDIT}{seq:020}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        value: u64,
    }

    fn record(name: &str, value: u64) -> Record {
        Record {
            name: name.into(),
            value,
        }
    }

    #[test]
    fn memory_only_accepts_commits_without_keeping_them() {
        let store = Store::memory_only();
        assert!(!store.is_persistent());
        let mut batch = Batch::new();
        batch.put("r/a".into(), &record("a", 1)).unwrap();
        batch.put("r/b".into(), &record("b", 2)).unwrap();
        assert_eq!(batch.len(), 2);
        store.commit(batch).unwrap();

        assert_eq!(store.get::<Record>("r/a").unwrap(), None);
        assert!(store.scan_prefix::<Record>("r/").unwrap().is_empty());
    }

    #[test]
    fn durable_commit_and_scan() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::with_persistence(dir.path()).unwrap();
        let mut batch = Batch::new();
        batch.put("r/b".into(), &record("b", 2)).unwrap();
        batch.put("r/a".into(), &record("a", 1)).unwrap();
        batch.put("s/z".into(), &record("z", 3)).unwrap();
        store.commit(batch).unwrap();

        assert_eq!(store.get::<Record>("r/a").unwrap(), Some(record("a", 1)));
        let all: Vec<Record> = store.scan_prefix("r/").unwrap();
        assert_eq!(all, vec![record("a", 1), record("b", 2)]);
    }

    #[test]
    fn delete_removes_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::with_persistence(dir.path()).unwrap();
        let mut batch = Batch::new();
        batch.put("r/a".into(), &record("a", 1)).unwrap();
        store.commit(batch).unwrap();

        let mut batch = Batch::new();
        batch.delete("r/a".into());
        store.commit(batch).unwrap();
        assert_eq!(store.get::<Record>("r/a").unwrap(), None);
        assert!(store.scan_prefix::<Record>("r/").unwrap().is_empty());
    }

    #[test]
    fn durable_records_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = Store::with_persistence(dir.path()).unwrap();
            let mut batch = Batch::new();
            batch.put("r/x".into(), &record("x", 9)).unwrap();
            store.commit(batch).unwrap();
        }
        let store = Store::with_persistence(dir.path()).unwrap();
        assert_eq!(store.get::<Record>("r/x").unwrap(), Some(record("x", 9)));
    }

    #[test]
    fn medallion_keys_sort_numerically() {
        let nine = keys::medallion(crate::ids::MedallionId::new(9).unwrap());
        let ten = keys::medallion(crate::ids::MedallionId::new(10).unwrap());
        assert!(nine < ten);
    }
}
