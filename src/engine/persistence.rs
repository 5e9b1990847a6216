//! Snapshot persistence with a debounced flush
//!
//! Engine state is written as JSON rows, one key per table. Mutations only
//! mark the state dirty; a ticker writes at most once per interval, so a
//! burst of updates coalesces into one write. A failed write leaves the
//! state dirty and is retried on the next tick.

use crate::domain::{ContextDomainScore, DomainScore};
use crate::relationship::RelationshipTriple;
use crate::scores::FactorRecord;
use crate::signal::{FusionWeights, SignalRecord};
use crate::storage::{KeyValueStore, StorageResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const DOMAIN_SCORES_KEY: &str = "domain_scores";
pub const CONTEXT_SCORES_KEY: &str = "context_domain_scores";
pub const SIGNAL_SCORES_KEY: &str = "hybrid_signal_scores";
pub const TRIPLES_KEY: &str = "relationship_triples";
pub const CONFIDENCE_FACTORS_KEY: &str = "confidence_factors";
pub const FUSION_WEIGHTS_KEY: &str = "settings:fusion_weights";
pub const TOPICS_KEY: &str = "topics";

/// Everything the engine persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub domain_scores: Vec<DomainScore>,
    pub context_domain_scores: Vec<ContextDomainScore>,
    pub hybrid_signal_scores: Vec<SignalRecord>,
    pub relationship_triples: Vec<RelationshipTriple>,
    pub confidence_factors: Vec<FactorRecord>,
    pub fusion_weights: Option<FusionWeights>,
    pub topics: Vec<String>,
}

fn encode<T: Serialize>(key: &'static str, value: &T) -> StorageResult<(&'static str, Vec<u8>)> {
    Ok((key, serde_json::to_vec(value)?))
}

fn fetch<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

impl Snapshot {
    /// Every table is encoded before anything is written, then all keys go
    /// to the store in one `set_many`.
    pub fn write(&self, store: &dyn KeyValueStore) -> StorageResult<()> {
        let mut entries = vec![
            encode(DOMAIN_SCORES_KEY, &self.domain_scores)?,
            encode(CONTEXT_SCORES_KEY, &self.context_domain_scores)?,
            encode(SIGNAL_SCORES_KEY, &self.hybrid_signal_scores)?,
            encode(TRIPLES_KEY, &self.relationship_triples)?,
            encode(CONFIDENCE_FACTORS_KEY, &self.confidence_factors)?,
            encode(TOPICS_KEY, &self.topics)?,
        ];
        if let Some(weights) = &self.fusion_weights {
            entries.push(encode(FUSION_WEIGHTS_KEY, weights)?);
        }
        store.set_many(&entries)
    }

    /// Missing keys read as empty tables.
    pub fn read(store: &dyn KeyValueStore) -> StorageResult<Self> {
        Ok(Self {
            domain_scores: fetch(store, DOMAIN_SCORES_KEY)?.unwrap_or_default(),
            context_domain_scores: fetch(store, CONTEXT_SCORES_KEY)?.unwrap_or_default(),
            hybrid_signal_scores: fetch(store, SIGNAL_SCORES_KEY)?.unwrap_or_default(),
            relationship_triples: fetch(store, TRIPLES_KEY)?.unwrap_or_default(),
            confidence_factors: fetch(store, CONFIDENCE_FACTORS_KEY)?.unwrap_or_default(),
            fusion_weights: fetch(store, FUSION_WEIGHTS_KEY)?,
            topics: fetch(store, TOPICS_KEY)?.unwrap_or_default(),
        })
    }
}

/// The store plus the dirty flag the ticker watches.
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    dirty: AtomicBool,
    writes: AtomicU64,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            dirty: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Snapshot writes performed so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Write `snapshot` if dirty. The flag is cleared before the write so
    /// mutations during it are not lost; on failure it is set again.
    pub fn write_if_dirty(&self, snapshot: impl FnOnce() -> Snapshot) -> StorageResult<bool> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        match snapshot().write(self.store.as_ref()) {
            Ok(()) => {
                let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(writes = n, "snapshot persisted");
                Ok(true)
            }
            Err(e) => {
                self.mark_dirty();
                Err(e)
            }
        }
    }

    /// Write unconditionally and ask the backend to make it durable.
    pub fn flush(&self, snapshot: Snapshot) -> StorageResult<()> {
        self.dirty.store(false, Ordering::Release);
        let result = snapshot
            .write(self.store.as_ref())
            .and_then(|_| self.store.flush());
        match result {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.mark_dirty();
                Err(e)
            }
        }
    }

    pub fn load(&self) -> StorageResult<Snapshot> {
        Snapshot::read(self.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainId;
    use crate::storage::{MemoryStore, StorageError};

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &[u8]) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
        fn flush(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn snapshot() -> Snapshot {
        let mut score = DomainScore::neutral(DomainId::from("openness"));
        score.apply(0.7, 2);
        Snapshot {
            domain_scores: vec![score],
            fusion_weights: Some(FusionWeights::default()),
            topics: vec!["travel".to_string()],
            ..Snapshot::default()
        }
    }

    #[test]
    fn write_then_read() {
        let store = MemoryStore::new();
        let snap = snapshot();
        snap.write(&store).unwrap();
        assert_eq!(Snapshot::read(&store).unwrap(), snap);
    }

    #[test]
    fn empty_store_reads_empty_snapshot() {
        assert_eq!(Snapshot::read(&MemoryStore::new()).unwrap(), Snapshot::default());
    }

    #[test]
    fn clean_state_is_not_written() {
        let p = Persistence::new(Arc::new(MemoryStore::new()));
        assert!(!p.write_if_dirty(snapshot).unwrap());
        p.mark_dirty();
        assert!(p.write_if_dirty(snapshot).unwrap());
        assert!(!p.is_dirty());
        assert_eq!(p.writes(), 1);
    }

    #[test]
    fn failed_write_stays_dirty() {
        let p = Persistence::new(Arc::new(BrokenStore));
        p.mark_dirty();
        assert!(p.write_if_dirty(snapshot).is_err());
        assert!(p.is_dirty());
        assert!(p.flush(snapshot()).is_err());
        assert!(p.is_dirty());
        assert_eq!(p.writes(), 0);
    }
}
