//! Common test utilities for idiolect integration tests
//!
//! Deterministic stand-ins for the external pieces: a hashing embedder, a
//! key-value store that counts and can fail writes, and helpers for
//! building deep-signal responses.

#![allow(dead_code)]

use idiolect::storage::{KeyValueStore, MemoryStore, StorageError, StorageResult};
use idiolect::{Embedder, EmbeddingError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: each lowercase token is hashed into one of
/// `DIMENSIONS` buckets, then the vector is L2-normalized. Texts sharing
/// words get positive cosine similarity.
pub struct HashEmbedder {
    calls: Arc<AtomicUsize>,
}

impl HashEmbedder {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() as usize) % DIMENSIONS] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }
}

/// Embedder whose backend is gone.
pub struct DownEmbedder;

impl Embedder for DownEmbedder {
    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ModelError("model not loaded".to_string()))
    }
}

/// Memory store that counts `set` calls and can fail the next N of them.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    sets: AtomicUsize,
    fail_next: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}

/// A deep-signal response assessing `(domain, score, confidence)` triples.
pub fn deep_response(domains: &[(&str, f64, f64)], topics: &[&str]) -> String {
    let mut map = serde_json::Map::new();
    for (domain, score, confidence) in domains {
        map.insert(
            domain.to_string(),
            serde_json::json!({
                "score": score,
                "confidence": confidence,
                "evidence": format!("messages suggest {}", domain),
            }),
        );
    }
    serde_json::json!({ "domains": map, "topics": topics }).to_string()
}

/// Messages that each hit several lexicon categories.
pub fn sample_messages() -> Vec<&'static str> {
    vec![
        "My boss moved the meeting again and I think we should plan better.",
        "I feel so happy and grateful for my friends this weekend.",
        "Honestly I worry about money and the rent every month.",
        "We went hiking and played games at the park, it was fun.",
        "I wonder why the theory fails; let me analyze the data carefully.",
        "My mom and dad came over and we cooked dinner at home.",
        "I'm stressed about the deadline and can't sleep.",
        "I painted a new picture and wrote a song about it.",
    ]
}
