//! EmbeddingSimilarityScorer — prototype-centroid similarity signal
//!
//! Each domain owns a handful of prototype example texts. Their embeddings
//! are averaged and L2-normalized into a centroid, computed once and cached
//! until the prototype texts change. A message scores
//! `(cosine(message, centroid) + 1) / 2` per domain.
//!
//! Uses a trait-based embedding backend (`Embedder`) so production code can
//! use fastembed-rs while tests use deterministic mock embedders.

use super::types::{SignalObservation, SignalType};
use crate::domain::DomainId;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Why an embedding call produced no vectors.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding returned no results")]
    EmptyResult,
    #[error("embedding model error: {0}")]
    ModelError(String),
}

/// Text-to-vector backend for the prototype similarity signal.
///
/// One vector per input text, in input order; all vectors share one
/// dimension. `FastEmbedEmbedder` behind the `embeddings` feature,
/// deterministic embedders in tests.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

// ---------------------------------------------------------------------------
// FastEmbedEmbedder — production embedder behind `embeddings` feature
// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Messages and prototypes are short; one batch covers a domain's set.
    const BATCH_SIZE: usize = 32;

    /// ONNX embedder; `TextEmbedding::embed` needs `&mut self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEmbedder {
        pub fn new(model: EmbeddingModel) -> Result<Self, EmbeddingError> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            TextEmbedding::try_new(options)
                .map(|m| Self {
                    model: Mutex::new(m),
                })
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))
        }

        /// nomic-embed-text-v1.5
        pub fn default_model() -> Result<Self, EmbeddingError> {
            Self::new(EmbeddingModel::NomicEmbedTextV15)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let vectors = self
                .model
                .lock()
                .map_err(|_| EmbeddingError::ModelError("embedder lock poisoned".to_string()))?
                .embed(texts.to_vec(), Some(BATCH_SIZE))
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            match vectors.len() {
                0 => Err(EmbeddingError::EmptyResult),
                n if n != texts.len() => Err(EmbeddingError::ModelError(format!(
                    "{} vectors for {} texts",
                    n,
                    texts.len()
                ))),
                _ => Ok(vectors),
            }
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

/// Cosine similarity between two vectors.
///
/// A zero vector on either side, or mismatched dimensions, gives 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Map a cosine from [-1, 1] onto [0, 1].
pub fn remap_unit(cosine: f32) -> f64 {
    ((cosine as f64 + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Mean of the vectors, L2-normalized. Empty input or a zero mean stays zero.
pub fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let mut mean = vec![0.0f32; dim];
    let mut used = 0usize;
    for v in vectors.iter().filter(|v| v.len() == dim) {
        for (m, x) in mean.iter_mut().zip(v.iter()) {
            *m += x;
        }
        used += 1;
    }
    for m in mean.iter_mut() {
        *m /= used as f32;
    }
    let norm: f32 = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for m in mean.iter_mut() {
            *m /= norm;
        }
    }
    mean
}

/// Prototype example texts per domain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrototypeSet {
    prototypes: BTreeMap<DomainId, Vec<String>>,
}

impl PrototypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: impl Into<DomainId>, texts: Vec<String>) -> Self {
        self.prototypes.insert(domain.into(), texts);
        self
    }

    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        Self {
            prototypes: map.into_iter().map(|(k, v)| (DomainId::from(k), v)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    pub fn domains(&self) -> impl Iterator<Item = &DomainId> {
        self.prototypes.keys()
    }

    /// Stable fingerprint of all prototype texts; changes invalidate the cache.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (domain, texts) in &self.prototypes {
            domain.hash(&mut hasher);
            texts.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Built-in prototypes for the domains the embedding signal covers.
    pub fn builtin() -> Self {
        let table: &[(&str, [&str; 3])] = &[
            ("openness", [
                "I love exploring unfamiliar ideas and trying things I have never done before.",
                "Abstract art and strange philosophies fascinate me.",
                "I keep imagining different ways the world could work.",
            ]),
            ("conscientiousness", [
                "I planned every step of the week and finished the tasks on schedule.",
                "I double-check my work so nothing is left incomplete.",
                "Keeping my commitments and staying organized matters to me.",
            ]),
            ("extraversion", [
                "I had a blast meeting so many new people at the party.",
                "Talking with a big group energizes me.",
                "I always start the conversation when I walk into a room.",
            ]),
            ("agreeableness", [
                "I just want everyone to get along and feel welcome.",
                "Happy to help you with that, no trouble at all.",
                "I gave them the benefit of the doubt and forgave the mistake.",
            ]),
            ("neuroticism", [
                "I can't stop worrying that something will go wrong.",
                "Little things upset me and I stay upset for hours.",
                "My mood swings from fine to miserable without warning.",
            ]),
            ("creativity", [
                "I sketched a new design and wrote a song about it.",
                "Inventing original solutions is my favourite part of any project.",
                "I combined two unrelated ideas into something new.",
            ]),
            ("curiosity", [
                "I spent the night reading about how octopuses think.",
                "Why does that happen? I need to find out.",
                "I keep asking questions until I understand how it works.",
            ]),
            ("empathy", [
                "I can feel how hard this must be for you.",
                "I noticed she was hurting and sat with her for a while.",
                "Understanding what other people go through matters to me.",
            ]),
            ("optimism", [
                "Things are going to work out, I can feel it.",
                "Every setback is a chance for something better.",
                "I am looking forward to what tomorrow brings.",
            ]),
            ("stress_level", [
                "Deadlines are piling up and I feel completely overwhelmed.",
                "I haven't slept properly all week because of the pressure.",
                "Everything is too much right now and I can't keep up.",
            ]),
            ("analytical_thinking", [
                "If we break the problem into parts the cause becomes clear.",
                "The data suggests a correlation but not causation.",
                "I compared the options systematically before deciding.",
            ]),
            ("resilience", [
                "It knocked me down but I got back up and kept going.",
                "I have survived worse and I will get through this too.",
                "Failure taught me what to try differently next time.",
            ]),
        ];

        let mut set = PrototypeSet::new();
        for (domain, texts) in table {
            set = set.with_domain(*domain, texts.iter().map(|t| t.to_string()).collect());
        }
        set
    }
}

/// Similarity of one message to one domain centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatch {
    pub domain_id: DomainId,
    /// Raw cosine in [-1, 1]
    pub cosine: f32,
    /// Remapped score in [0, 1]
    pub score: f64,
}

struct CentroidCache {
    fingerprint: u64,
    centroids: BTreeMap<DomainId, Vec<f32>>,
}

/// Scores messages against cached per-domain prototype centroids.
///
/// The cache is owned by the scorer instance: built lazily on first use,
/// rebuilt when the prototype fingerprint changes, dropped by `reset()`.
pub struct EmbeddingSimilarityScorer {
    embedder: Arc<dyn Embedder>,
    prototypes: RwLock<PrototypeSet>,
    cache: RwLock<Option<CentroidCache>>,
}

impl EmbeddingSimilarityScorer {
    /// Scorer with the built-in prototypes.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_prototypes(embedder, PrototypeSet::builtin())
    }

    pub fn with_prototypes(embedder: Arc<dyn Embedder>, prototypes: PrototypeSet) -> Self {
        Self {
            embedder,
            prototypes: RwLock::new(prototypes),
            cache: RwLock::new(None),
        }
    }

    /// Replace the prototype texts. The next score rebuilds centroids.
    pub fn set_prototypes(&self, prototypes: PrototypeSet) {
        if let Ok(mut guard) = self.prototypes.write() {
            *guard = prototypes;
        }
    }

    /// Drop cached centroids.
    pub fn reset(&self) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = None;
        }
    }

    /// Whether centroids are cached for the current prototypes.
    pub fn is_cached(&self) -> bool {
        let fingerprint = match self.prototypes.read() {
            Ok(p) => p.fingerprint(),
            Err(_) => return false,
        };
        self.cache
            .read()
            .map(|c| c.as_ref().map_or(false, |c| c.fingerprint == fingerprint))
            .unwrap_or(false)
    }

    /// Build centroids if the cache is empty or stale.
    fn ensure_centroids(&self) -> Result<(), EmbeddingError> {
        if self.is_cached() {
            return Ok(());
        }

        let prototypes = self
            .prototypes
            .read()
            .map_err(|_| EmbeddingError::ModelError("prototype lock poisoned".to_string()))?
            .clone();
        let fingerprint = prototypes.fingerprint();

        let mut centroids = BTreeMap::new();
        for (domain, texts) in &prototypes.prototypes {
            if texts.is_empty() {
                continue;
            }
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = self.embedder.embed_batch(&refs)?;
            if vectors.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            centroids.insert(domain.clone(), centroid(&vectors));
        }

        debug!(domains = centroids.len(), "built prototype centroids");
        let mut cache = self
            .cache
            .write()
            .map_err(|_| EmbeddingError::ModelError("centroid cache lock poisoned".to_string()))?;
        *cache = Some(CentroidCache {
            fingerprint,
            centroids,
        });
        Ok(())
    }

    /// Embed one message. `None` means the signal is absent.
    pub fn embed_message(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed_batch(&[text]) {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.swap_remove(0)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "message embedding unavailable");
                None
            }
        }
    }

    /// Similarity of a message vector against every domain centroid.
    pub fn score(&self, message: &[f32]) -> Result<Vec<EmbeddingMatch>, EmbeddingError> {
        self.ensure_centroids()?;
        let cache = self
            .cache
            .read()
            .map_err(|_| EmbeddingError::ModelError("centroid cache lock poisoned".to_string()))?;
        let Some(cache) = cache.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(cache
            .centroids
            .iter()
            .map(|(domain_id, c)| {
                let cosine = cosine_similarity(message, c);
                EmbeddingMatch {
                    domain_id: domain_id.clone(),
                    cosine,
                    score: remap_unit(cosine),
                }
            })
            .collect())
    }

    /// Embedding observations for a message; empty when the signal is
    /// unavailable. Confidence is the magnitude of the raw cosine.
    pub fn observations(&self, text: &str) -> Vec<SignalObservation> {
        let Some(vector) = self.embed_message(text) else {
            return Vec::new();
        };
        match self.score(&vector) {
            Ok(matches) => matches
                .into_iter()
                .map(|m| {
                    let confidence = (m.cosine.abs() as f64).clamp(0.0, 1.0);
                    SignalObservation::new(m.domain_id, SignalType::Embedding, m.score, confidence)
                        .with_prototype_similarity(m.cosine as f64)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "prototype centroids unavailable");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock embedder that returns predetermined vectors based on text.
    struct MockEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        calls: Arc<AtomicUsize>,
    }

    impl MockEmbedder {
        fn new(vectors: HashMap<String, Vec<f32>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    vectors,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl Embedder for MockEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(texts
                .iter()
                .map(|t| self.vectors.get(*t).cloned().unwrap_or_else(|| vec![0.0; 3]))
                .collect())
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::ModelError("offline".to_string()))
        }
    }

    fn vectors() -> HashMap<String, Vec<f32>> {
        let mut m = HashMap::new();
        m.insert("explore".to_string(), vec![1.0, 0.0, 0.0]);
        m.insert("novelty".to_string(), vec![0.8, 0.2, 0.0]);
        m.insert("worry".to_string(), vec![0.0, 0.0, 1.0]);
        m.insert("msg-open".to_string(), vec![0.9, 0.1, 0.0]);
        m.insert("msg-opposite".to_string(), vec![-1.0, 0.0, 0.0]);
        m
    }

    fn prototypes() -> PrototypeSet {
        PrototypeSet::new()
            .with_domain("openness", vec!["explore".to_string(), "novelty".to_string()])
            .with_domain("neuroticism", vec!["worry".to_string()])
    }

    #[test]
    fn cosine_identities() {
        let v = vec![0.3, -1.2, 2.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
        assert!((remap_unit(cosine_similarity(&v, &v)) - 1.0).abs() < 1e-6);
        assert!(remap_unit(cosine_similarity(&v, &neg)).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_is_zero_not_nan() {
        let a = vec![1.0, 0.0, 0.0];
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn centroid_is_unit_length_mean() {
        let c = centroid(&[vec![2.0, 0.0], vec![0.0, 2.0]]);
        let norm: f32 = c.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((c[0] - c[1]).abs() < 1e-6);
        assert_eq!(centroid(&[vec![0.0, 0.0]]), vec![0.0, 0.0]);
    }

    #[test]
    fn centroids_are_cached_across_scores() {
        let (embedder, calls) = MockEmbedder::new(vectors());
        let scorer = EmbeddingSimilarityScorer::with_prototypes(Arc::new(embedder), prototypes());

        scorer.score(&[1.0, 0.0, 0.0]).unwrap();
        let after_first = calls.load(Ordering::Relaxed);
        assert_eq!(after_first, 2, "one batch per prototype domain");

        scorer.score(&[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), after_first, "cache hit");
    }

    #[test]
    fn changing_prototypes_rebuilds_cache() {
        let (embedder, calls) = MockEmbedder::new(vectors());
        let scorer = EmbeddingSimilarityScorer::with_prototypes(Arc::new(embedder), prototypes());
        scorer.score(&[1.0, 0.0, 0.0]).unwrap();
        assert!(scorer.is_cached());

        scorer.set_prototypes(
            PrototypeSet::new().with_domain("openness", vec!["explore".to_string()]),
        );
        assert!(!scorer.is_cached());

        let matches = scorer.score(&[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn reset_clears_cache() {
        let (embedder, _) = MockEmbedder::new(vectors());
        let scorer = EmbeddingSimilarityScorer::with_prototypes(Arc::new(embedder), prototypes());
        scorer.score(&[1.0, 0.0, 0.0]).unwrap();
        scorer.reset();
        assert!(!scorer.is_cached());
    }

    #[test]
    fn observations_score_close_domains_higher() {
        let (embedder, _) = MockEmbedder::new(vectors());
        let scorer = EmbeddingSimilarityScorer::with_prototypes(Arc::new(embedder), prototypes());
        let obs = scorer.observations("msg-open");
        let open = obs.iter().find(|o| o.domain_id.as_str() == "openness").unwrap();
        let neuro = obs.iter().find(|o| o.domain_id.as_str() == "neuroticism").unwrap();
        assert!(open.score > 0.95);
        assert!((neuro.score - 0.5).abs() < 1e-6, "orthogonal maps to 0.5");
        assert!(neuro.confidence < 1e-6);
        assert_eq!(open.signal_type, SignalType::Embedding);
        assert!(open.prototype_similarity.unwrap() > 0.9);
    }

    #[test]
    fn opposite_message_maps_to_zero() {
        let (embedder, _) = MockEmbedder::new(
            [
                ("explore".to_string(), vec![1.0, 0.0, 0.0]),
                ("msg-opposite".to_string(), vec![-1.0, 0.0, 0.0]),
            ]
            .into_iter()
            .collect(),
        );
        let scorer = EmbeddingSimilarityScorer::with_prototypes(
            Arc::new(embedder),
            PrototypeSet::new().with_domain("openness", vec!["explore".to_string()]),
        );
        let obs = scorer.observations("msg-opposite");
        assert_eq!(obs.len(), 1);
        assert!(obs[0].score.abs() < 1e-6);
        assert!((obs[0].confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn failing_embedder_yields_no_observations() {
        let scorer = EmbeddingSimilarityScorer::new(Arc::new(FailingEmbedder));
        assert!(scorer.observations("anything").is_empty());
        assert!(!scorer.is_cached());
    }

    #[test]
    fn builtin_prototypes_fingerprint_is_stable() {
        assert_eq!(PrototypeSet::builtin().fingerprint(), PrototypeSet::builtin().fingerprint());
        assert_ne!(PrototypeSet::builtin().fingerprint(), PrototypeSet::new().fingerprint());
    }
}
