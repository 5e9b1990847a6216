//! Signal extraction and fusion
//!
//! Three independent extractors produce per-domain observations:
//! - `lexicon`: word-list frequencies (pure, per message)
//! - `embedding`: similarity to prototype centroids (pure given the embedder)
//! - `deep`: batched generative-model assessment
//!
//! `fusion` combines them into one confidence-weighted score per domain.

pub mod deep;
pub mod embedding;
pub mod fusion;
pub mod lexicon;
mod types;

pub use deep::{
    AssessmentErrorKind, BatchTrigger, DeepAnalysis, DeepAnalyzer, DeepBatch, DeepSignalAdapter,
    DeepSignalError, DomainAssessment, LlmDeepAnalyzer, QueuedMessage,
};
#[cfg(feature = "embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{
    cosine_similarity, Embedder, EmbeddingError, EmbeddingSimilarityScorer, PrototypeSet,
};
pub use fusion::{FusedScore, FusionWeights, SignalFusionEngine};
pub use lexicon::{LexiconAnalysis, LexiconCategory, LexiconSignalExtractor};
pub use types::{SignalObservation, SignalRecord, SignalType};
