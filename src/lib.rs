//! idiolect: multi-signal psychological profiling from text
//!
//! Turns several independent, noisy signals extracted from a person's
//! messages into one persisted, confidence-weighted estimate per
//! psychological domain, decomposable by situational context.
//!
//! # Core Concepts
//!
//! - **Signals**: lexicon word-category frequencies, embedding similarity to
//!   domain prototypes, and a batched generative-model assessment
//! - **Fusion**: a confidence-weighted combination of the signals per domain
//! - **Scores**: online weighted means keyed by accumulated sample count,
//!   aggregate and per context
//! - **Contexts**: ten situational categories detected from keywords and
//!   patterns, with cross-context variance analysis
//! - **Relationships**: triples derived from the aggregate scores
//!
//! # Example
//!
//! ```
//! use idiolect::{AnalysisEngine, EngineConfig};
//!
//! let engine = AnalysisEngine::new(EngineConfig::default());
//! let report = engine.process_message("My boss moved the meeting again");
//! assert_eq!(report.context.primary.as_str(), "work_professional");
//! ```

pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
mod error;
pub mod model;
pub mod relationship;
pub mod scores;
pub mod signal;
pub mod storage;

pub use config::{EngineConfig, ModelCommandConfig};
pub use context::{ContextClassification, ContextClassifier, ContextVariation, ContextVarianceAnalyzer};
pub use domain::{ContextDomainScore, ContextType, DomainCategory, DomainId, DomainScore};
pub use engine::{AnalysisEngine, DeepReport, DomainUpdate, MessageReport, Snapshot, Ticker};
pub use error::{IdiolectError, IdiolectResult};
pub use model::{CommandModel, GenerativeModel, MockModel, ModelError};
pub use relationship::{Predicate, RelationshipGraphBuilder, RelationshipTriple, TripleStore};
pub use scores::{ConfidenceFactor, ContextScoreStore, DomainScoreStore};
pub use signal::{
    DeepAnalyzer, DeepSignalAdapter, Embedder, EmbeddingError, EmbeddingSimilarityScorer,
    FusionWeights, LexiconSignalExtractor, SignalFusionEngine, SignalObservation, SignalRecord,
    SignalType,
};
pub use storage::{KeyValueStore, MemoryStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
