//! Signal observation types shared by the extractors and the fusion engine

use crate::domain::DomainId;
use serde::{Deserialize, Serialize};

/// Which extractor produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Lexicon,
    Embedding,
    Llm,
}

impl SignalType {
    pub const ALL: [SignalType; 3] = [SignalType::Lexicon, SignalType::Embedding, SignalType::Llm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexicon => "lexicon",
            Self::Embedding => "embedding",
            Self::Llm => "llm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signal's reading for one domain, produced fresh per fusion cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalObservation {
    pub domain_id: DomainId,
    pub signal_type: SignalType,
    pub score: f64,
    pub confidence: f64,
    /// Fusion weight as a fraction (0.0–1.0)
    pub weight: f64,
    pub evidence: Option<String>,
    /// Lexicon hits backing the score
    pub matched_words: Vec<String>,
    /// Raw cosine against the domain prototype (embedding signal only)
    pub prototype_similarity: Option<f64>,
}

impl SignalObservation {
    pub fn new(domain_id: DomainId, signal_type: SignalType, score: f64, confidence: f64) -> Self {
        Self {
            domain_id,
            signal_type,
            score,
            confidence,
            weight: 0.0,
            evidence: None,
            matched_words: Vec::new(),
            prototype_similarity: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_matched_words(mut self, words: Vec<String>) -> Self {
        self.matched_words = words;
        self
    }

    pub fn with_prototype_similarity(mut self, similarity: f64) -> Self {
        self.prototype_similarity = Some(similarity);
        self
    }
}

/// The last observation of a signal for a domain, as persisted in
/// `hybrid_signal_scores` (unique on domain × signal type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub domain_id: DomainId,
    pub signal_type: SignalType,
    pub score: f64,
    pub confidence: f64,
    pub weight_used: f64,
    pub evidence: Option<String>,
    #[serde(default)]
    pub matched_words: Vec<String>,
    pub prototype_similarity: Option<f64>,
}

impl From<&SignalObservation> for SignalRecord {
    fn from(obs: &SignalObservation) -> Self {
        Self {
            domain_id: obs.domain_id.clone(),
            signal_type: obs.signal_type,
            score: obs.score,
            confidence: obs.confidence,
            weight_used: obs.weight,
            evidence: obs.evidence.clone(),
            matched_words: obs.matched_words.clone(),
            prototype_similarity: obs.prototype_similarity,
        }
    }
}
