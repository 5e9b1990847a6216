//! Accumulated score records

use super::catalog::{category_of, DomainCategory};
use super::context_type::ContextType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Neutral prior score for a domain with no data.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Identifier for a psychological domain (e.g. "openness")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> DomainCategory {
        category_of(&self.0)
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DomainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DomainId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Online weighted mean: fold `new_points` samples of `new_score` into a
/// mean built from `cur_count` samples.
///
/// Returns `None` when `new_points` is zero (no-op). A record with no prior
/// data takes the new score as-is.
pub fn weighted_mean_update(
    cur_score: f64,
    cur_count: u64,
    new_score: f64,
    new_points: u64,
) -> Option<(f64, u64)> {
    if new_points == 0 {
        return None;
    }
    if cur_count == 0 {
        return Some((new_score, new_points));
    }
    let total = cur_count + new_points;
    let score = (cur_score * cur_count as f64 + new_score * new_points as f64) / total as f64;
    Some((score, total))
}

/// The accumulated estimate for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain_id: DomainId,
    pub category: DomainCategory,
    pub score: f64,
    pub confidence: f64,
    pub data_points_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl DomainScore {
    /// A fresh record carrying the neutral prior.
    pub fn neutral(domain_id: DomainId) -> Self {
        Self {
            category: domain_id.category(),
            domain_id,
            score: NEUTRAL_SCORE,
            confidence: 0.0,
            data_points_count: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.data_points_count > 0
    }

    /// Fold a contribution into this record. Returns false on a no-op.
    pub fn apply(&mut self, new_score: f64, new_points: u64) -> bool {
        match weighted_mean_update(self.score, self.data_points_count, new_score, new_points) {
            Some((score, count)) => {
                self.score = score;
                self.data_points_count = count;
                self.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }
}

/// The accumulated estimate for one domain within one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDomainScore {
    pub domain_id: DomainId,
    pub context_type: ContextType,
    pub score: f64,
    pub confidence: f64,
    pub data_points_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl ContextDomainScore {
    pub fn neutral(domain_id: DomainId, context_type: ContextType) -> Self {
        Self {
            domain_id,
            context_type,
            score: NEUTRAL_SCORE,
            confidence: 0.0,
            data_points_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Fold a contribution in. Confidence follows the same count-weighted
    /// running mean as the score.
    pub fn apply(&mut self, new_score: f64, new_confidence: f64, new_points: u64) -> bool {
        let prior_count = self.data_points_count;
        match weighted_mean_update(self.score, prior_count, new_score, new_points) {
            Some((score, count)) => {
                if let Some((confidence, _)) =
                    weighted_mean_update(self.confidence, prior_count, new_confidence, new_points)
                {
                    self.confidence = confidence;
                }
                self.score = score;
                self.data_points_count = count;
                self.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }
}
