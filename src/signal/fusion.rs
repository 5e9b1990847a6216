//! SignalFusionEngine — confidence-weighted combination of signals
//!
//! ```text
//! score      = Σ(sᵢ·wᵢ·cᵢ) / Σ(wᵢ·cᵢ)
//! confidence = Σ(cᵢ·wᵢ)    / Σ(wᵢ)
//! ```
//!
//! A zero denominator yields the neutral prior (0.5, 0).

use super::types::{SignalObservation, SignalType};
use crate::domain::NEUTRAL_SCORE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fusion weights in whole percent, always summing to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub lexicon: u32,
    pub embedding: u32,
    pub llm: u32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexicon: 20,
            embedding: 30,
            llm: 50,
        }
    }
}

impl FusionWeights {
    pub const TOTAL: u32 = 100;

    /// Build from arbitrary parts. A triple that does not sum to 100 is
    /// rescaled proportionally; an all-zero triple falls back to defaults.
    pub fn from_parts(lexicon: u32, embedding: u32, llm: u32) -> Self {
        let sum = lexicon as u64 + embedding as u64 + llm as u64;
        if sum == Self::TOTAL as u64 {
            return Self {
                lexicon,
                embedding,
                llm,
            };
        }
        if sum == 0 {
            warn!("all fusion weights zero, using defaults");
            return Self::default();
        }
        let raw = [lexicon, embedding, llm];
        let parts = distribute(&raw, Self::TOTAL);
        let corrected = Self {
            lexicon: parts[0],
            embedding: parts[1],
            llm: parts[2],
        };
        warn!(
            sum,
            lexicon = corrected.lexicon,
            embedding = corrected.embedding,
            llm = corrected.llm,
            "fusion weights redistributed"
        );
        corrected
    }

    pub fn get(&self, signal: SignalType) -> u32 {
        match signal {
            SignalType::Lexicon => self.lexicon,
            SignalType::Embedding => self.embedding,
            SignalType::Llm => self.llm,
        }
    }

    fn slot(&mut self, signal: SignalType) -> &mut u32 {
        match signal {
            SignalType::Lexicon => &mut self.lexicon,
            SignalType::Embedding => &mut self.embedding,
            SignalType::Llm => &mut self.llm,
        }
    }

    /// Weight as a fraction of the total.
    pub fn fraction(&self, signal: SignalType) -> f64 {
        self.get(signal) as f64 / Self::TOTAL as f64
    }

    /// Sum of the three weights, `None` if it overflows `u32`.
    pub fn checked_sum(&self) -> Option<u32> {
        self.lexicon
            .checked_add(self.embedding)?
            .checked_add(self.llm)
    }

    pub fn sum(&self) -> u32 {
        self.lexicon
            .saturating_add(self.embedding)
            .saturating_add(self.llm)
    }

    /// Move one slider. The other two are rescaled proportionally to their
    /// previous values so the total stays 100; the rounding residual goes to
    /// the larger untouched weight (first in enumeration order on a tie).
    pub fn set_weight(&mut self, signal: SignalType, value: u32) {
        let value = value.min(Self::TOTAL);
        let remaining = Self::TOTAL - value;
        let others: Vec<SignalType> = SignalType::ALL
            .iter()
            .copied()
            .filter(|s| *s != signal)
            .collect();

        let prior: Vec<u32> = others.iter().map(|s| self.get(*s)).collect();
        let prior_sum: u32 = prior.iter().sum();

        let shares: Vec<u32> = if prior_sum == 0 {
            // No proportions to preserve: split evenly.
            let base = remaining / others.len() as u32;
            let mut shares = vec![base; others.len()];
            shares[0] += remaining - base * others.len() as u32;
            shares
        } else {
            let mut shares: Vec<u32> = prior
                .iter()
                .map(|p| ((*p as u64 * remaining as u64) / prior_sum as u64) as u32)
                .collect();
            let residual = remaining - shares.iter().sum::<u32>();
            let largest = largest_index(&prior);
            shares[largest] += residual;
            shares
        };

        *self.slot(signal) = value;
        for (s, share) in others.iter().zip(shares) {
            *self.slot(*s) = share;
        }
        debug!(
            lexicon = self.lexicon,
            embedding = self.embedding,
            llm = self.llm,
            "fusion weights updated"
        );
    }
}

/// Index of the largest value, first wins on ties.
fn largest_index(values: &[u32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Scale `raw` to integers summing to `total`, residual to the largest part.
fn distribute(raw: &[u32], total: u32) -> Vec<u32> {
    let sum: u64 = raw.iter().map(|v| *v as u64).sum();
    let mut parts: Vec<u32> = raw
        .iter()
        .map(|v| ((*v as u64 * total as u64) / sum) as u32)
        .collect();
    let residual = total - parts.iter().sum::<u32>();
    let largest = largest_index(raw);
    parts[largest] += residual;
    parts
}

/// Output of one fusion cycle for one domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub score: f64,
    pub confidence: f64,
    /// Observations that contributed a non-zero denominator term
    pub signal_count: usize,
}

impl FusedScore {
    pub fn neutral() -> Self {
        Self {
            score: NEUTRAL_SCORE,
            confidence: 0.0,
            signal_count: 0,
        }
    }

    /// True when no observation carried weight and confidence.
    pub fn is_prior(&self) -> bool {
        self.signal_count == 0
    }
}

/// Stateless fusion over a set of observations for one domain.
#[derive(Debug, Clone, Default)]
pub struct SignalFusionEngine {
    weights: FusionWeights,
}

impl SignalFusionEngine {
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    pub fn set_weights(&mut self, weights: FusionWeights) {
        self.weights = weights;
    }

    /// Stamp each observation with its signal's current weight fraction.
    pub fn weigh(&self, observations: Vec<SignalObservation>) -> Vec<SignalObservation> {
        observations
            .into_iter()
            .map(|o| {
                let w = self.weights.fraction(o.signal_type);
                o.with_weight(w)
            })
            .collect()
    }

    /// Fuse observations using the weights they carry.
    pub fn fuse(observations: &[SignalObservation]) -> FusedScore {
        let mut num = 0.0;
        let mut score_den = 0.0;
        let mut conf_num = 0.0;
        let mut weight_den = 0.0;
        let mut signal_count = 0;

        for o in observations {
            let wc = o.weight * o.confidence;
            num += o.score * wc;
            score_den += wc;
            conf_num += o.confidence * o.weight;
            weight_den += o.weight;
            if wc > 0.0 {
                signal_count += 1;
            }
        }

        if score_den <= 0.0 || weight_den <= 0.0 {
            return FusedScore::neutral();
        }

        FusedScore {
            score: (num / score_den).clamp(0.0, 1.0),
            confidence: (conf_num / weight_den).clamp(0.0, 1.0),
            signal_count,
        }
    }

    /// Weigh then fuse.
    pub fn fuse_weighted(&self, observations: Vec<SignalObservation>) -> FusedScore {
        Self::fuse(&self.weigh(observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainId;

    fn obs(signal: SignalType, score: f64, confidence: f64, weight: f64) -> SignalObservation {
        SignalObservation::new(DomainId::from("openness"), signal, score, confidence)
            .with_weight(weight)
    }

    #[test]
    fn worked_example() {
        let fused = SignalFusionEngine::fuse(&[
            obs(SignalType::Lexicon, 0.6, 0.5, 0.2),
            obs(SignalType::Embedding, 0.7, 0.8, 0.3),
            obs(SignalType::Llm, 0.65, 0.9, 0.5),
        ]);
        // 0.6*0.1 + 0.7*0.24 + 0.65*0.45 = 0.5205 over 0.79
        assert!((fused.score - 0.5205 / 0.79).abs() < 1e-9);
        assert!((fused.score - 0.659).abs() < 1e-3);
        assert!((fused.confidence - 0.79).abs() < 1e-9);
        assert_eq!(fused.signal_count, 3);
    }

    #[test]
    fn single_signal_is_identity_for_any_weight() {
        for w in [0.05, 0.2, 0.5, 1.0] {
            let fused = SignalFusionEngine::fuse(&[obs(SignalType::Embedding, 0.83, 0.4, w)]);
            assert!((fused.score - 0.83).abs() < 1e-12);
            assert!((fused.confidence - 0.4).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_denominator_yields_neutral_prior() {
        assert_eq!(SignalFusionEngine::fuse(&[]), FusedScore::neutral());
        let fused = SignalFusionEngine::fuse(&[obs(SignalType::Lexicon, 0.9, 0.0, 0.2)]);
        assert!(fused.is_prior());
        assert_eq!(fused.score, NEUTRAL_SCORE);
    }

    #[test]
    fn missing_signal_degrades_to_remaining() {
        let engine = SignalFusionEngine::default();
        let fused = engine.fuse_weighted(vec![
            SignalObservation::new(DomainId::from("openness"), SignalType::Lexicon, 0.4, 0.5),
            SignalObservation::new(DomainId::from("openness"), SignalType::Llm, 0.8, 0.5),
        ]);
        // weights 0.2 and 0.5 at equal confidence
        assert!((fused.score - (0.4 * 0.2 + 0.8 * 0.5) / 0.7).abs() < 1e-12);
    }

    #[test]
    fn default_weights_sum_to_hundred() {
        let w = FusionWeights::default();
        assert_eq!((w.lexicon, w.embedding, w.llm), (20, 30, 50));
        assert_eq!(w.sum(), 100);
    }

    #[test]
    fn slider_rescales_others_proportionally() {
        let mut w = FusionWeights::default();
        w.set_weight(SignalType::Lexicon, 40);
        // 30:50 over 60 → 22.5 : 37.5, floor 22/37, residual 1 to llm
        assert_eq!((w.lexicon, w.embedding, w.llm), (40, 22, 38));
        assert_eq!(w.sum(), 100);
    }

    #[test]
    fn slider_residual_tie_goes_to_first() {
        let mut w = FusionWeights::from_parts(34, 33, 33);
        w.set_weight(SignalType::Lexicon, 49);
        // 51 split over 33:33 → 25/25, residual to embedding
        assert_eq!((w.lexicon, w.embedding, w.llm), (49, 26, 25));
    }

    #[test]
    fn slider_to_hundred_zeros_the_rest() {
        let mut w = FusionWeights::default();
        w.set_weight(SignalType::Llm, 100);
        assert_eq!((w.lexicon, w.embedding, w.llm), (0, 0, 100));

        w.set_weight(SignalType::Llm, 40);
        assert_eq!(w.sum(), 100);
        assert_eq!(w.lexicon, 30);
        assert_eq!(w.embedding, 30);
    }

    #[test]
    fn invalid_sum_is_redistributed() {
        let w = FusionWeights::from_parts(10, 10, 20);
        assert_eq!((w.lexicon, w.embedding, w.llm), (25, 25, 50));

        let w = FusionWeights::from_parts(1, 1, 1);
        assert_eq!(w.sum(), 100);
        assert_eq!(w.lexicon, 34);

        assert_eq!(FusionWeights::from_parts(0, 0, 0), FusionWeights::default());
    }

    #[test]
    fn huge_parts_rescale_without_overflow() {
        let w = FusionWeights::from_parts(u32::MAX, u32::MAX, 0);
        assert_eq!(w.sum(), 100);
        assert_eq!(w.lexicon, 50);
        assert_eq!(w.embedding, 50);
        assert_eq!(w.llm, 0);

        let raw = FusionWeights {
            lexicon: u32::MAX,
            embedding: 1,
            llm: 0,
        };
        assert_eq!(raw.checked_sum(), None);
        assert_eq!(raw.sum(), u32::MAX);
    }

    #[test]
    fn weigh_stamps_fractions() {
        let engine = SignalFusionEngine::new(FusionWeights::from_parts(20, 30, 50));
        let weighed = engine.weigh(vec![SignalObservation::new(
            DomainId::from("openness"),
            SignalType::Embedding,
            0.5,
            0.5,
        )]);
        assert!((weighed[0].weight - 0.3).abs() < 1e-12);
    }
}
