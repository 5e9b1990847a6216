//! ContextVarianceAnalyzer — how much a domain shifts between contexts

use crate::domain::{ContextDomainScore, ContextType, DomainId};
use crate::scores::ContextScoreStore;
use serde::Serialize;

pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.10;

/// Derived per-domain report; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextVariation {
    pub domain_id: DomainId,
    /// Confidence × count weighted mean across populated contexts
    pub overall_score: f64,
    /// Populated contexts in enumeration order
    pub per_context_scores: Vec<(ContextType, f64)>,
    /// Population standard deviation of the per-context scores
    pub variation_score: f64,
    pub significant: bool,
    pub highest_context: ContextType,
    pub lowest_context: ContextType,
}

#[derive(Debug, Clone)]
pub struct ContextVarianceAnalyzer {
    threshold: f64,
}

impl Default for ContextVarianceAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE_THRESHOLD)
    }
}

impl ContextVarianceAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Variation for one domain's context rows. `None` unless at least two
    /// contexts have data.
    pub fn analyze_domain(&self, rows: &[ContextDomainScore]) -> Option<ContextVariation> {
        let populated: Vec<&ContextDomainScore> =
            rows.iter().filter(|r| r.data_points_count > 0).collect();
        if populated.len() < 2 {
            return None;
        }

        let n = populated.len() as f64;
        let mean = populated.iter().map(|r| r.score).sum::<f64>() / n;
        let variance = populated
            .iter()
            .map(|r| (r.score - mean).powi(2))
            .sum::<f64>()
            / n;
        let variation_score = variance.sqrt();

        let weight: f64 = populated
            .iter()
            .map(|r| r.confidence * r.data_points_count as f64)
            .sum();
        let overall_score = if weight > 0.0 {
            populated
                .iter()
                .map(|r| r.score * r.confidence * r.data_points_count as f64)
                .sum::<f64>()
                / weight
        } else {
            mean
        };

        let mut highest = populated[0];
        let mut lowest = populated[0];
        for r in &populated[1..] {
            if r.score > highest.score {
                highest = r;
            }
            if r.score < lowest.score {
                lowest = r;
            }
        }

        Some(ContextVariation {
            domain_id: populated[0].domain_id.clone(),
            overall_score,
            per_context_scores: populated.iter().map(|r| (r.context_type, r.score)).collect(),
            variation_score,
            significant: variation_score > self.threshold,
            highest_context: highest.context_type,
            lowest_context: lowest.context_type,
        })
    }

    /// Variations for every domain with at least two populated contexts.
    pub fn analyze(&self, store: &ContextScoreStore) -> Vec<ContextVariation> {
        store
            .domains()
            .iter()
            .filter_map(|id| self.analyze_domain(&store.for_domain(id)))
            .collect()
    }

    pub fn significant_only(variations: Vec<ContextVariation>) -> Vec<ContextVariation> {
        variations.into_iter().filter(|v| v.significant).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ctx: ContextType, score: f64, confidence: f64, count: u64) -> ContextDomainScore {
        let mut r = ContextDomainScore::neutral(DomainId::from("extraversion"), ctx);
        r.score = score;
        r.confidence = confidence;
        r.data_points_count = count;
        r
    }

    #[test]
    fn fewer_than_two_populated_contexts_is_skipped() {
        let analyzer = ContextVarianceAnalyzer::default();
        assert!(analyzer
            .analyze_domain(&[
                row(ContextType::WorkProfessional, 0.9, 0.5, 3),
                row(ContextType::SocialCasual, 0.5, 0.0, 0),
            ])
            .is_none());
    }

    #[test]
    fn equal_scores_have_zero_variation() {
        let v = ContextVarianceAnalyzer::default()
            .analyze_domain(&[
                row(ContextType::WorkProfessional, 0.6, 0.5, 3),
                row(ContextType::SocialCasual, 0.6, 0.9, 1),
                row(ContextType::FamilyDomestic, 0.6, 0.2, 7),
            ])
            .unwrap();
        assert!(v.variation_score.abs() < 1e-12);
        assert!(!v.significant);
        assert_eq!(v.highest_context, ContextType::WorkProfessional);
        assert_eq!(v.lowest_context, ContextType::WorkProfessional);
    }

    #[test]
    fn population_stddev_and_weighted_overall() {
        let v = ContextVarianceAnalyzer::default()
            .analyze_domain(&[
                row(ContextType::WorkProfessional, 0.8, 0.5, 2),
                row(ContextType::SocialCasual, 0.4, 1.0, 3),
            ])
            .unwrap();
        assert!((v.variation_score - 0.2).abs() < 1e-12);
        assert!(v.significant);
        // weights 1.0 and 3.0
        assert!((v.overall_score - (0.8 + 0.4 * 3.0) / 4.0).abs() < 1e-12);
        assert_eq!(v.highest_context, ContextType::WorkProfessional);
        assert_eq!(v.lowest_context, ContextType::SocialCasual);
    }

    #[test]
    fn threshold_is_strict() {
        // stddev of {0.25, 0.75} is exactly 0.25
        let rows = [
            row(ContextType::WorkProfessional, 0.25, 0.5, 1),
            row(ContextType::SocialCasual, 0.75, 0.5, 1),
        ];
        let v = ContextVarianceAnalyzer::new(0.25).analyze_domain(&rows).unwrap();
        assert_eq!(v.variation_score, 0.25);
        assert!(!v.significant);

        let v = ContextVarianceAnalyzer::new(0.2499).analyze_domain(&rows).unwrap();
        assert!(v.significant);
    }

    #[test]
    fn default_threshold_is_strict() {
        // stddev of {0.3, 0.5} is exactly 0.1 in f64
        let v = ContextVarianceAnalyzer::default()
            .analyze_domain(&[
                row(ContextType::WorkProfessional, 0.3, 0.5, 1),
                row(ContextType::SocialCasual, 0.5, 0.5, 1),
            ])
            .unwrap();
        assert_eq!(v.variation_score, DEFAULT_SIGNIFICANCE_THRESHOLD);
        assert!(!v.significant);

        let v = ContextVarianceAnalyzer::default()
            .analyze_domain(&[
                row(ContextType::WorkProfessional, 0.3, 0.5, 1),
                row(ContextType::SocialCasual, 0.52, 0.5, 1),
            ])
            .unwrap();
        assert!(v.significant);
    }

    #[test]
    fn zero_confidence_falls_back_to_plain_mean() {
        let v = ContextVarianceAnalyzer::default()
            .analyze_domain(&[
                row(ContextType::WorkProfessional, 0.2, 0.0, 2),
                row(ContextType::SocialCasual, 0.6, 0.0, 2),
            ])
            .unwrap();
        assert!((v.overall_score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn analyze_reads_store_and_filters() {
        let store = ContextScoreStore::new();
        let id = DomainId::from("assertiveness");
        store.update(&id, ContextType::WorkProfessional, 0.9, 0.8, 1);
        store.update(&id, ContextType::FamilyDomestic, 0.3, 0.8, 1);
        let calm = DomainId::from("trust");
        store.update(&calm, ContextType::WorkProfessional, 0.5, 0.8, 1);
        store.update(&calm, ContextType::SocialCasual, 0.52, 0.8, 1);
        store.update(&DomainId::from("power"), ContextType::SocialCasual, 0.9, 0.8, 1);

        let all = ContextVarianceAnalyzer::default().analyze(&store);
        assert_eq!(all.len(), 2);
        let significant = ContextVarianceAnalyzer::significant_only(all);
        assert_eq!(significant.len(), 1);
        assert_eq!(significant[0].domain_id, id);
        assert_eq!(significant[0].highest_context, ContextType::WorkProfessional);
    }
}
