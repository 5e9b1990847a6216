//! Domain confidence as a weighted mean of named factors

use crate::domain::DomainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFactor {
    DataVolume,
    Consistency,
    TemporalStability,
    CrossValidation,
}

impl ConfidenceFactor {
    pub const ALL: [ConfidenceFactor; 4] = [
        ConfidenceFactor::DataVolume,
        ConfidenceFactor::Consistency,
        ConfidenceFactor::TemporalStability,
        ConfidenceFactor::CrossValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataVolume => "data_volume",
            Self::Consistency => "consistency",
            Self::TemporalStability => "temporal_stability",
            Self::CrossValidation => "cross_validation",
        }
    }

    pub fn default_weight(&self) -> f64 {
        0.25
    }
}

/// `1 - e^(-n/30)`: approaches 1 as samples accumulate.
pub fn data_volume(data_points: u64) -> f64 {
    1.0 - (-(data_points as f64) / 30.0).exp()
}

/// 1 when a new contribution matches the prior estimate, falling to 0 at a
/// gap of 0.5 or more.
pub fn consistency(prior: f64, new: f64) -> f64 {
    1.0 - (2.0 * (new - prior).abs()).min(1.0)
}

/// One persisted factor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRecord {
    pub domain_id: DomainId,
    pub factor: ConfidenceFactor,
    pub value: f64,
    pub weight: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FactorValue {
    value: f64,
    weight: f64,
    updated_at: DateTime<Utc>,
}

/// The factor values set so far for one domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceFactors {
    values: BTreeMap<ConfidenceFactor, FactorValue>,
}

impl ConfidenceFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, factor: ConfidenceFactor, value: f64) {
        self.set_weighted(factor, value, factor.default_weight());
    }

    pub fn set_weighted(&mut self, factor: ConfidenceFactor, value: f64, weight: f64) {
        self.values.insert(
            factor,
            FactorValue {
                value: value.clamp(0.0, 1.0),
                weight: weight.max(0.0),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, factor: ConfidenceFactor) -> Option<f64> {
        self.values.get(&factor).map(|v| v.value)
    }

    /// `Σ(value·weight) / Σ(weight)` over the factors that have been set;
    /// 0 when none have.
    ///
    /// A factor nobody has set is left out of both sums rather than counted
    /// as 0, so a domain whose temporal stability is never reported is
    /// averaged over the remaining three factors, each at an equal share.
    pub fn confidence(&self) -> f64 {
        let weight: f64 = self.values.values().map(|v| v.weight).sum();
        if weight <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self.values.values().map(|v| v.value * v.weight).sum();
        (weighted / weight).clamp(0.0, 1.0)
    }

    pub fn records(&self, domain_id: &DomainId) -> Vec<FactorRecord> {
        self.values
            .iter()
            .map(|(factor, v)| FactorRecord {
                domain_id: domain_id.clone(),
                factor: *factor,
                value: v.value,
                weight: v.weight,
                updated_at: v.updated_at,
            })
            .collect()
    }

    pub fn restore(&mut self, record: &FactorRecord) {
        self.values.insert(
            record.factor,
            FactorValue {
                value: record.value,
                weight: record.weight,
                updated_at: record.updated_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_weights_average_the_set_factors() {
        let mut f = ConfidenceFactors::new();
        assert_eq!(f.confidence(), 0.0);

        f.set(ConfidenceFactor::DataVolume, 0.4);
        f.set(ConfidenceFactor::Consistency, 0.8);
        assert!((f.confidence() - 0.6).abs() < 1e-12);

        f.set(ConfidenceFactor::TemporalStability, 0.0);
        f.set(ConfidenceFactor::CrossValidation, 1.0);
        assert!((f.confidence() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn unset_factor_does_not_dilute_confidence() {
        let mut f = ConfidenceFactors::new();
        f.set(ConfidenceFactor::DataVolume, 0.3);
        f.set(ConfidenceFactor::Consistency, 0.6);
        f.set(ConfidenceFactor::CrossValidation, 0.9);
        assert!(f.get(ConfidenceFactor::TemporalStability).is_none());
        assert!((f.confidence() - 0.6).abs() < 1e-12);

        f.set(ConfidenceFactor::TemporalStability, 0.0);
        assert!((f.confidence() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn custom_weight_shifts_the_mean() {
        let mut f = ConfidenceFactors::new();
        f.set_weighted(ConfidenceFactor::DataVolume, 1.0, 0.75);
        f.set(ConfidenceFactor::Consistency, 0.0);
        assert!((f.confidence() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn derived_factor_curves() {
        assert_eq!(data_volume(0), 0.0);
        assert!(data_volume(30) > 0.63 && data_volume(30) < 0.64);
        assert_eq!(consistency(0.5, 0.5), 1.0);
        assert!((consistency(0.5, 0.75) - 0.5).abs() < 1e-12);
        assert_eq!(consistency(0.1, 0.9), 0.0);
    }

    #[test]
    fn records_restore_round_trip() {
        let id = DomainId::from("trust");
        let mut f = ConfidenceFactors::new();
        f.set(ConfidenceFactor::CrossValidation, 0.7);
        let mut restored = ConfidenceFactors::new();
        for r in f.records(&id) {
            restored.restore(&r);
        }
        assert_eq!(restored, f);
    }
}
