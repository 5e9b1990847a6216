//! Concurrent score stores
//!
//! Both stores are DashMaps: a write holds its key's shard lock for the
//! whole read-modify-write, so updates to one key are serialized while
//! distinct keys proceed in parallel.

use super::confidence::{ConfidenceFactor, ConfidenceFactors, FactorRecord};
use crate::domain::catalog::catalog_index;
use crate::domain::{ContextDomainScore, ContextType, DomainId, DomainScore, DOMAINS};
use dashmap::DashMap;
use std::cmp::Ordering;

fn catalog_order(a: &DomainId, b: &DomainId) -> Ordering {
    match (catalog_index(a.as_str()), catalog_index(b.as_str())) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Aggregate estimate per domain, plus its confidence factors.
#[derive(Debug, Default)]
pub struct DomainScoreStore {
    scores: DashMap<DomainId, DomainScore>,
    factors: DashMap<DomainId, ConfidenceFactors>,
}

impl DomainScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record, created with the neutral prior on first reference.
    pub fn get_or_create(&self, domain_id: &DomainId) -> DomainScore {
        self.scores
            .entry(domain_id.clone())
            .or_insert_with(|| DomainScore::neutral(domain_id.clone()))
            .clone()
    }

    pub fn get(&self, domain_id: &DomainId) -> Option<DomainScore> {
        self.scores.get(domain_id).map(|r| r.clone())
    }

    /// Fold `new_points` samples of `new_score` into the domain's running
    /// mean. Returns the updated record, or `None` for a zero-point no-op.
    pub fn update_domain_score(
        &self,
        domain_id: &DomainId,
        new_score: f64,
        new_points: u64,
    ) -> Option<DomainScore> {
        let mut entry = self
            .scores
            .entry(domain_id.clone())
            .or_insert_with(|| DomainScore::neutral(domain_id.clone()));
        if entry.apply(new_score.clamp(0.0, 1.0), new_points) {
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Set one confidence factor and recompute the domain's confidence.
    pub fn set_factor(&self, domain_id: &DomainId, factor: ConfidenceFactor, value: f64) -> f64 {
        let confidence = {
            let mut factors = self.factors.entry(domain_id.clone()).or_default();
            factors.set(factor, value);
            factors.confidence()
        };
        self.scores
            .entry(domain_id.clone())
            .or_insert_with(|| DomainScore::neutral(domain_id.clone()))
            .confidence = confidence;
        confidence
    }

    pub fn factors(&self, domain_id: &DomainId) -> ConfidenceFactors {
        self.factors
            .get(domain_id)
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// All records in catalog order, unknown domains last by id.
    pub fn all(&self) -> Vec<DomainScore> {
        let mut all: Vec<DomainScore> = self.scores.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| catalog_order(&a.domain_id, &b.domain_id));
        all
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Explicit full reset.
    pub fn reset(&self) {
        self.scores.clear();
        self.factors.clear();
    }

    pub fn factor_records(&self) -> Vec<FactorRecord> {
        let mut records: Vec<FactorRecord> = self
            .factors
            .iter()
            .flat_map(|f| f.value().records(f.key()))
            .collect();
        records.sort_by(|a, b| catalog_order(&a.domain_id, &b.domain_id).then(a.factor.cmp(&b.factor)));
        records
    }

    /// Replace contents with persisted rows.
    pub fn restore(&self, scores: Vec<DomainScore>, factors: Vec<FactorRecord>) {
        self.reset();
        for score in scores {
            self.scores.insert(score.domain_id.clone(), score);
        }
        for record in &factors {
            self.factors
                .entry(record.domain_id.clone())
                .or_default()
                .restore(record);
        }
    }
}

/// Per-(domain, context) estimates, pre-populated for every catalog pair.
#[derive(Debug)]
pub struct ContextScoreStore {
    scores: DashMap<(DomainId, ContextType), ContextDomainScore>,
}

impl Default for ContextScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextScoreStore {
    pub fn new() -> Self {
        let store = Self {
            scores: DashMap::with_capacity(DOMAINS.len() * ContextType::ALL.len()),
        };
        store.initialize();
        store
    }

    fn initialize(&self) {
        for def in DOMAINS.iter() {
            for ctx in ContextType::ALL {
                let id = DomainId::from(def.id);
                self.scores
                    .insert((id.clone(), ctx), ContextDomainScore::neutral(id, ctx));
            }
        }
    }

    pub fn update(
        &self,
        domain_id: &DomainId,
        context: ContextType,
        new_score: f64,
        new_confidence: f64,
        new_points: u64,
    ) -> Option<ContextDomainScore> {
        let mut entry = self
            .scores
            .entry((domain_id.clone(), context))
            .or_insert_with(|| ContextDomainScore::neutral(domain_id.clone(), context));
        if entry.apply(
            new_score.clamp(0.0, 1.0),
            new_confidence.clamp(0.0, 1.0),
            new_points,
        ) {
            Some(entry.clone())
        } else {
            None
        }
    }

    pub fn get(&self, domain_id: &DomainId, context: ContextType) -> Option<ContextDomainScore> {
        self.scores
            .get(&(domain_id.clone(), context))
            .map(|r| r.clone())
    }

    /// A domain's records in context enumeration order.
    pub fn for_domain(&self, domain_id: &DomainId) -> Vec<ContextDomainScore> {
        ContextType::ALL
            .iter()
            .filter_map(|ctx| self.get(domain_id, *ctx))
            .collect()
    }

    /// Domain ids present, in catalog order.
    pub fn domains(&self) -> Vec<DomainId> {
        let mut ids: Vec<DomainId> = self.scores.iter().map(|r| r.key().0.clone()).collect();
        ids.sort_by(catalog_order);
        ids.dedup();
        ids
    }

    pub fn all(&self) -> Vec<ContextDomainScore> {
        let mut all: Vec<ContextDomainScore> =
            self.scores.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| {
            catalog_order(&a.domain_id, &b.domain_id).then(a.context_type.cmp(&b.context_type))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Back to the neutral prior for every catalog pair.
    pub fn reset(&self) {
        self.scores.clear();
        self.initialize();
    }

    /// Overlay persisted rows onto a fresh neutral grid.
    pub fn restore(&self, rows: Vec<ContextDomainScore>) {
        self.reset();
        for row in rows {
            self.scores
                .insert((row.domain_id.clone(), row.context_type), row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainCategory, NEUTRAL_SCORE};
    use std::sync::Arc;

    #[test]
    fn first_reference_creates_neutral_prior() {
        let store = DomainScoreStore::new();
        let rec = store.get_or_create(&DomainId::from("curiosity"));
        assert_eq!(rec.score, NEUTRAL_SCORE);
        assert_eq!(rec.confidence, 0.0);
        assert_eq!(rec.data_points_count, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_follows_weighted_mean() {
        let store = DomainScoreStore::new();
        let id = DomainId::from("openness");
        store.update_domain_score(&id, 0.7, 3);
        let rec = store.update_domain_score(&id, 0.5, 1).unwrap();
        assert!((rec.score - 0.65).abs() < 1e-12);
        assert_eq!(rec.data_points_count, 4);
        assert!(store.update_domain_score(&id, 0.1, 0).is_none());
        assert_eq!(store.get(&id).unwrap().data_points_count, 4);
    }

    #[test]
    fn unknown_domain_is_uncategorized_and_sorted_last() {
        let store = DomainScoreStore::new();
        store.update_domain_score(&DomainId::from("wanderlust"), 0.9, 1);
        store.update_domain_score(&DomainId::from("trust"), 0.4, 1);
        store.update_domain_score(&DomainId::from("openness"), 0.4, 1);
        let all = store.all();
        let ids: Vec<&str> = all.iter().map(|r| r.domain_id.as_str()).collect();
        assert_eq!(ids, vec!["openness", "trust", "wanderlust"]);
        assert_eq!(all[2].category, DomainCategory::Uncategorized);
    }

    #[test]
    fn factors_drive_confidence() {
        let store = DomainScoreStore::new();
        let id = DomainId::from("empathy");
        store.update_domain_score(&id, 0.6, 1);
        store.set_factor(&id, ConfidenceFactor::DataVolume, 0.2);
        let c = store.set_factor(&id, ConfidenceFactor::CrossValidation, 0.8);
        assert!((c - 0.5).abs() < 1e-12);
        assert!((store.get(&id).unwrap().confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn restore_replaces_contents() {
        let store = DomainScoreStore::new();
        let id = DomainId::from("trust");
        store.update_domain_score(&id, 0.9, 2);
        store.set_factor(&id, ConfidenceFactor::Consistency, 1.0);
        let (scores, factors) = (store.all(), store.factor_records());

        let other = DomainScoreStore::new();
        other.update_domain_score(&DomainId::from("power"), 0.1, 1);
        other.restore(scores.clone(), factors);
        assert_eq!(other.all(), scores);
        assert_eq!(other.factors(&id).get(ConfidenceFactor::Consistency), Some(1.0));
    }

    #[test]
    fn concurrent_updates_to_one_key_are_serialized() {
        let store = Arc::new(DomainScoreStore::new());
        let id = DomainId::from("optimism");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update_domain_score(&id, 0.25, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let rec = store.get(&id).unwrap();
        assert_eq!(rec.data_points_count, 800);
        assert!((rec.score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn context_store_starts_with_full_neutral_grid() {
        let store = ContextScoreStore::new();
        assert_eq!(store.len(), 39 * 10);
        let rows = store.for_domain(&DomainId::from("openness"));
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].context_type, ContextType::WorkProfessional);
        assert!(rows.iter().all(|r| r.data_points_count == 0 && r.score == NEUTRAL_SCORE));
    }

    #[test]
    fn context_update_and_reset() {
        let store = ContextScoreStore::new();
        let id = DomainId::from("assertiveness");
        store.update(&id, ContextType::WorkProfessional, 0.8, 0.6, 1);
        store.update(&id, ContextType::WorkProfessional, 0.6, 0.4, 1);
        let rec = store.get(&id, ContextType::WorkProfessional).unwrap();
        assert!((rec.score - 0.7).abs() < 1e-12);
        assert!((rec.confidence - 0.5).abs() < 1e-12);

        store.reset();
        assert_eq!(store.len(), 390);
        assert_eq!(store.get(&id, ContextType::WorkProfessional).unwrap().data_points_count, 0);
    }
}
