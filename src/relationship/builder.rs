//! RelationshipGraphBuilder — triples derived from aggregate scores
//!
//! Rules over the current domain scores:
//! - both domains above the correlation threshold → `CORRELATES_WITH`
//! - one high, the other low → `CONTRADICTS`, subject is the high domain
//! - a domain above the indication threshold with known behaviors →
//!   one `INDICATES` per behavior, weighted by the domain score
//!
//! Topics supplied by the caller become `user DISCUSSES topic`.

use super::triple::{node, Predicate, RelationshipTriple};
use crate::domain::DomainScore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const CORRELATES_WEIGHT: f64 = 0.7;
const CONTRADICTS_WEIGHT: f64 = 0.5;
const DISCUSSES_WEIGHT: f64 = 1.0;

/// Score cut-offs for each rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipThresholds {
    pub correlates_above: f64,
    pub contradicts_high: f64,
    pub contradicts_low: f64,
    pub indicates_above: f64,
}

impl Default for RelationshipThresholds {
    fn default() -> Self {
        Self {
            correlates_above: 0.6,
            contradicts_high: 0.7,
            contradicts_low: 0.3,
            indicates_above: 0.5,
        }
    }
}

fn default_behaviors() -> HashMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        ("openness", &["explores_new_ideas", "seeks_novel_experiences"]),
        ("conscientiousness", &["plans_ahead", "follows_through_on_commitments"]),
        ("extraversion", &["initiates_social_contact", "seeks_group_activities"]),
        ("agreeableness", &["accommodates_others", "avoids_conflict"]),
        ("neuroticism", &["ruminates_on_problems", "seeks_reassurance"]),
        ("narcissism", &["seeks_admiration"]),
        ("analytical_thinking", &["breaks_down_problems", "weighs_evidence"]),
        ("creativity", &["produces_original_work"]),
        ("curiosity", &["asks_questions", "researches_topics"]),
        ("empathy", &["validates_feelings", "offers_support"]),
        ("optimism", &["expects_good_outcomes"]),
        ("resilience", &["recovers_from_setbacks"]),
        ("assertiveness", &["states_opinions_directly"]),
        ("stress_level", &["reports_overwhelm", "disrupted_sleep"]),
        ("perfectionism", &["revises_repeatedly"]),
        ("impulsivity", &["acts_without_planning"]),
    ];
    table
        .iter()
        .map(|(domain, behaviors)| {
            (
                domain.to_string(),
                behaviors.iter().map(|b| b.to_string()).collect(),
            )
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RelationshipGraphBuilder {
    thresholds: RelationshipThresholds,
    behaviors: HashMap<String, Vec<String>>,
}

impl Default for RelationshipGraphBuilder {
    fn default() -> Self {
        Self::new(RelationshipThresholds::default())
    }
}

impl RelationshipGraphBuilder {
    pub fn new(thresholds: RelationshipThresholds) -> Self {
        Self {
            thresholds,
            behaviors: default_behaviors(),
        }
    }

    pub fn with_behaviors(mut self, domain: impl Into<String>, behaviors: Vec<String>) -> Self {
        self.behaviors.insert(domain.into(), behaviors);
        self
    }

    /// Derive triples. Pairs are scanned in the order `scores` is given.
    pub fn build(
        &self,
        user_id: &str,
        scores: &[DomainScore],
        topics: &[String],
    ) -> Vec<RelationshipTriple> {
        let t = &self.thresholds;
        let mut triples = Vec::new();

        for (i, a) in scores.iter().enumerate() {
            for b in &scores[i + 1..] {
                if a.score > t.correlates_above && b.score > t.correlates_above {
                    triples.push(
                        RelationshipTriple::new(
                            node::domain(a.domain_id.as_str()),
                            Predicate::CorrelatesWith,
                            node::domain(b.domain_id.as_str()),
                            CORRELATES_WEIGHT,
                        )
                        .with_metadata("subject_score", a.score)
                        .with_metadata("object_score", b.score),
                    );
                }

                let contradicting = if a.score > t.contradicts_high && b.score < t.contradicts_low {
                    Some((a, b))
                } else if b.score > t.contradicts_high && a.score < t.contradicts_low {
                    Some((b, a))
                } else {
                    None
                };
                if let Some((high, low)) = contradicting {
                    triples.push(
                        RelationshipTriple::new(
                            node::domain(high.domain_id.as_str()),
                            Predicate::Contradicts,
                            node::domain(low.domain_id.as_str()),
                            CONTRADICTS_WEIGHT,
                        )
                        .with_metadata("subject_score", high.score)
                        .with_metadata("object_score", low.score),
                    );
                }
            }
        }

        for score in scores {
            if score.score <= t.indicates_above {
                continue;
            }
            let Some(behaviors) = self.behaviors.get(score.domain_id.as_str()) else {
                continue;
            };
            for behavior in behaviors {
                triples.push(
                    RelationshipTriple::new(
                        node::trait_(score.domain_id.as_str()),
                        Predicate::Indicates,
                        node::behavior(behavior),
                        score.score,
                    )
                    .with_metadata("confidence", score.confidence),
                );
            }
        }

        for topic in topics {
            triples.push(RelationshipTriple::new(
                node::user(user_id),
                Predicate::Discusses,
                node::topic(topic),
                DISCUSSES_WEIGHT,
            ));
        }

        triples
    }
}
