//! The fixed catalog of psychological domains
//!
//! 39 domains in seven categories. The order here is the canonical
//! iteration order for reports and pairwise relationship scans.

use serde::{Deserialize, Serialize};

/// Grouping of domains for display and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainCategory {
    BigFive,
    DarkTriad,
    Cognitive,
    Emotional,
    Social,
    Values,
    Wellbeing,
    /// Domain ids not present in the catalog (e.g. returned by the model)
    Uncategorized,
}

impl DomainCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigFive => "big_five",
            Self::DarkTriad => "dark_triad",
            Self::Cognitive => "cognitive",
            Self::Emotional => "emotional",
            Self::Social => "social",
            Self::Values => "values",
            Self::Wellbeing => "wellbeing",
            Self::Uncategorized => "uncategorized",
        }
    }
}

impl std::fmt::Display for DomainCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct DomainDef {
    pub id: &'static str,
    pub category: DomainCategory,
}

const fn def(id: &'static str, category: DomainCategory) -> DomainDef {
    DomainDef { id, category }
}

use DomainCategory::*;

pub const DOMAINS: [DomainDef; 39] = [
    def("openness", BigFive),
    def("conscientiousness", BigFive),
    def("extraversion", BigFive),
    def("agreeableness", BigFive),
    def("neuroticism", BigFive),
    def("narcissism", DarkTriad),
    def("machiavellianism", DarkTriad),
    def("psychopathy", DarkTriad),
    def("analytical_thinking", Cognitive),
    def("cognitive_complexity", Cognitive),
    def("creativity", Cognitive),
    def("curiosity", Cognitive),
    def("need_for_cognition", Cognitive),
    def("intuitive_thinking", Cognitive),
    def("emotional_intelligence", Emotional),
    def("empathy", Emotional),
    def("emotional_stability", Emotional),
    def("emotional_expressiveness", Emotional),
    def("optimism", Emotional),
    def("resilience", Emotional),
    def("assertiveness", Social),
    def("cooperation", Social),
    def("social_dominance", Social),
    def("trust", Social),
    def("attachment_security", Social),
    def("social_anxiety", Social),
    def("achievement", Values),
    def("benevolence", Values),
    def("self_direction", Values),
    def("security", Values),
    def("tradition", Values),
    def("power", Values),
    def("universalism", Values),
    def("life_satisfaction", Wellbeing),
    def("stress_level", Wellbeing),
    def("growth_mindset", Wellbeing),
    def("self_efficacy", Wellbeing),
    def("impulsivity", Wellbeing),
    def("perfectionism", Wellbeing),
];

/// Look up the category of a domain id.
pub fn category_of(domain_id: &str) -> DomainCategory {
    DOMAINS
        .iter()
        .find(|d| d.id == domain_id)
        .map(|d| d.category)
        .unwrap_or(DomainCategory::Uncategorized)
}

/// Position of a domain in the catalog, if present.
pub fn catalog_index(domain_id: &str) -> Option<usize> {
    DOMAINS.iter().position(|d| d.id == domain_id)
}
