//! Situational context of a message

use serde::{Deserialize, Serialize};

/// The ten situational contexts, in enumeration order.
///
/// Enumeration order is the tie-break priority for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    WorkProfessional,
    SocialCasual,
    PersonalIntimate,
    CreativeExpressive,
    IntellectualAnalytical,
    StressfulChallenging,
    LeisureRecreational,
    FinancialPractical,
    HealthWellness,
    FamilyDomestic,
}

impl ContextType {
    pub const ALL: [ContextType; 10] = [
        ContextType::WorkProfessional,
        ContextType::SocialCasual,
        ContextType::PersonalIntimate,
        ContextType::CreativeExpressive,
        ContextType::IntellectualAnalytical,
        ContextType::StressfulChallenging,
        ContextType::LeisureRecreational,
        ContextType::FinancialPractical,
        ContextType::HealthWellness,
        ContextType::FamilyDomestic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkProfessional => "work_professional",
            Self::SocialCasual => "social_casual",
            Self::PersonalIntimate => "personal_intimate",
            Self::CreativeExpressive => "creative_expressive",
            Self::IntellectualAnalytical => "intellectual_analytical",
            Self::StressfulChallenging => "stressful_challenging",
            Self::LeisureRecreational => "leisure_recreational",
            Self::FinancialPractical => "financial_practical",
            Self::HealthWellness => "health_wellness",
            Self::FamilyDomestic => "family_domestic",
        }
    }

    /// Index into [`ContextType::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl Default for ContextType {
    fn default() -> Self {
        ContextType::SocialCasual
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_enumeration_order() {
        for (i, ctx) in ContextType::ALL.iter().enumerate() {
            assert_eq!(ctx.index(), i);
        }
    }

    #[test]
    fn parse_round_trips_names() {
        assert_eq!(ContextType::parse("health_wellness"), Some(ContextType::HealthWellness));
        assert_eq!(ContextType::parse("nope"), None);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ContextType::FamilyDomestic).unwrap();
        assert_eq!(json, "\"family_domestic\"");
    }
}
