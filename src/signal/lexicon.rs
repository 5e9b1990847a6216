//! LexiconSignalExtractor — word-category frequency scoring
//!
//! Tokenizes text and counts hits against fixed psychological word
//! categories. Each supported domain's score is a fixed linear combination
//! of per-word-count frequencies, each term clamped into [0, 1] first.
//! Pure: no shared mutable state, safe to run per message in parallel.

use super::types::{SignalObservation, SignalType};
use crate::domain::DomainId;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use Feature as F;
use LexiconCategory as C;

/// Fixed word categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LexiconCategory {
    FirstPersonSingular,
    FirstPersonPlural,
    SecondPerson,
    ThirdPerson,
    PositiveEmotion,
    NegativeEmotion,
    Anxiety,
    Insight,
    Causation,
    Tentative,
    Social,
}

impl LexiconCategory {
    pub const ALL: [LexiconCategory; 11] = [
        LexiconCategory::FirstPersonSingular,
        LexiconCategory::FirstPersonPlural,
        LexiconCategory::SecondPerson,
        LexiconCategory::ThirdPerson,
        LexiconCategory::PositiveEmotion,
        LexiconCategory::NegativeEmotion,
        LexiconCategory::Anxiety,
        LexiconCategory::Insight,
        LexiconCategory::Causation,
        LexiconCategory::Tentative,
        LexiconCategory::Social,
    ];

    fn words(&self) -> &'static [&'static str] {
        match self {
            Self::FirstPersonSingular => &["i", "me", "my", "mine", "myself", "i'm", "i've", "i'll", "i'd"],
            Self::FirstPersonPlural => &["we", "us", "our", "ours", "ourselves", "we're", "we've", "we'll"],
            Self::SecondPerson => &["you", "your", "yours", "yourself", "yourselves", "you're", "you've", "you'll"],
            Self::ThirdPerson => &[
                "he", "she", "him", "her", "his", "hers", "they", "them", "their", "theirs", "himself",
                "herself", "themselves",
            ],
            Self::PositiveEmotion => &[
                "happy", "love", "great", "good", "wonderful", "excited", "glad", "enjoy", "joy",
                "amazing", "grateful", "proud", "fun", "beautiful", "nice", "awesome", "hope", "laugh",
            ],
            Self::NegativeEmotion => &[
                "sad", "angry", "hate", "bad", "terrible", "awful", "upset", "hurt", "annoyed",
                "miserable", "disappointed", "frustrated", "cry", "lonely", "worst", "horrible",
            ],
            Self::Anxiety => &[
                "worried", "worry", "anxious", "nervous", "afraid", "scared", "fear", "panic", "stress",
                "stressed", "tense", "uneasy", "overwhelmed", "dread",
            ],
            Self::Insight => &[
                "think", "know", "realize", "understand", "consider", "believe", "notice", "learn",
                "recognize", "figure", "insight", "idea", "meaning",
            ],
            Self::Causation => &[
                "because", "cause", "effect", "therefore", "hence", "since", "reason", "result", "why",
                "consequently", "thus", "leads", "due",
            ],
            Self::Tentative => &[
                "maybe", "perhaps", "might", "possibly", "probably", "guess", "seem", "seems", "unsure",
                "wonder", "somewhat", "almost", "apparently",
            ],
            Self::Social => &[
                "friend", "friends", "family", "talk", "talked", "people", "together", "party", "share",
                "team", "meet", "chat", "everyone", "community", "neighbor", "partner",
            ],
        }
    }
}

/// `clamp((value - min) / (max - min), 0, 1)`
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Sample-size confidence: approaches 0.95 and never exceeds it.
pub fn sample_confidence(n: usize) -> f64 {
    (0.3 + 0.65 * (1.0 - (-(n as f64) / 30.0).exp())).min(0.95)
}

fn strip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s']").unwrap())
}

fn word_index() -> &'static HashMap<&'static str, Vec<LexiconCategory>> {
    static INDEX: OnceLock<HashMap<&'static str, Vec<LexiconCategory>>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index: HashMap<&'static str, Vec<LexiconCategory>> = HashMap::new();
        for category in LexiconCategory::ALL {
            for word in category.words() {
                index.entry(*word).or_default().push(category);
            }
        }
        index
    })
}

/// Lowercase, strip everything but word characters, whitespace and
/// apostrophes, split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    strip_regex()
        .replace_all(&lowered, "")
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// One input term of a domain formula.
#[derive(Debug, Clone, Copy)]
enum Feature {
    /// unique tokens / total tokens
    VocabularyRichness,
    /// (insight + causation + tentative) frequency, normalized to 0–0.15
    CognitiveComplexity,
    /// Category frequency normalized to 0–max
    Frequency(LexiconCategory, f64),
    /// 1 − normalized category frequency
    Inverse(LexiconCategory, f64),
    /// clamp(scale · frequency)
    Scaled(LexiconCategory, f64),
}

impl Feature {
    fn categories(&self) -> Vec<LexiconCategory> {
        match self {
            Feature::VocabularyRichness => Vec::new(),
            Feature::CognitiveComplexity => vec![
                LexiconCategory::Insight,
                LexiconCategory::Causation,
                LexiconCategory::Tentative,
            ],
            Feature::Frequency(c, _) | Feature::Inverse(c, _) | Feature::Scaled(c, _) => vec![*c],
        }
    }
}

struct DomainRule {
    domain: &'static str,
    terms: &'static [(f64, Feature)],
}

const COGNITIVE_MAX: f64 = 0.15;

const RULES: &[DomainRule] = &[
    DomainRule {
        domain: "openness",
        terms: &[(0.4, F::VocabularyRichness), (0.4, F::CognitiveComplexity), (0.2, F::Scaled(C::Insight, 20.0))],
    },
    DomainRule {
        domain: "conscientiousness",
        terms: &[(0.5, F::Frequency(C::Causation, 0.05)), (0.5, F::Inverse(C::Tentative, 0.05))],
    },
    DomainRule {
        domain: "extraversion",
        terms: &[
            (0.4, F::Frequency(C::Social, 0.08)),
            (0.3, F::Frequency(C::PositiveEmotion, 0.08)),
            (0.3, F::Frequency(C::FirstPersonPlural, 0.05)),
        ],
    },
    DomainRule {
        domain: "agreeableness",
        terms: &[
            (0.5, F::Frequency(C::PositiveEmotion, 0.08)),
            (0.3, F::Frequency(C::Social, 0.08)),
            (0.2, F::Inverse(C::NegativeEmotion, 0.08)),
        ],
    },
    DomainRule {
        domain: "neuroticism",
        terms: &[
            (0.4, F::Frequency(C::NegativeEmotion, 0.08)),
            (0.4, F::Frequency(C::Anxiety, 0.05)),
            (0.2, F::Frequency(C::FirstPersonSingular, 0.12)),
        ],
    },
    DomainRule {
        domain: "narcissism",
        terms: &[(0.7, F::Frequency(C::FirstPersonSingular, 0.15)), (0.3, F::Inverse(C::FirstPersonPlural, 0.05))],
    },
    DomainRule {
        domain: "analytical_thinking",
        terms: &[(0.5, F::Frequency(C::Causation, 0.05)), (0.5, F::Frequency(C::Insight, 0.05))],
    },
    DomainRule {
        domain: "cognitive_complexity",
        terms: &[(1.0, F::CognitiveComplexity)],
    },
    DomainRule {
        domain: "empathy",
        terms: &[(0.5, F::Frequency(C::SecondPerson, 0.06)), (0.5, F::Frequency(C::Social, 0.08))],
    },
    DomainRule {
        domain: "emotional_stability",
        terms: &[(0.5, F::Inverse(C::NegativeEmotion, 0.08)), (0.5, F::Inverse(C::Anxiety, 0.05))],
    },
    DomainRule {
        domain: "emotional_expressiveness",
        terms: &[(0.5, F::Frequency(C::PositiveEmotion, 0.08)), (0.5, F::Frequency(C::NegativeEmotion, 0.08))],
    },
    DomainRule {
        domain: "optimism",
        terms: &[(0.6, F::Frequency(C::PositiveEmotion, 0.08)), (0.4, F::Inverse(C::NegativeEmotion, 0.08))],
    },
    DomainRule {
        domain: "stress_level",
        terms: &[
            (0.5, F::Frequency(C::Anxiety, 0.05)),
            (0.3, F::Frequency(C::NegativeEmotion, 0.08)),
            (0.2, F::Frequency(C::FirstPersonSingular, 0.12)),
        ],
    },
    DomainRule {
        domain: "social_anxiety",
        terms: &[(0.6, F::Frequency(C::Anxiety, 0.05)), (0.4, F::Inverse(C::Social, 0.08))],
    },
];

/// Raw counts and derived scores for one text.
#[derive(Debug, Clone, Default)]
pub struct LexiconAnalysis {
    pub token_count: usize,
    pub unique_count: usize,
    pub category_counts: HashMap<LexiconCategory, usize>,
    /// Distinct words that hit each category
    pub matched_words: HashMap<LexiconCategory, BTreeSet<String>>,
    pub domain_scores: Vec<(DomainId, f64)>,
    pub confidence: f64,
}

impl LexiconAnalysis {
    pub fn is_empty(&self) -> bool {
        self.token_count == 0
    }

    pub fn count(&self, category: LexiconCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    /// Per-word-count frequency of a category (0 for empty text).
    pub fn frequency(&self, category: LexiconCategory) -> f64 {
        if self.token_count == 0 {
            return 0.0;
        }
        self.count(category) as f64 / self.token_count as f64
    }

    pub fn vocabulary_richness(&self) -> f64 {
        if self.token_count == 0 {
            return 0.0;
        }
        self.unique_count as f64 / self.token_count as f64
    }

    pub fn cognitive_complexity(&self) -> f64 {
        let raw = self.frequency(LexiconCategory::Insight)
            + self.frequency(LexiconCategory::Causation)
            + self.frequency(LexiconCategory::Tentative);
        normalize(raw, 0.0, COGNITIVE_MAX)
    }

    fn feature_value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::VocabularyRichness => self.vocabulary_richness().clamp(0.0, 1.0),
            Feature::CognitiveComplexity => self.cognitive_complexity(),
            Feature::Frequency(c, max) => normalize(self.frequency(c), 0.0, max),
            Feature::Inverse(c, max) => 1.0 - normalize(self.frequency(c), 0.0, max),
            Feature::Scaled(c, scale) => (scale * self.frequency(c)).clamp(0.0, 1.0),
        }
    }
}

/// Word-category extractor producing the lexicon signal.
#[derive(Debug, Default, Clone)]
pub struct LexiconSignalExtractor;

impl LexiconSignalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize and score a text.
    pub fn analyze(&self, text: &str) -> LexiconAnalysis {
        let tokens = tokenize(text);
        let index = word_index();

        let mut analysis = LexiconAnalysis {
            token_count: tokens.len(),
            ..Default::default()
        };
        let mut unique: HashSet<&str> = HashSet::new();

        for token in &tokens {
            unique.insert(token.as_str());
            if let Some(categories) = index.get(token.as_str()) {
                for category in categories {
                    *analysis.category_counts.entry(*category).or_insert(0) += 1;
                    analysis
                        .matched_words
                        .entry(*category)
                        .or_default()
                        .insert(token.clone());
                }
            }
        }
        analysis.unique_count = unique.len();
        analysis.confidence = sample_confidence(tokens.len());

        analysis.domain_scores = RULES
            .iter()
            .map(|rule| {
                let score: f64 = rule
                    .terms
                    .iter()
                    .map(|(weight, feature)| weight * analysis.feature_value(*feature))
                    .sum();
                (DomainId::from(rule.domain), score.clamp(0.0, 1.0))
            })
            .collect();

        analysis
    }

    /// Observations for every lexicon-backed domain. Empty text yields none.
    pub fn observations(&self, analysis: &LexiconAnalysis) -> Vec<SignalObservation> {
        if analysis.is_empty() {
            return Vec::new();
        }
        RULES
            .iter()
            .zip(analysis.domain_scores.iter())
            .map(|(rule, (domain_id, score))| {
                let mut words: BTreeSet<String> = BTreeSet::new();
                for (_, feature) in rule.terms {
                    for category in feature.categories() {
                        if let Some(hits) = analysis.matched_words.get(&category) {
                            words.extend(hits.iter().cloned());
                        }
                    }
                }
                SignalObservation::new(domain_id.clone(), SignalType::Lexicon, *score, analysis.confidence)
                    .with_matched_words(words.into_iter().collect())
            })
            .collect()
    }

    /// Domains this extractor can score.
    pub fn domains(&self) -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|r| r.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_of(analysis: &LexiconAnalysis, domain: &str) -> f64 {
        analysis
            .domain_scores
            .iter()
            .find(|(d, _)| d.as_str() == domain)
            .map(|(_, s)| *s)
            .unwrap()
    }

    #[test]
    fn tokenize_strips_punctuation_keeps_apostrophes() {
        let tokens = tokenize("I'm HAPPY, really -- happy!!  ");
        assert_eq!(tokens, vec!["i'm", "happy", "really", "happy"]);
    }

    #[test]
    fn empty_text_yields_zero_counts() {
        let extractor = LexiconSignalExtractor::new();
        let analysis = extractor.analyze("   ...!!! ");
        assert!(analysis.is_empty());
        assert!(analysis.category_counts.is_empty());
        assert_eq!(analysis.frequency(LexiconCategory::Insight), 0.0);
        assert!(extractor.observations(&analysis).is_empty());
    }

    #[test]
    fn counts_category_hits() {
        let analysis = LexiconSignalExtractor::new().analyze("I think I know because I realize");
        assert_eq!(analysis.count(LexiconCategory::FirstPersonSingular), 3);
        assert_eq!(analysis.count(LexiconCategory::Insight), 3);
        assert_eq!(analysis.count(LexiconCategory::Causation), 1);
        assert_eq!(analysis.token_count, 7);
    }

    #[test]
    fn openness_combines_richness_complexity_and_insight() {
        // 4 tokens, all unique; insight 1/4, causation 1/4
        let analysis = LexiconSignalExtractor::new().analyze("think because red blue");
        let richness = 1.0;
        let complexity = normalize(0.5, 0.0, COGNITIVE_MAX); // clamps to 1
        let insight = (20.0 * 0.25_f64).clamp(0.0, 1.0);
        let expected = 0.4 * richness + 0.4 * complexity + 0.2 * insight;
        assert!((score_of(&analysis, "openness") - expected).abs() < 1e-12);
    }

    #[test]
    fn normalize_clamps_both_ends() {
        assert_eq!(normalize(-1.0, 0.0, 1.0), 0.0);
        assert_eq!(normalize(2.0, 0.0, 1.0), 1.0);
        assert!((normalize(0.25, 0.0, 0.5) - 0.5).abs() < 1e-12);
        assert_eq!(normalize(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn confidence_saturates_below_cap() {
        assert!((sample_confidence(0) - 0.3).abs() < 1e-12);
        let mut prev = 0.0;
        for n in [1, 10, 30, 100, 1_000, 100_000] {
            let c = sample_confidence(n);
            assert!(c > prev || c == 0.95);
            assert!(c <= 0.95);
            prev = c;
        }
    }

    #[test]
    fn observations_carry_matched_words() {
        let extractor = LexiconSignalExtractor::new();
        let analysis = extractor.analyze("so worried and anxious about the exam");
        let observations = extractor.observations(&analysis);
        let stress = observations
            .iter()
            .find(|o| o.domain_id.as_str() == "stress_level")
            .unwrap();
        assert_eq!(stress.signal_type, SignalType::Lexicon);
        assert!(stress.matched_words.contains(&"worried".to_string()));
        assert!(stress.matched_words.contains(&"anxious".to_string()));
        assert!((stress.confidence - analysis.confidence).abs() < 1e-12);
    }

    #[test]
    fn negative_text_scores_higher_neuroticism() {
        let extractor = LexiconSignalExtractor::new();
        let calm = extractor.analyze("we had a wonderful day together with friends");
        let upset = extractor.analyze("i am worried and sad and scared and upset");
        assert!(score_of(&upset, "neuroticism") > score_of(&calm, "neuroticism"));
        assert!(score_of(&calm, "optimism") > score_of(&upset, "optimism"));
    }
}
