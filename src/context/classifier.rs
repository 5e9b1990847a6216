//! ContextClassifier — rule-based situational context detection
//!
//! Each context has a keyword list and a few regex patterns. A keyword
//! present in the message adds `1 × weight` to its context, a matching
//! pattern adds `2 × weight`. The highest score wins; ties go to the
//! earlier context in enumeration order, and a message with no evidence
//! is `social_casual`.

use crate::domain::ContextType;
use crate::signal::lexicon::tokenize;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

const KEYWORD_POINTS: f64 = 1.0;
const PATTERN_POINTS: f64 = 2.0;
const SINGLE_MULTIPLIER: f64 = 0.5;
const MULTI_MULTIPLIER: f64 = 0.4;
const NO_EVIDENCE_CONFIDENCE: f64 = 0.3;

fn keywords(ctx: ContextType) -> &'static [&'static str] {
    match ctx {
        ContextType::WorkProfessional => &[
            "work", "job", "office", "meeting", "meetings", "boss", "manager", "client",
            "clients", "project", "deadline", "colleague", "coworker", "career", "promotion",
            "presentation", "team", "email",
        ],
        ContextType::SocialCasual => &[
            "friend", "friends", "party", "hangout", "hang", "chat", "fun", "drinks", "bar",
            "weekend", "lol", "haha", "dinner", "catch",
        ],
        ContextType::PersonalIntimate => &[
            "love", "relationship", "partner", "boyfriend", "girlfriend", "husband", "wife",
            "feelings", "feel", "heart", "intimate", "date", "dating", "miss", "lonely",
        ],
        ContextType::CreativeExpressive => &[
            "art", "write", "writing", "paint", "painting", "music", "song", "draw", "design",
            "create", "creative", "poem", "story", "novel", "sketch",
        ],
        ContextType::IntellectualAnalytical => &[
            "theory", "research", "analysis", "analyze", "data", "study", "science",
            "philosophy", "logic", "hypothesis", "evidence", "concept", "argument", "book",
        ],
        ContextType::StressfulChallenging => &[
            "stress", "stressed", "pressure", "overwhelmed", "anxious", "worried", "problem",
            "crisis", "difficult", "struggle", "struggling", "exhausted", "panic", "conflict",
        ],
        ContextType::LeisureRecreational => &[
            "game", "games", "gaming", "movie", "movies", "travel", "vacation", "holiday",
            "hiking", "hobby", "relax", "relaxing", "sport", "sports", "beach", "show",
        ],
        ContextType::FinancialPractical => &[
            "money", "budget", "rent", "bills", "bill", "pay", "salary", "savings", "invest",
            "investment", "loan", "debt", "tax", "taxes", "price", "mortgage", "bank",
        ],
        ContextType::HealthWellness => &[
            "health", "doctor", "exercise", "workout", "gym", "sleep", "diet", "sick",
            "therapy", "therapist", "meditation", "run", "running", "medication", "pain",
        ],
        ContextType::FamilyDomestic => &[
            "family", "mom", "dad", "mother", "father", "kids", "children", "son", "daughter",
            "brother", "sister", "home", "house", "parents", "chores", "cooking",
        ],
    }
}

fn patterns(ctx: ContextType) -> &'static [&'static str] {
    match ctx {
        ContextType::WorkProfessional => &[
            r"\bmy (boss|manager|coworkers?|colleagues?|team)\b",
            r"\b(at|from|after) work\b",
            r"\b(quarterly|performance) review\b",
        ],
        ContextType::SocialCasual => &[
            r"\b(hanging|hang) out\b",
            r"\bmy (friends?|buddies|mates)\b",
        ],
        ContextType::PersonalIntimate => &[
            r"\bi (love|miss) (you|him|her|them)\b",
            r"\bmy (partner|boyfriend|girlfriend|husband|wife)\b",
        ],
        ContextType::CreativeExpressive => &[
            r"\b(working on|writing) (a|my) (song|novel|poem|story|painting)\b",
            r"\bcreative (project|block)\b",
        ],
        ContextType::IntellectualAnalytical => &[
            r"\b(i('ve| have)?|been) (reading|researching|studying)\b",
            r"\bthe (theory|evidence|research) (of|on|suggests)\b",
        ],
        ContextType::StressfulChallenging => &[
            r"\b(so|really|too) (stressed|overwhelmed|anxious)\b",
            r"\bcan'?t (cope|handle|deal)\b",
        ],
        ContextType::LeisureRecreational => &[
            r"\b(on|going on) (vacation|holiday)\b",
            r"\b(watched|watching|played|playing) (a|the)? ?(movie|game|show)\b",
        ],
        ContextType::FinancialPractical => &[
            r"\b(pay|paying) (the|my|off) ",
            r"\bsave (money|up)\b",
        ],
        ContextType::HealthWellness => &[
            r"\b(went|going) to the (gym|doctor)\b",
            r"\b(my|a) (workout|therapy session)\b",
        ],
        ContextType::FamilyDomestic => &[
            r"\bmy (mom|dad|mother|father|kids|children|son|daughter|parents|family)\b",
            r"\bat home\b",
        ],
    }
}

fn compiled_patterns() -> &'static Vec<(ContextType, Vec<Regex>)> {
    static PATTERNS: OnceLock<Vec<(ContextType, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ContextType::ALL
            .iter()
            .map(|ctx| {
                let compiled = patterns(*ctx)
                    .iter()
                    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
                    .collect();
                (*ctx, compiled)
            })
            .collect()
    })
}

/// Relative importance per context; scales both keyword and pattern points.
fn default_weight(ctx: ContextType) -> f64 {
    match ctx {
        ContextType::StressfulChallenging => 1.2,
        ContextType::SocialCasual => 0.8,
        ContextType::LeisureRecreational => 0.9,
        _ => 1.0,
    }
}

/// Result of classifying one message or a window.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextClassification {
    pub primary: ContextType,
    pub confidence: f64,
    /// Score per context, indexed by [`ContextType::index`]
    pub scores: [f64; 10],
    /// Keywords and pattern matches found, per context
    pub matched: BTreeMap<ContextType, Vec<String>>,
}

impl ContextClassification {
    pub fn score(&self, ctx: ContextType) -> f64 {
        self.scores[ctx.index()]
    }

    pub fn total(&self) -> f64 {
        self.scores.iter().sum()
    }
}

/// Argmax with the earlier context winning ties; social_casual when empty.
fn primary_of(scores: &[f64; 10]) -> (ContextType, f64) {
    let mut best = 0;
    for i in 1..scores.len() {
        if scores[i] > scores[best] {
            best = i;
        }
    }
    if scores[best] <= 0.0 {
        return (ContextType::SocialCasual, 0.0);
    }
    (ContextType::ALL[best], scores[best])
}

fn confidence_of(max: f64, total: f64, multiplier: f64) -> f64 {
    if total > 0.0 {
        (max / (total * multiplier)).min(1.0)
    } else {
        NO_EVIDENCE_CONFIDENCE
    }
}

#[derive(Debug, Clone)]
pub struct ContextClassifier {
    weights: [f64; 10],
}

impl Default for ContextClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextClassifier {
    pub fn new() -> Self {
        let mut weights = [1.0; 10];
        for ctx in ContextType::ALL {
            weights[ctx.index()] = default_weight(ctx);
        }
        Self { weights }
    }

    pub fn with_weight(mut self, ctx: ContextType, weight: f64) -> Self {
        self.weights[ctx.index()] = weight.max(0.0);
        self
    }

    pub fn weight(&self, ctx: ContextType) -> f64 {
        self.weights[ctx.index()]
    }

    /// Raw per-context evidence for one message.
    fn evidence(&self, text: &str) -> ([f64; 10], BTreeMap<ContextType, Vec<String>>) {
        let tokens: HashSet<String> = tokenize(text).into_iter().collect();
        let mut scores = [0.0; 10];
        let mut matched: BTreeMap<ContextType, Vec<String>> = BTreeMap::new();

        for (ctx, regexes) in compiled_patterns() {
            let weight = self.weights[ctx.index()];
            for keyword in keywords(*ctx) {
                if tokens.contains(*keyword) {
                    scores[ctx.index()] += KEYWORD_POINTS * weight;
                    matched.entry(*ctx).or_default().push((*keyword).to_string());
                }
            }
            for re in regexes {
                if let Some(m) = re.find(text) {
                    scores[ctx.index()] += PATTERN_POINTS * weight;
                    matched
                        .entry(*ctx)
                        .or_default()
                        .push(m.as_str().trim().to_lowercase());
                }
            }
        }
        (scores, matched)
    }

    pub fn classify(&self, text: &str) -> ContextClassification {
        let (scores, matched) = self.evidence(text);
        let (primary, max) = primary_of(&scores);
        let total: f64 = scores.iter().sum();
        ContextClassification {
            primary,
            confidence: confidence_of(max, total, SINGLE_MULTIPLIER),
            scores,
            matched,
        }
    }

    /// Classify a window by summing its per-message score vectors.
    pub fn classify_many<S: AsRef<str>>(&self, texts: &[S]) -> ContextClassification {
        let mut scores = [0.0; 10];
        let mut matched: BTreeMap<ContextType, Vec<String>> = BTreeMap::new();
        for text in texts {
            let (s, m) = self.evidence(text.as_ref());
            for (acc, v) in scores.iter_mut().zip(s.iter()) {
                *acc += v;
            }
            for (ctx, words) in m {
                matched.entry(ctx).or_default().extend(words);
            }
        }
        let (primary, max) = primary_of(&scores);
        let total: f64 = scores.iter().sum();
        ContextClassification {
            primary,
            confidence: confidence_of(max, total, MULTI_MULTIPLIER),
            scores,
            matched,
        }
    }
}
