//! Relationship triples and their append-only store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Unique identifier for a triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripleId(Uuid);

impl TripleId {
    /// Create a new random TripleId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TripleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TripleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    CorrelatesWith,
    Contradicts,
    Indicates,
    Discusses,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CorrelatesWith => "CORRELATES_WITH",
            Self::Contradicts => "CONTRADICTS",
            Self::Indicates => "INDICATES",
            Self::Discusses => "DISCUSSES",
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed node references: `kind:name`.
pub mod node {
    pub fn user(id: &str) -> String {
        format!("user:{}", id)
    }

    pub fn topic(name: &str) -> String {
        format!("topic:{}", name)
    }

    pub fn domain(id: &str) -> String {
        format!("domain:{}", id)
    }

    pub fn concept(name: &str) -> String {
        format!("concept:{}", name)
    }

    pub fn trait_(id: &str) -> String {
        format!("trait:{}", id)
    }

    pub fn behavior(name: &str) -> String {
        format!("behavior:{}", name)
    }

    /// The `kind` prefix of a node reference.
    pub fn kind(node: &str) -> Option<&str> {
        node.split_once(':').map(|(kind, _)| kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTriple {
    pub id: TripleId,
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
    pub weight: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RelationshipTriple {
    pub fn new(
        subject: impl Into<String>,
        predicate: Predicate,
        object: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: TripleId::new(),
            subject: subject.into(),
            predicate,
            object: object.into(),
            weight,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Append-only triple log. Only insert and bulk delete.
#[derive(Debug, Default)]
pub struct TripleStore {
    triples: RwLock<Vec<RelationshipTriple>>,
}

impl TripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, triple: RelationshipTriple) {
        self.triples
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(triple);
    }

    pub fn insert_batch(&self, triples: Vec<RelationshipTriple>) -> usize {
        let count = triples.len();
        self.triples
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(triples);
        count
    }

    pub fn all(&self) -> Vec<RelationshipTriple> {
        self.triples
            .read()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn with_predicate(&self, predicate: Predicate) -> Vec<RelationshipTriple> {
        self.triples
            .read()
            .map(|t| t.iter().filter(|x| x.predicate == predicate).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.triples.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bulk delete.
    pub fn clear(&self) {
        self.triples
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn restore(&self, triples: Vec<RelationshipTriple>) {
        *self.triples.write().unwrap_or_else(|e| e.into_inner()) = triples;
    }
}
