//! Derived relationship triples over the aggregate scores

mod builder;
mod triple;

pub use builder::{RelationshipGraphBuilder, RelationshipThresholds};
pub use triple::{node, Predicate, RelationshipTriple, TripleId, TripleStore};
