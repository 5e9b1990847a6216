//! Accumulated domain estimates, aggregate and per context

pub mod confidence;
mod store;

pub use confidence::{ConfidenceFactor, ConfidenceFactors, FactorRecord};
pub use store::{ContextScoreStore, DomainScoreStore};
