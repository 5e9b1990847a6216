//! Core data model: domains, contexts and score records

pub mod catalog;
mod context_type;
mod score;

pub use catalog::{category_of, DomainCategory, DomainDef, DOMAINS};
pub use context_type::ContextType;
pub use score::{weighted_mean_update, ContextDomainScore, DomainId, DomainScore, NEUTRAL_SCORE};
