//! Situational context detection and cross-context variance

mod classifier;
mod variance;

pub use classifier::{ContextClassification, ContextClassifier};
pub use variance::{ContextVariation, ContextVarianceAnalyzer, DEFAULT_SIGNIFICANCE_THRESHOLD};
