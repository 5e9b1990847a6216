//! Engine configuration, loaded from YAML
//!
//! Every field has a default; a YAML file only needs the keys it changes.
//!
//! ```yaml
//! user_id: alex
//! fusion_weights: { lexicon: 30, embedding: 30, llm: 40 }
//! deep_batch_size: 3
//! flush_interval_ms: 500
//! ```

use crate::relationship::RelationshipThresholds;
use crate::signal::{BatchTrigger, FusionWeights, PrototypeSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// External command backing the generative model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Subject of `user:<id> DISCUSSES topic:<t>` triples
    pub user_id: String,
    pub fusion_weights: FusionWeights,
    /// Queued messages that trigger a deep batch
    pub deep_batch_size: usize,
    /// Time since the last batch that triggers a deep batch
    pub deep_batch_interval_ms: u64,
    /// How often the deep ticker checks whether a batch is due
    pub deep_poll_interval_ms: u64,
    /// Data points a deep assessment contributes per domain
    pub deep_data_points: u64,
    /// Debounce interval for persistence
    pub flush_interval_ms: u64,
    pub significance_threshold: f64,
    pub relationships: RelationshipThresholds,
    /// Replaces the built-in embedding prototypes when set
    pub prototypes: Option<HashMap<String, Vec<String>>>,
    pub model: Option<ModelCommandConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            fusion_weights: FusionWeights::default(),
            deep_batch_size: 5,
            deep_batch_interval_ms: 300_000,
            deep_poll_interval_ms: 1000,
            deep_data_points: 1,
            flush_interval_ms: 1000,
            significance_threshold: 0.10,
            relationships: RelationshipThresholds::default(),
            prototypes: None,
            model: None,
        }
    }
}

impl EngineConfig {
    /// Parse YAML. Fusion weights that don't sum to 100 are redistributed;
    /// weights whose sum overflows are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: EngineConfig = serde_yaml::from_str(yaml)?;
        let w = config.fusion_weights;
        if w.checked_sum().is_none() {
            return Err(ConfigError::Invalid(format!(
                "fusion weights overflow: lexicon={} embedding={} llm={}",
                w.lexicon, w.embedding, w.llm
            )));
        }
        config.fusion_weights = FusionWeights::from_parts(w.lexicon, w.embedding, w.llm);
        config.deep_batch_size = config.deep_batch_size.max(1);
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Load `path` if given, else the default config file if it exists,
    /// else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => match default_config_path() {
                Some(p) if p.exists() => Self::load(p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn batch_trigger(&self) -> BatchTrigger {
        BatchTrigger {
            batch_size: self.deep_batch_size.max(1),
            interval: Duration::from_millis(self.deep_batch_interval_ms),
        }
    }

    pub fn deep_poll_interval(&self) -> Duration {
        Duration::from_millis(self.deep_poll_interval_ms.max(1))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn prototype_set(&self) -> PrototypeSet {
        match &self.prototypes {
            Some(map) => PrototypeSet::from_map(map.clone()),
            None => PrototypeSet::builtin(),
        }
    }
}

/// `<config dir>/idiolect/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("idiolect").join("config.yaml"))
}

/// `<data dir>/idiolect/idiolect.db`
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("idiolect").join("idiolect.db"))
}
