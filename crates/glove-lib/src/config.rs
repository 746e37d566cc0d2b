//! Pipeline configuration
//!
//! One immutable snapshot, built at start-up from an optional TOML file
//! layered under `GLOVE_*` environment variables, then handed to each
//! component's constructor. Nothing re-reads configuration mid-run.

use crate::collector::CollectionConfig;
use crate::error::{GloveError, Result};
use crate::models::GestureVocabulary;
use crate::peripheral::PeripheralConfig;
use crate::reader::ReaderConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "GLOVE";

/// Complete configuration for acquisition, training and inference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub general: GeneralConfig,
    pub peripheral: PeripheralConfig,
    pub reader: ReaderConfig,
    pub collection: CollectionConfig,
    pub training: TrainingConfig,
    pub paths: PathsConfig,
}

/// Parameters shared by every stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Number of capacitive sensors on the glove
    pub sensor_count: usize,
    /// Ordered gesture names; position is the class index
    pub gestures: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            sensor_count: 7,
            gestures: vec![
                "rock".to_string(),
                "paper".to_string(),
                "scissors".to_string(),
            ],
        }
    }
}

/// Artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Labeled dataset CSV
    pub dataset: PathBuf,
    /// Trained classifier artifact
    pub model: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/example_dataset.csv"),
            model: PathBuf::from("trained_models/example_model.json"),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("general.gestures"),
            )
            .build()?;

        let parsed: PipelineConfig = config.try_deserialize()?;
        parsed.validate()?;

        tracing::debug!(
            sensor_count = parsed.general.sensor_count,
            gestures = ?parsed.general.gestures,
            "Pipeline configuration loaded"
        );

        Ok(parsed)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.general.sensor_count == 0 {
            return Err(GloveError::Config("general.sensor_count must be at least 1".into()));
        }
        self.vocabulary()?;

        if self.collection.num_sets == 0 || self.collection.num_reps == 0 {
            return Err(GloveError::Config(
                "collection.num_sets and collection.num_reps must be at least 1".into(),
            ));
        }
        if self.training.batch_size == 0 {
            return Err(GloveError::Config("training.batch_size must be at least 1".into()));
        }
        if self.training.validation_interval == 0 {
            return Err(GloveError::Config(
                "training.validation_interval must be at least 1".into(),
            ));
        }
        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            return Err(GloveError::Config(
                "training.learning_rate must be a positive number".into(),
            ));
        }
        if self.training.hidden_units == 0 {
            return Err(GloveError::Config("training.hidden_units must be at least 1".into()));
        }
        if self.peripheral.read_timeout_ms == 0 {
            return Err(GloveError::Config("peripheral.read_timeout_ms must be at least 1".into()));
        }

        Ok(())
    }

    /// The gesture vocabulary described by `general.gestures`
    pub fn vocabulary(&self) -> Result<GestureVocabulary> {
        GestureVocabulary::new(self.general.gestures.iter().cloned())
    }
}
