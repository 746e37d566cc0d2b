//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/gesture
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Pipeline configuration file (TOML)
    #[serde(default)]
    pub pipeline_config: Option<PathBuf>,

    /// Replay this dataset CSV instead of connecting to a glove
    #[serde(default)]
    pub replay: Option<PathBuf>,

    /// Skip the stale-buffer flush before each classification
    #[serde(default)]
    pub fast: bool,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "glove-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load configuration from `GLOVE_AGENT_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("GLOVE_AGENT").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
