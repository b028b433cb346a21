use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub use crate::graph::GraphConfig;
pub use crate::nats::NatsConfig;

/// Environment variable naming the integrator's config file
pub const CONFIG_ENV: &str = "PLANTGRAPH_CONFIG";

/// Config file read when `PLANTGRAPH_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "plantgraph.toml";

/// Complete integrator configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlantConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub sdf: SdfConfig,
}

/// Self-description location
#[derive(Debug, Clone, Deserialize)]
pub struct SdfConfig {
    #[serde(default = "default_sdf_directory")]
    pub directory: String,
}

fn default_sdf_directory() -> String {
    std::env::var("SDF_DIR").unwrap_or_else(|_| "sdf".to_string())
}

impl Default for SdfConfig {
    fn default() -> Self {
        Self {
            directory: default_sdf_directory(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<PlantConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .context(format!("Failed to read config file '{}'", path.display()))?;
    let config: PlantConfig = toml::from_str(&contents)
        .context(format!("Failed to parse config file '{}'", path.display()))?;
    Ok(config)
}

/// Config file path from `PLANTGRAPH_CONFIG`, or the default
pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}
