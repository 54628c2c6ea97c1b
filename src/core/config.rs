use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::generation::{HttpGenerationConfig, SimulatedConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Folder the session records live in between steps (and between runs).
    #[serde(default = "default_session")]
    pub session_folder: String,

    /// Optional YAML file overriding the built-in avatar/voice catalogs.
    pub catalog_file: Option<String>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    pub simulated: Option<SimulatedConfig>,
    pub http: Option<HttpGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_enabled")]
    pub enabled: bool,
}

fn default_session() -> String {
    "session".to_string()
}
fn default_generation_provider() -> String {
    "simulated".to_string()
}
fn default_preview_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_folder: default_session(),
            catalog_file: None,
            generation: GenerationConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            simulated: None,
            http: None,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: default_preview_enabled(),
        }
    }
}

impl Config {
    /// Loads `config.yml` from the working directory. The defaults cover the
    /// simulated backend, so a missing file is not an error.
    pub fn load_or_default() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            log::debug!("config.yml not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        let config: Config =
            serde_yaml_ng::from_str(&content).context("Failed to parse config.yml")?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.session_folder)?;
        Ok(())
    }
}
