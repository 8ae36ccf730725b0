//! Configuration loading from capstan.toml.

use provider::ModelConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "capstan.toml";

/// `catalog` value that selects the live models.dev database.
const MODELS_DEV: &str = "models.dev";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Reference used when `--model` is not given.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Models gateway URL. Requires `DOCKER_TOKEN`.
    #[serde(default)]
    pub gateway: Option<String>,

    /// `"models.dev"` or a path to a models.dev JSON file.
    #[serde(default)]
    pub catalog: Option<String>,

    /// Dotenv file consulted after the process environment.
    #[serde(default)]
    pub env_file: Option<PathBuf>,

    /// Named model configs. An entry with no provider and a comma-separated
    /// model list is an alloy.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    /// Per-agent default models.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub model: String,
}

/// Where model metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    ModelsDev,
    File(PathBuf),
}

impl Config {
    /// Load configuration from a TOML file. A missing file is an empty config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The default reference for `agent`, or the top-level default.
    pub fn default_ref(&self, agent: Option<&str>) -> Result<Option<&str>, ConfigError> {
        match agent {
            Some(name) => self
                .agents
                .get(name)
                .map(|agent| Some(agent.model.as_str()))
                .ok_or_else(|| ConfigError::UnknownAgent(name.to_string())),
            None => Ok(self.default_model.as_deref()),
        }
    }

    pub fn catalog_source(&self) -> Option<CatalogSource> {
        let catalog = self.catalog.as_deref()?.trim();
        match catalog {
            "" => None,
            MODELS_DEV => Some(CatalogSource::ModelsDev),
            path => Some(CatalogSource::File(PathBuf::from(path))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no agent named '{0}' in config")]
    UnknownAgent(String),
}
