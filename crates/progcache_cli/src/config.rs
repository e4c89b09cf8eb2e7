//! Tool configuration.

use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::Validator;
use progcache_core::DeviceIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/config.json");

/// Configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".progcache.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cache root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Kernel source extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Build options for every kernel.
    #[serde(default)]
    pub options: Option<String>,

    /// External compiler to build kernels with.
    #[serde(default)]
    pub compiler: Option<CompilerConfig>,

    /// Directory of the file this configuration was read from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub runtime_version: String,

    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceIdentity>,
}

fn default_cache_dir() -> String {
    ".progcache".to_string()
}

fn default_extension() -> String {
    "cl".to_string()
}

fn default_devices() -> Vec<DeviceIdentity> {
    vec![DeviceIdentity::new("", "default", "", "")]
}

impl Config {
    /// Loads `path`. Relative paths inside it resolve against its directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ConfigError::Invalid(format!("Invalid JSON: {}", e)))?;

        let schema: serde_json::Value = serde_json::from_str(SCHEMA_JSON)
            .map_err(|e| ConfigError::Invalid(format!("Invalid embedded schema: {}", e)))?;
        let validator = Validator::new(&schema)
            .map_err(|e| ConfigError::Invalid(format!("Invalid embedded schema: {}", e)))?;

        if let Err(e) = validator.validate(&value) {
            return Err(ConfigError::Invalid(format!(
                "validation failed: {} at {}",
                e,
                e.instance_path()
            )));
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Loads [`CONFIG_FILE`] from the working directory, or the defaults
    /// when there is none.
    pub fn discover() -> Result<Self, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Cache root with `base_dir` applied.
    pub fn cache_path(&self) -> PathBuf {
        let dir = Path::new(&self.cache_dir);
        match &self.base_dir {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir.to_path_buf(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            extension: default_extension(),
            options: None,
            compiler: None,
            base_dir: None,
        }
    }
}
