//! Configuration for NeuroShift
//!
//! Read from a TOML file whose settings live under a `[neuroshift]` table:
//!
//! ```toml
//! [neuroshift]
//! workers = 3
//! batch_size = 32
//! attack_delay_ms = 0
//!
//! [neuroshift.paths]
//! analytics = "data/analytics/"
//! datasets = "data/datasets/"
//!
//! [neuroshift.analytics]
//! file_fields = ["key"]
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "neuroconf.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    neuroshift: NeuroshiftConfig,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuroshiftConfig {
    /// Number of job queue workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Samples per inference batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause after each attack job, in milliseconds
    #[serde(default)]
    pub attack_delay_ms: u64,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Saved analytics, one JSON file each
    #[serde(default = "default_analytics_path")]
    pub analytics: PathBuf,

    /// Persisted datasets, one JSON file each
    #[serde(default = "default_datasets_path")]
    pub datasets: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Identity fields that make up analytic file names
    #[serde(default = "default_file_fields")]
    pub file_fields: Vec<String>,
}

fn default_workers() -> usize {
    3
}

fn default_batch_size() -> usize {
    32
}

fn default_analytics_path() -> PathBuf {
    PathBuf::from("data/analytics/")
}

fn default_datasets_path() -> PathBuf {
    PathBuf::from("data/datasets/")
}

fn default_file_fields() -> Vec<String> {
    vec!["key".to_string()]
}

impl Default for NeuroshiftConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            attack_delay_ms: 0,
            paths: PathsConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            analytics: default_analytics_path(),
            datasets: default_datasets_path(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            file_fields: default_file_fields(),
        }
    }
}

impl NeuroshiftConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        let config = file.neuroshift;
        config.validate()?;
        Ok(config)
    }

    /// Render in the on-disk layout, `[neuroshift]` table included.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&ConfigFile {
            neuroshift: self.clone(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };
        let content = self.to_toml().map_err(|e| write_error(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_error(e.to_string()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn attack_delay(&self) -> Duration {
        Duration::from_millis(self.attack_delay_ms)
    }

    /// Analytic file-name fields as borrowed strs, for the entity store.
    pub fn analytics_file_fields(&self) -> Vec<&str> {
        self.analytics.file_fields.iter().map(String::as_str).collect()
    }
}
