//! Engine configuration, persisted as TOML.
//!
//! Process-wide switches (`GOVERNANCE_BYPASS`, `GOVERNANCE_VERSION`) are not
//! part of this file; they are read per call through
//! [`crate::governance::ConfigProvider`].

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::HakPaths;
use crate::statement::SchemaLimits;

/// Errors from reading or writing the config file.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(hakgal::config::read),
        help("Check that the config file exists and is readable, or run `hakgal init`.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(hakgal::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(hakgal::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Source tag used when the context does not name one.
pub const DEFAULT_SOURCE: &str = "TransactionalGovernanceEngine";

fn default_latency_budget_ms() -> u64 {
    100
}

fn default_source() -> String {
    DEFAULT_SOURCE.into()
}

/// Configuration for a [`crate::engine::GovernanceEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite file. `None` keeps the store in memory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Constitution JSON. `None` uses the built-in v3 constitution.
    #[serde(default)]
    pub constitution_path: Option<PathBuf>,
    /// A governed call slower than this is logged and counted as an SLO miss.
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
    #[serde(default = "default_source")]
    pub default_source: String,
    #[serde(default)]
    pub limits: SchemaLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            constitution_path: None,
            latency_budget_ms: default_latency_budget_ms(),
            default_source: default_source(),
            limits: SchemaLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Config for an on-disk database, everything else default.
    pub fn with_db(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Fill unset locations from the XDG defaults: the database always, the
    /// constitution only when `constitution.json` exists in the config dir.
    pub fn with_default_paths(mut self, paths: &HakPaths) -> Self {
        if self.db_path.is_none() {
            self.db_path = Some(paths.db_file());
        }
        if self.constitution_path.is_none() {
            let candidate = paths.constitution_file();
            if candidate.is_file() {
                self.constitution_path = Some(candidate);
            }
        }
        self
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ConfigWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }
}
