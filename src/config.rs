//! Engine configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ast::IsolationLevel;
use crate::engine::batch::ThresholdPolicy;
use crate::error::{RdbError, RdbResult};

/// Batch merging thresholds. Missing means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Flush a merged group once it holds this many statements
    #[serde(default)]
    pub statement_threshold: Option<i64>,

    /// Flush a merged group once it holds this many parameters
    #[serde(default)]
    pub parameter_threshold: Option<i64>,
}

impl BatchConfig {
    /// Grouping policy for these thresholds
    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy::new(self.statement_threshold, self.parameter_threshold)
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub batch: BatchConfig,

    /// Isolation level for transactions that don't name one
    #[serde(default)]
    pub isolation_level: Option<IsolationLevel>,

    /// Log every compiled statement at debug level
    #[serde(default)]
    pub trace_statements: bool,
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn from_toml_str(s: &str) -> RdbResult<Self> {
        toml::from_str(s).map_err(|e| RdbError::Config(format!("invalid engine config: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> RdbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/qail-rdb/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("qail-rdb").join("config.toml"))
    }

    /// Load from [`default_path`](Self::default_path), or defaults when absent.
    pub fn load_default() -> RdbResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading engine config from: {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the statement threshold
    pub fn statement_threshold(mut self, threshold: i64) -> Self {
        self.config.batch.statement_threshold = Some(threshold);
        self
    }

    /// Set the parameter threshold
    pub fn parameter_threshold(mut self, threshold: i64) -> Self {
        self.config.batch.parameter_threshold = Some(threshold);
        self
    }

    /// Set the default isolation level
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.config.isolation_level = Some(level);
        self
    }

    /// Enable statement tracing
    pub fn trace_statements(mut self, enabled: bool) -> Self {
        self.config.trace_statements = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// A named database server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseServer {
    pub name: String,

    /// Connection URL; `mysql://localhost/<name>` when unset
    #[serde(default)]
    pub url: Option<String>,
}

impl DatabaseServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn connection_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("mysql://localhost/{}", self.name))
    }
}
