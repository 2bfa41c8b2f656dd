//! Layered simulation configuration.
//!
//! Values come from, in increasing precedence:
//! 1. Defaults
//! 2. A configuration file (YAML, or JSON for a `.json` extension)
//! 3. Environment variables with the `PTMSIM_` prefix

use std::path::Path;

use ptmsim_compile::CompilerConfig;
use ptmsim_state::StateConfig;
use serde::{Deserialize, Serialize};

/// Complete simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Density tensor engine settings
    #[serde(default)]
    pub state: StateConfig,

    /// Operation compiler settings
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "console" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: SimConfig = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            serde_yaml_ng::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        SimConfig::default().merge_env()
    }

    /// Load configuration with the following precedence:
    /// 1. Load from file if provided
    /// 2. Apply environment variable overrides
    /// 3. Validate the result
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = config_file {
            Self::from_file(path)?
        } else {
            SimConfig::default()
        };

        let config = config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Merge environment variables into this configuration.
    ///
    /// Unset variables, and values that fail to parse, leave the field
    /// unchanged.
    pub fn merge_env(mut self) -> Self {
        // Engine
        if let Ok(v) = std::env::var("PTMSIM_CACHE_CAPACITY") {
            if let Ok(val) = v.parse() {
                self.state.cache_capacity = val;
            }
        }
        if let Ok(v) = std::env::var("PTMSIM_RENORMALIZE_THRESHOLD") {
            if let Ok(val) = v.parse() {
                self.state.renormalize_threshold = val;
            }
        }
        if let Ok(v) = std::env::var("PTMSIM_MAX_THREADS_PER_GROUP") {
            if let Ok(val) = v.parse() {
                self.state.max_threads_per_group = val;
            }
        }
        if let Ok(v) = std::env::var("PTMSIM_MAX_SPECTATORS_SINGLE") {
            if let Ok(val) = v.parse() {
                self.state.max_spectators_single = val;
            }
        }
        if let Ok(v) = std::env::var("PTMSIM_LAZY_ALLOC") {
            if let Ok(val) = v.parse() {
                self.state.lazy_alloc = val;
            }
        }

        // Compiler
        if let Ok(v) = std::env::var("PTMSIM_SPARSITY_TOLERANCE") {
            if let Ok(val) = v.parse() {
                self.compiler.sparsity_tolerance = val;
            }
        }
        if let Ok(v) = std::env::var("PTMSIM_DEFAULT_DIM_HILBERT") {
            if let Ok(val) = v.parse() {
                self.compiler.default_dim_hilbert = Some(val);
            }
        }

        // Logging
        if let Ok(v) = std::env::var("PTMSIM_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("PTMSIM_LOG_FORMAT") {
            self.logging.format = v;
        }

        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.state
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("state: {e}")))?;
        self.compiler
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("compiler: {e}")))?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {other}"
                )));
            }
        }

        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
