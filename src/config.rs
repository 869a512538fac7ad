//! Engine configuration.
//!
//! Configuration comes from an optional JSON file; command-line flags are
//! applied on top by the binary.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A desktop browser identity; some publishers refuse obvious bot agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Upper bound on `max_age_years`; staleness beyond a millennium is meaningless.
pub const MAX_AGE_YEARS_LIMIT: u32 = 1000;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// What consolidation does with an inline mark whose definition is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDefinitionPolicy {
    /// Keep the mark and its number, list nothing for it, record a warning
    #[default]
    Keep,
    /// Remove the mark from the text and record a warning
    Drop,
}

/// Tunables for validation and consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Size of the URL probe worker pool
    pub workers: usize,
    /// Per-probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// User agent sent with probes
    pub user_agent: String,
    /// Published dates older than this many years are flagged
    pub max_age_years: u32,
    pub missing_definitions: MissingDefinitionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: 8,
            probe_timeout_secs: 8,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_age_years: 10,
            missing_definitions: MissingDefinitionPolicy::Keep,
        }
    }
}

impl EngineConfig {
    /// Loads and validates configuration from a JSON file. Missing fields
    /// take their default values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_age_years > MAX_AGE_YEARS_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "max_age_years",
                message: format!("must be at most {}", MAX_AGE_YEARS_LIMIT),
            });
        }
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "probe_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
