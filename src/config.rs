//! Client configuration
//!
//! Retry and confirmation settings shared by every multisig component.
//! Missing fields in a config file fall back to their defaults.

use crate::ledger::{ConfirmationConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Settings for talking to the ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationConfig,
}

impl ClientConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.confirmation.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "confirmation.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings suited to an in-process ledger: short polls and backoff
    pub fn fast() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: 5,
                base_delay_ms: 1,
                max_delay_ms: 10,
            },
            confirmation: ConfirmationConfig {
                timeout_ms: 2_000,
                poll_interval_ms: 1,
            },
        }
    }
}
