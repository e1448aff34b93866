//! Configuration management for the engine.

use crudkit_engine::UnknownFieldPolicy;
use std::env;

/// Default number of batch items processed concurrently.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Default upper bound on the number of items in one batch call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Batch items in flight at once; 1 processes items sequentially
    pub batch_concurrency: usize,
    /// Larger batches are rejected before any item runs; `None` is unbounded
    pub max_batch_size: Option<usize>,
    /// How patches treat keys that name no declared field
    pub unknown_fields: UnknownFieldPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            max_batch_size: Some(DEFAULT_MAX_BATCH_SIZE),
            unknown_fields: UnknownFieldPolicy::Reject,
        }
    }
}

impl EngineConfig {
    /// Builder-style method to set batch concurrency. Zero is raised to one.
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Builder-style method to set the batch size limit.
    pub fn with_max_batch_size(mut self, limit: Option<usize>) -> Self {
        self.max_batch_size = limit;
        self
    }

    /// Builder-style method to set the unknown-field policy.
    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    ///
    /// - `CRUDKIT_BATCH_CONCURRENCY`: positive integer
    /// - `CRUDKIT_MAX_BATCH_SIZE`: positive integer, or `0` for unbounded
    /// - `CRUDKIT_UNKNOWN_FIELDS`: `reject` or `ignore`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("CRUDKIT_BATCH_CONCURRENCY") {
            config.batch_concurrency = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidBatchConcurrency(raw)),
            };
        }

        if let Some(raw) = lookup("CRUDKIT_MAX_BATCH_SIZE") {
            config.max_batch_size = match raw.trim().parse::<usize>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => return Err(ConfigError::InvalidMaxBatchSize(raw)),
            };
        }

        if let Some(raw) = lookup("CRUDKIT_UNKNOWN_FIELDS") {
            config.unknown_fields = match raw.trim().to_ascii_lowercase().as_str() {
                "reject" => UnknownFieldPolicy::Reject,
                "ignore" => UnknownFieldPolicy::Ignore,
                _ => return Err(ConfigError::InvalidUnknownFields(raw)),
            };
        }

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid CRUDKIT_BATCH_CONCURRENCY value: {0}")]
    InvalidBatchConcurrency(String),

    #[error("invalid CRUDKIT_MAX_BATCH_SIZE value: {0}")]
    InvalidMaxBatchSize(String),

    #[error("invalid CRUDKIT_UNKNOWN_FIELDS value: {0} (expected reject or ignore)")]
    InvalidUnknownFields(String),
}
