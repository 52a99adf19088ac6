//! Engine configuration.
//!
//! Bundles the retry policy, rate limiter buckets, consensus thresholds and
//! exit criteria. Configuration can come from defaults, `DEBATE_*`
//! environment variables or a YAML document; every source ends in
//! `validate()`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::{ConsensusThresholds, ExitCriteria};
use crate::llm::{BucketConfig, RateLimiterConfig, RetryPolicy};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML document could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for the debate engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry behaviour for every worker call.
    pub retry: RetryPolicy,
    /// Token buckets per provider.
    pub rate_limits: RateLimiterConfig,
    /// Agreement levels that map to high/medium consensus.
    pub consensus: ConsensusThresholds,
    /// Early termination settings.
    pub exit_criteria: ExitCriteria,
    /// Bucket tokens consumed by one worker call.
    pub tokens_per_call: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rate_limits: RateLimiterConfig::default(),
            consensus: ConsensusThresholds::default(),
            exit_criteria: ExitCriteria::default(),
            tokens_per_call: 1,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DEBATE_MAX_ATTEMPTS`: Attempts per worker call (default: 3)
    /// - `DEBATE_INITIAL_BACKOFF_MS`: First retry delay (default: 1000)
    /// - `DEBATE_BACKOFF_MULTIPLIER`: Backoff growth factor (default: 2.0)
    /// - `DEBATE_MAX_BACKOFF_MS`: Backoff cap (default: 30000)
    /// - `DEBATE_RATE_MAX_TOKENS`: Default bucket capacity (default: 50)
    /// - `DEBATE_RATE_REFILL_RATE`: Tokens per interval (default: 10)
    /// - `DEBATE_RATE_REFILL_INTERVAL_MS`: Refill interval (default: 1000)
    /// - `DEBATE_RATE_MAX_WAIT_MS`: Longest limiter wait (default: 30000)
    /// - `DEBATE_CONSENSUS_HIGH`: High consensus threshold (default: 0.8)
    /// - `DEBATE_CONSENSUS_MEDIUM`: Medium consensus threshold (default: 0.5)
    /// - `DEBATE_EXIT_ENABLED`: Enable early termination (default: true)
    /// - `DEBATE_EXIT_THRESHOLD`: Agreement needed to qualify (default: 0.9)
    /// - `DEBATE_EXIT_CONVERGENCE_ROUNDS`: Qualifying rounds needed (default: 2)
    /// - `DEBATE_TOKENS_PER_CALL`: Bucket tokens per call (default: 1)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Retry settings
        if let Some(val) = lookup("DEBATE_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env_value(&val, "DEBATE_MAX_ATTEMPTS")?;
        }
        if let Some(val) = lookup("DEBATE_INITIAL_BACKOFF_MS") {
            config.retry.initial_backoff_ms = parse_env_value(&val, "DEBATE_INITIAL_BACKOFF_MS")?;
        }
        if let Some(val) = lookup("DEBATE_BACKOFF_MULTIPLIER") {
            config.retry.backoff_multiplier = parse_env_value(&val, "DEBATE_BACKOFF_MULTIPLIER")?;
        }
        if let Some(val) = lookup("DEBATE_MAX_BACKOFF_MS") {
            config.retry.max_backoff_ms = parse_env_value(&val, "DEBATE_MAX_BACKOFF_MS")?;
        }

        // Rate limiter settings
        if let Some(val) = lookup("DEBATE_RATE_MAX_TOKENS") {
            config.rate_limits.default_bucket.max_tokens =
                parse_env_value(&val, "DEBATE_RATE_MAX_TOKENS")?;
        }
        if let Some(val) = lookup("DEBATE_RATE_REFILL_RATE") {
            config.rate_limits.default_bucket.refill_rate =
                parse_env_value(&val, "DEBATE_RATE_REFILL_RATE")?;
        }
        if let Some(val) = lookup("DEBATE_RATE_REFILL_INTERVAL_MS") {
            config.rate_limits.default_bucket.refill_interval_ms =
                parse_env_value(&val, "DEBATE_RATE_REFILL_INTERVAL_MS")?;
        }
        if let Some(val) = lookup("DEBATE_RATE_MAX_WAIT_MS") {
            config.rate_limits.max_wait_ms = parse_env_value(&val, "DEBATE_RATE_MAX_WAIT_MS")?;
        }

        // Consensus settings
        if let Some(val) = lookup("DEBATE_CONSENSUS_HIGH") {
            config.consensus.high = parse_env_value(&val, "DEBATE_CONSENSUS_HIGH")?;
        }
        if let Some(val) = lookup("DEBATE_CONSENSUS_MEDIUM") {
            config.consensus.medium = parse_env_value(&val, "DEBATE_CONSENSUS_MEDIUM")?;
        }

        // Exit criteria
        if let Some(val) = lookup("DEBATE_EXIT_ENABLED") {
            config.exit_criteria.enabled = parse_env_bool(&val, "DEBATE_EXIT_ENABLED")?;
        }
        if let Some(val) = lookup("DEBATE_EXIT_THRESHOLD") {
            config.exit_criteria.consensus_threshold =
                parse_env_value(&val, "DEBATE_EXIT_THRESHOLD")?;
        }
        if let Some(val) = lookup("DEBATE_EXIT_CONVERGENCE_ROUNDS") {
            config.exit_criteria.convergence_rounds =
                parse_env_value(&val, "DEBATE_EXIT_CONVERGENCE_ROUNDS")?;
        }

        if let Some(val) = lookup("DEBATE_TOKENS_PER_CALL") {
            config.tokens_per_call = parse_env_value(&val, "DEBATE_TOKENS_PER_CALL")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed or validated.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Retry validation
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::ValidationFailed(
                "retry.initial_backoff_ms cannot exceed retry.max_backoff_ms".to_string(),
            ));
        }

        // Rate limiter validation
        validate_bucket("rate_limits.default_bucket", &self.rate_limits.default_bucket)?;
        for (provider, bucket) in &self.rate_limits.providers {
            validate_bucket(&format!("rate_limits.providers.{}", provider), bucket)?;
        }

        if self.tokens_per_call == 0 {
            return Err(ConfigError::ValidationFailed(
                "tokens_per_call must be greater than 0".to_string(),
            ));
        }

        let smallest_bucket = self
            .rate_limits
            .providers
            .values()
            .map(|b| b.max_tokens)
            .chain(std::iter::once(self.rate_limits.default_bucket.max_tokens))
            .min()
            .unwrap_or(0);
        if self.tokens_per_call > smallest_bucket {
            return Err(ConfigError::ValidationFailed(format!(
                "tokens_per_call ({}) cannot exceed the smallest bucket capacity ({})",
                self.tokens_per_call, smallest_bucket
            )));
        }

        // Consensus validation
        if !(0.0..=1.0).contains(&self.consensus.high)
            || !(0.0..=1.0).contains(&self.consensus.medium)
        {
            return Err(ConfigError::ValidationFailed(
                "consensus thresholds must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.consensus.medium > self.consensus.high {
            return Err(ConfigError::ValidationFailed(
                "consensus.medium cannot exceed consensus.high".to_string(),
            ));
        }

        // Exit criteria validation
        if !(0.0..=1.0).contains(&self.exit_criteria.consensus_threshold) {
            return Err(ConfigError::ValidationFailed(
                "exit_criteria.consensus_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.exit_criteria.convergence_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "exit_criteria.convergence_rounds must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method to set the rate limiter configuration.
    pub fn with_rate_limits(mut self, rate_limits: RateLimiterConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Builder method to set consensus thresholds.
    pub fn with_consensus(mut self, consensus: ConsensusThresholds) -> Self {
        self.consensus = consensus;
        self
    }

    /// Builder method to set exit criteria.
    pub fn with_exit_criteria(mut self, exit_criteria: ExitCriteria) -> Self {
        self.exit_criteria = exit_criteria;
        self
    }

    /// Builder method to set tokens consumed per call.
    pub fn with_tokens_per_call(mut self, tokens: u32) -> Self {
        self.tokens_per_call = tokens;
        self
    }
}

fn validate_bucket(name: &str, bucket: &BucketConfig) -> Result<(), ConfigError> {
    if bucket.max_tokens == 0 {
        return Err(ConfigError::ValidationFailed(format!(
            "{}.max_tokens must be greater than 0",
            name
        )));
    }
    if bucket.refill_rate == 0 {
        return Err(ConfigError::ValidationFailed(format!(
            "{}.refill_rate must be greater than 0",
            name
        )));
    }
    if bucket.refill_interval_ms == 0 {
        return Err(ConfigError::ValidationFailed(format!(
            "{}.refill_interval_ms must be greater than 0",
            name
        )));
    }
    Ok(())
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
