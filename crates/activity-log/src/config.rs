// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants;
use crate::error::ConfigError;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Service configuration, read from `ACTIVITY_LOG_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bound of the ingestion queue
    pub queue_capacity: usize,
    /// Records per bulk write
    pub batch_size: usize,
    /// Seconds between timer-driven flushes
    pub flush_interval_secs: u64,
    /// Deadline for a bulk write, in seconds
    pub write_timeout_secs: u64,
    /// Sustained rate per client address
    pub rate_limit_per_minute: u32,
    /// Requests a client may make back to back
    pub rate_limit_burst: u32,
    /// HTTP listen port
    pub port: u16,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: constants::QUEUE_CAPACITY,
            batch_size: constants::MAX_BATCH_SIZE,
            flush_interval_secs: constants::FLUSH_INTERVAL.as_secs(),
            write_timeout_secs: constants::BULK_WRITE_TIMEOUT.as_secs(),
            rate_limit_per_minute: constants::DEFAULT_REQUESTS_PER_MINUTE,
            rate_limit_burst: constants::DEFAULT_BURST,
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            queue_capacity: parse_or(
                lookup("ACTIVITY_LOG_QUEUE_CAPACITY"),
                defaults.queue_capacity,
            ),
            batch_size: parse_or(lookup("ACTIVITY_LOG_BATCH_SIZE"), defaults.batch_size),
            flush_interval_secs: parse_or(
                lookup("ACTIVITY_LOG_FLUSH_INTERVAL_SECS"),
                defaults.flush_interval_secs,
            ),
            write_timeout_secs: parse_or(
                lookup("ACTIVITY_LOG_WRITE_TIMEOUT_SECS"),
                defaults.write_timeout_secs,
            ),
            rate_limit_per_minute: parse_or(
                lookup("ACTIVITY_LOG_RATE_LIMIT_PER_MINUTE"),
                defaults.rate_limit_per_minute,
            ),
            rate_limit_burst: parse_or(
                lookup("ACTIVITY_LOG_RATE_LIMIT_BURST"),
                defaults.rate_limit_burst,
            ),
            port: parse_or(lookup("ACTIVITY_LOG_PORT"), defaults.port),
            log_level: lookup("ACTIVITY_LOG_LOG_LEVEL")
                .map(|val| val.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 || self.queue_capacity > constants::MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue capacity must be between 1 and {}",
                constants::MAX_QUEUE_CAPACITY
            )));
        }
        if self.batch_size == 0 || self.batch_size > constants::MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "batch size must be between 1 and {}",
                constants::MAX_BATCH_SIZE
            )));
        }
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "flush interval must be at least one second".to_string(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "write timeout must be at least one second".to_string(),
            ));
        }
        if self.rate_limit_per_minute == 0 || self.rate_limit_burst == 0 {
            return Err(ConfigError::Invalid(
                "rate limit and burst must be greater than 0".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(
                "port must be greater than 0".to_string(),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            bulk_write_timeout: Duration::from_secs(self.write_timeout_secs),
            fallback_write_timeout: constants::FALLBACK_WRITE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig::per_minute(self.rate_limit_per_minute, self.rate_limit_burst)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|val| val.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Sizing and deadlines of the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub bulk_write_timeout: Duration,
    /// Deadline for the single write used when the queue is full
    pub fallback_write_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: constants::QUEUE_CAPACITY,
            batch_size: constants::MAX_BATCH_SIZE,
            flush_interval: constants::FLUSH_INTERVAL,
            bulk_write_timeout: constants::BULK_WRITE_TIMEOUT,
            fallback_write_timeout: constants::FALLBACK_WRITE_TIMEOUT,
        }
    }
}

/// Per-client admission budget: `burst` requests at once, then one every `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub burst: u32,
    pub interval: Duration,
}

impl RateLimiterConfig {
    /// Budget for `requests` per minute with the given burst.
    ///
    /// `requests` and `burst` are clamped to at least 1.
    #[must_use]
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        Self {
            burst: burst.max(1),
            interval: Duration::from_secs(60) / requests.max(1),
        }
    }

    /// 100 requests per minute, burst of 20.
    #[must_use]
    pub fn default_profile() -> Self {
        Self::per_minute(constants::DEFAULT_REQUESTS_PER_MINUTE, constants::DEFAULT_BURST)
    }

    /// 10 requests per minute, burst of 5. For sensitive endpoints.
    #[must_use]
    pub fn strict() -> Self {
        Self::per_minute(constants::STRICT_REQUESTS_PER_MINUTE, constants::STRICT_BURST)
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::default_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_without_vars_uses_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).expect("defaults are valid");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("ACTIVITY_LOG_QUEUE_CAPACITY", "50"),
            ("ACTIVITY_LOG_BATCH_SIZE", " 5 "),
            ("ACTIVITY_LOG_FLUSH_INTERVAL_SECS", "2"),
            ("ACTIVITY_LOG_PORT", "9090"),
            ("ACTIVITY_LOG_LOG_LEVEL", "DEBUG"),
        ]))
        .expect("overrides are valid");

        assert_eq!(config.queue_capacity, 50);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.flush_interval_secs, 2);
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("ACTIVITY_LOG_BATCH_SIZE", "ten"),
            ("ACTIVITY_LOG_PORT", "99999"),
        ]))
        .expect("fallbacks are valid");

        assert_eq!(config.batch_size, constants::MAX_BATCH_SIZE);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_validate_zero_values() {
        let config = Config {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            flush_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            rate_limit_burst: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_upper_bounds() {
        let config = Config {
            batch_size: constants::MAX_BATCH_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            queue_capacity: constants::MAX_QUEUE_CAPACITY + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            queue_capacity: constants::MAX_QUEUE_CAPACITY,
            batch_size: constants::MAX_BATCH_SIZE,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_oversized_values() {
        let result = Config::from_lookup(lookup_from(&[("ACTIVITY_LOG_BATCH_SIZE", "25")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let huge = usize::MAX.to_string();
        let result = Config::from_lookup(lookup_from(&[(
            "ACTIVITY_LOG_QUEUE_CAPACITY",
            huge.as_str(),
        )]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_lookup_rejects_zero_batch_size() {
        let result = Config::from_lookup(lookup_from(&[("ACTIVITY_LOG_BATCH_SIZE", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{level}' should be valid"
            );
        }
    }

    #[test]
    fn test_pipeline_config_from_defaults() {
        assert_eq!(Config::default().pipeline(), PipelineConfig::default());
    }

    #[test]
    fn test_rate_limiter_profiles() {
        let default = RateLimiterConfig::default_profile();
        assert_eq!(default.burst, 20);
        assert_eq!(default.interval, Duration::from_millis(600));

        let strict = RateLimiterConfig::strict();
        assert_eq!(strict.burst, 5);
        assert_eq!(strict.interval, Duration::from_secs(6));

        assert_eq!(Config::default().rate_limiter(), default);
    }

    #[test]
    fn test_per_minute_clamps_zero() {
        let config = RateLimiterConfig::per_minute(0, 0);
        assert_eq!(config.burst, 1);
        assert_eq!(config.interval, Duration::from_secs(60));
    }
}
