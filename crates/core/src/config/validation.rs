//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `es_url` is not an http(s) URL
    /// - `index_name` is empty, has uppercase letters or reserved characters
    /// - `limit`, `default_size` or `max_buckets` is 0
    /// - `scroll_page_size` is outside 1..=10000
    /// - `scroll_keep_alive` is not `<n>(ms|s|m|h)`
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.es_url.starts_with("http://") || self.es_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { field: "es_url".into(), reason: "must be an http(s) URL".into() });
        }

        if self.index_name.is_empty() {
            return Err(ConfigError::Invalid { field: "index_name".into(), reason: "must not be empty".into() });
        }
        if self
            .index_name
            .chars()
            .any(|c| c.is_ascii_uppercase() || matches!(c, ':' | '*' | ',' | '/' | '\\' | '?' | '"' | ' '))
        {
            return Err(ConfigError::Invalid {
                field: "index_name".into(),
                reason: "must be lowercase without reserved characters".into(),
            });
        }

        if self.limit == 0 {
            return Err(ConfigError::Invalid { field: "limit".into(), reason: "must be greater than 0".into() });
        }
        if self.default_size == 0 {
            return Err(ConfigError::Invalid { field: "default_size".into(), reason: "must be greater than 0".into() });
        }
        if self.max_buckets == 0 {
            return Err(ConfigError::Invalid { field: "max_buckets".into(), reason: "must be greater than 0".into() });
        }

        if !(1..=10_000).contains(&self.scroll_page_size) {
            return Err(ConfigError::Invalid {
                field: "scroll_page_size".into(),
                reason: "must be between 1 and 10000".into(),
            });
        }

        if !is_time_unit(&self.scroll_keep_alive) {
            return Err(ConfigError::Invalid {
                field: "scroll_keep_alive".into(),
                reason: "must look like 30s, 500ms, 5m or 1h".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        Ok(())
    }
}

/// Whether `value` is a positive integer followed by `ms`, `s`, `m` or `h`.
fn is_time_unit(value: &str) -> bool {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let (number, unit) = value.split_at(digits);
    number.parse::<u64>().is_ok_and(|n| n > 0) && matches!(unit, "ms" | "s" | "m" | "h")
}
