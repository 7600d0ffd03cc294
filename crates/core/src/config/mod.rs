//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (GEOCACHE_*)
//! 2. TOML config file (if GEOCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (GEOCACHE_*)
/// 2. TOML config file (if GEOCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the search engine.
    ///
    /// Set via GEOCACHE_ES_URL environment variable.
    #[serde(default = "default_es_url")]
    pub es_url: String,

    /// Prefix of the info/features/services indices.
    ///
    /// Set via GEOCACHE_INDEX_NAME environment variable.
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Result-size ceiling used by `enforce_limit` and as the cardinality
    /// precision threshold.
    ///
    /// Set via GEOCACHE_LIMIT environment variable.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Result size used when a request carries no explicit limit.
    ///
    /// Set via GEOCACHE_DEFAULT_SIZE environment variable.
    #[serde(default = "default_size")]
    pub default_size: usize,

    /// Documents requested per scroll page.
    ///
    /// Set via GEOCACHE_SCROLL_PAGE_SIZE environment variable.
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: usize,

    /// Scroll context keep-alive, in engine time units (e.g. `30s`).
    ///
    /// Set via GEOCACHE_SCROLL_KEEP_ALIVE environment variable.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// Bucket count requested from the terms aggregation.
    ///
    /// Set via GEOCACHE_MAX_BUCKETS environment variable.
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,

    /// Legacy prefix-tree precision for the `geom` mapping (e.g. `1000m`).
    ///
    /// Set via GEOCACHE_SHAPE_PRECISION environment variable. Leave unset for
    /// engines that index shapes with BKD trees.
    #[serde(default)]
    pub shape_precision: Option<String>,

    /// Per-call deadline in milliseconds.
    ///
    /// Set via GEOCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_es_url() -> String {
    "http://localhost:9200".into()
}

fn default_index_name() -> String {
    "koop".into()
}

fn default_limit() -> usize {
    2_000
}

fn default_size() -> usize {
    10_000
}

fn default_scroll_page_size() -> usize {
    500
}

fn default_scroll_keep_alive() -> String {
    "30s".into()
}

fn default_max_buckets() -> usize {
    65_536
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            es_url: default_es_url(),
            index_name: default_index_name(),
            limit: default_limit(),
            default_size: default_size(),
            scroll_page_size: default_scroll_page_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            max_buckets: default_max_buckets(),
            shape_precision: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `GEOCACHE_`
    /// 2. TOML file from `GEOCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("GEOCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("GEOCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The runtime settings handed to each cache component.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            index_name: self.index_name.clone(),
            limit: self.limit,
            default_size: self.default_size,
            scroll_page_size: self.scroll_page_size,
            scroll_keep_alive: self.scroll_keep_alive.clone(),
            max_buckets: self.max_buckets,
            shape_precision: self.shape_precision.clone(),
            request_timeout: self.timeout(),
        }
    }
}

/// Immutable settings shared by the cache components.
///
/// Passed in at construction, so several independently configured caches can
/// live in one process.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub index_name: String,
    pub limit: usize,
    pub default_size: usize,
    pub scroll_page_size: usize,
    pub scroll_keep_alive: String,
    pub max_buckets: usize,
    pub shape_precision: Option<String>,
    pub request_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        AppConfig::default().cache_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.es_url, "http://localhost:9200");
        assert_eq!(config.index_name, "koop");
        assert_eq!(config.limit, 2_000);
        assert_eq!(config.default_size, 10_000);
        assert_eq!(config.scroll_page_size, 500);
        assert_eq!(config.scroll_keep_alive, "30s");
        assert_eq!(config.max_buckets, 65_536);
        assert!(config.shape_precision.is_none());
        assert_eq!(config.timeout_ms, 20_000);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_cache_config_carries_settings() {
        let config = AppConfig { index_name: "koop-tester".into(), limit: 50, ..Default::default() };
        let cache = config.cache_config();
        assert_eq!(cache.index_name, "koop-tester");
        assert_eq!(cache.limit, 50);
        assert_eq!(cache.request_timeout, Duration::from_millis(20_000));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("geocache.toml", r#"index_name = "fromfile"
limit = 100"#)?;
            jail.set_env("GEOCACHE_CONFIG_FILE", "geocache.toml");
            jail.set_env("GEOCACHE_LIMIT", "300");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.index_name, "fromfile");
            assert_eq!(config.limit, 300);
            assert_eq!(config.scroll_keep_alive, "30s");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GEOCACHE_SCROLL_PAGE_SIZE", "0");
            assert!(AppConfig::load().is_err());
            Ok(())
        });
    }
}
