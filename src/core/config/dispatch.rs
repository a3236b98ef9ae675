//! Dispatcher and result cache configuration.

use super::errors::{ConfigError, ConfigValidator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capacity bound of the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCapacity {
    /// At most this many entries.
    Entries(usize),
    /// At most this many bytes of cached output buffers.
    Bytes(usize),
}

impl Default for CacheCapacity {
    fn default() -> Self {
        CacheCapacity::Entries(256)
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Eviction bound.
    #[serde(default)]
    pub capacity: CacheCapacity,
}

impl CacheConfig {
    /// Cache bounded by entry count.
    pub fn entries(n: usize) -> Self {
        Self {
            capacity: CacheCapacity::Entries(n),
        }
    }

    /// Cache bounded by total output bytes.
    pub fn bytes(n: usize) -> Self {
        Self {
            capacity: CacheCapacity::Bytes(n),
        }
    }
}

impl ConfigValidator for CacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.capacity {
            CacheCapacity::Entries(n) => self.validate_positive_usize(n, "cache capacity (entries)"),
            CacheCapacity::Bytes(n) => self.validate_positive_usize(n, "cache capacity (bytes)"),
        }
    }
}

fn default_max_concurrency() -> usize {
    1
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of concurrent `run()` calls against the session.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Queue deadline applied to requests that do not carry their own.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    /// Result cache; disabled when absent.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_timeout_ms: None,
            cache: None,
        }
    }
}

impl DispatchConfig {
    /// Creates the default configuration (`K = 1`, no deadline, no cache).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency bound.
    pub fn max_concurrency(mut self, k: usize) -> Self {
        self.max_concurrency = k;
        self
    }

    /// Sets the default queue deadline.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Enables the result cache.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Default queue deadline as a duration.
    pub fn default_timeout_duration(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

impl ConfigValidator for DispatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_thread_count(self.max_concurrency)?;
        if self.default_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidConfig {
                message: "default_timeout_ms must be greater than 0 when set".to_string(),
            });
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        Ok(())
    }
}
