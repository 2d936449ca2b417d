//! Configuration for the permission cache manager

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PermCacheError, Result};

/// Longest TTL a cached permission set may be given (one year)
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Store call configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Background maintenance configuration
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl ManagerConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PermCacheError::Io {
            message: format!("Failed to read config {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the cache unsafe or useless
    pub fn validate(&self) -> Result<()> {
        if self.cache.base_ttl_secs == 0 {
            return Err(PermCacheError::Config {
                reason: "cache.base_ttl_secs must be greater than zero".to_string(),
            });
        }
        let longest_ttl = self
            .cache
            .base_ttl_secs
            .saturating_add(self.cache.max_jitter_secs);
        if longest_ttl > MAX_TTL_SECS {
            return Err(PermCacheError::Config {
                reason: format!(
                    "cache.base_ttl_secs + cache.max_jitter_secs must be at most {} (one year), got {}",
                    MAX_TTL_SECS, longest_ttl
                ),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(PermCacheError::Config {
                reason: "cache.max_entries must be greater than zero".to_string(),
            });
        }
        if self.store.timeout_ms == 0 {
            return Err(PermCacheError::Config {
                reason: "store.timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.maintenance.sweep_interval_secs == 0 {
            return Err(PermCacheError::Config {
                reason: "maintenance.sweep_interval_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Replace the cache section
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the store call timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the maintenance sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.maintenance.sweep_interval_secs = interval.as_secs().max(1);
        self
    }
}

fn default_true() -> bool {
    true
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled; when false every check reads the store
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base time-to-live for a cached permission set, in seconds
    #[serde(default = "default_base_ttl")]
    pub base_ttl_secs: u64,

    /// Upper bound of the random extra TTL added per entry, in seconds
    #[serde(default = "default_max_jitter")]
    pub max_jitter_secs: u64,

    /// Maximum cached resources
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_base_ttl() -> u64 {
    3600
}
fn default_max_jitter() -> u64 {
    600
}
fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_ttl_secs: default_base_ttl(),
            max_jitter_secs: default_max_jitter(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    /// Set base TTL
    pub fn with_base_ttl(mut self, ttl: Duration) -> Self {
        self.base_ttl_secs = ttl.as_secs();
        self
    }

    /// Set max jitter
    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter_secs = jitter.as_secs();
        self
    }

    /// Set max entries
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Enable or disable caching
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn base_ttl(&self) -> Duration {
        Duration::from_secs(self.base_ttl_secs)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_secs(self.max_jitter_secs)
    }
}

/// Store call configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Per-call timeout in milliseconds; kept short, this is a hot path
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_store_timeout() -> u64 {
    250
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Background maintenance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between expired-entry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl MaintenanceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
