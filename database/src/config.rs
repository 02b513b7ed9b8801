//! # Data Layer Configuration
//!
//! Settings for the record store client, the TTL cache and local storage,
//! with defaults and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which record store implementation backs the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON server over HTTP
    #[default]
    Rest,
    /// Seeded in-process fixtures
    Memory,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON server base URL
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Rest,
            base_url: "http://localhost:4000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// In-process TTL cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of live entries
    pub max_size: usize,
    /// Default TTL for entries in seconds
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Local key-value storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// File backing the persistent store; memory only when unset
    pub local_path: Option<PathBuf>,
}

/// Master configuration for the data layer
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataLayerConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

impl DataLayerConfig {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.base_url.is_empty() {
            return Err(anyhow::anyhow!("Store base URL cannot be empty"));
        }
        url::Url::parse(&self.store.base_url)
            .map_err(|e| anyhow::anyhow!("Store base URL is invalid: {}", e))?;

        if self.store.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be positive"));
        }

        if self.cache.max_size == 0 {
            return Err(anyhow::anyhow!("Cache max size must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DataLayerConfig::default();
        assert_eq!(config.store.base_url, "http://localhost:4000");
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.cache.default_ttl().as_secs(), 300);
        assert!(config.storage.local_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = DataLayerConfig::default();
        config.store.base_url = "".to_string();
        assert!(config.validate().is_err());

        let mut config = DataLayerConfig::default();
        config.store.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = DataLayerConfig::default();
        config.cache.max_size = 0;
        assert!(config.validate().is_err());
    }
}
