//! Application configuration
//!
//! Loaded from `config/portfolio-monitor.toml` (optional) and `PM_*`
//! environment variables, e.g. `PM_STORE__BASE_URL` or
//! `PM_SECURITY__MAX_REQUESTS_PER_WINDOW`.

use anyhow::{anyhow, Context, Result};
use audit_trail::AuditConfig;
use config::{Config, Environment, File};
use legacy_bridge::QueueConfig;
use portfolio_monitor_database::{CacheConfig, DataLayerConfig, StorageConfig, StoreConfig};
use security_guard::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "config/portfolio-monitor";
pub const ENV_PREFIX: &str = "PM";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for daily rolling log files
    pub log_dir: PathBuf,
    /// Log file prefix
    pub file_prefix: String,
    /// Mirror logs to stderr, keeping stdout for command output
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            file_prefix: "portfolio-monitor.log".to_string(),
            console: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub security: SecurityConfig,
    pub queue: QueueConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from `path` (or the default file) and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);
        let config = Config::builder()
            .add_source(File::with_name(file).required(path.is_some()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", file))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        app_config.validate()?;

        info!("Configuration loaded:");
        info!("  Store: {:?} at {}", app_config.store.backend, app_config.store.base_url);
        info!(
            "  Cache: max {} entries, ttl {}s",
            app_config.cache.max_size, app_config.cache.default_ttl_secs
        );
        info!(
            "  Rate Limiting: {} req/{}s",
            app_config.security.max_requests_per_window, app_config.security.rate_limit_window_secs
        );

        Ok(app_config)
    }

    pub fn data_layer(&self) -> DataLayerConfig {
        DataLayerConfig {
            store: self.store.clone(),
            cache: self.cache.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.data_layer().validate()?;
        self.security.validate().map_err(|e| anyhow!(e))?;

        if self.audit.max_buffer_size == 0 {
            return Err(anyhow!("Audit buffer size must be at least 1"));
        }
        if self.audit.backup_capacity == 0 {
            return Err(anyhow!("Audit backup capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.base_url, "http://localhost:4000");
        assert_eq!(config.audit.max_buffer_size, 1000);
        assert_eq!(config.queue.inter_item_delay_ms, 500);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[store]\nbackend = \"memory\"\n\n[cache]\nmax_size = 5\n\n[security]\nmax_requests_per_window = 3"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store.backend, portfolio_monitor_database::StoreBackend::Memory);
        assert_eq!(config.cache.max_size, 5);
        assert_eq!(config.security.max_requests_per_window, 3);
        // untouched sections keep their defaults
        assert_eq!(config.audit.backup_capacity, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.audit.max_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.security.rate_limit_window_secs = 0;
        assert!(config.validate().is_err());
    }
}
