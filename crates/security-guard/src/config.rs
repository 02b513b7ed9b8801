use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Security configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub rate_limit_window_secs: u64,
    pub max_requests_per_window: usize,
    pub max_security_events: usize,
    /// Origin requests are expected to come from
    pub origin: String,
    /// Referer hosts accepted besides the origin (substring match)
    pub trusted_domains: Vec<String>,
    /// Address recorded on security events raised by this process
    pub client_ip: String,
    pub user_agent: String,
    /// Events within one minute that count as high activity
    pub high_activity_threshold: usize,
    /// Events from one IP within one minute that trigger a block
    pub per_ip_block_threshold: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_secs: 60,
            max_requests_per_window: 100,
            max_security_events: 1000,
            origin: "http://localhost:3000".to_string(),
            trusted_domains: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            client_ip: "127.0.0.1".to_string(),
            user_agent: format!("portfolio-monitor/{}", env!("CARGO_PKG_VERSION")),
            high_activity_threshold: 10,
            per_ip_block_threshold: 5,
        }
    }
}

impl SecurityConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit_window_secs == 0 {
            return Err("rate_limit_window_secs must be greater than 0".to_string());
        }
        if self.max_requests_per_window == 0 {
            return Err("max_requests_per_window must be greater than 0".to_string());
        }
        if self.max_security_events == 0 {
            return Err("max_security_events must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.max_requests_per_window, 100);
        assert!(config.validate().is_ok());

        let bad = SecurityConfig {
            max_requests_per_window: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
