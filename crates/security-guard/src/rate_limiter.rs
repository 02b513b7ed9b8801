//! Sliding-window rate limiting and the IP blocklist

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests inside the window before this one
    pub requests: usize,
    pub limit: usize,
}

/// Per-identifier request timestamps inside a sliding window
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    default_limit: usize,
    requests: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, default_limit: usize) -> Self {
        Self {
            window,
            default_limit,
            requests: DashMap::new(),
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_start(&self, now: Instant) -> Option<Instant> {
        now.checked_sub(self.window)
    }

    /// Check if the request is allowed and record it
    pub fn check(&self, identifier: &str, limit: Option<usize>) -> RateLimitDecision {
        let limit = limit.unwrap_or(self.default_limit);
        let now = Instant::now();
        let window_start = self.window_start(now);

        let mut requests = self.requests.entry(identifier.to_string()).or_default();
        if let Some(start) = window_start {
            requests.retain(|&timestamp| timestamp > start);
        }

        let count = requests.len();
        let allowed = count < limit;
        if allowed {
            requests.push(now);
        }

        RateLimitDecision {
            allowed,
            requests: count,
            limit,
        }
    }

    /// Requests currently inside the window for `identifier`
    pub fn request_count(&self, identifier: &str) -> usize {
        let window_start = self.window_start(Instant::now());
        self.requests.get(identifier).map_or(0, |requests| {
            requests
                .iter()
                .filter(|&&t| window_start.map_or(true, |start| t > start))
                .count()
        })
    }

    /// Drops stale timestamps and identifiers with no recent requests.
    /// Returns the number of identifiers removed.
    pub fn cleanup(&self) -> usize {
        let Some(start) = self.window_start(Instant::now()) else {
            return 0;
        };
        let before = self.requests.len();
        self.requests.retain(|_, requests| {
            requests.retain(|&t| t > start);
            !requests.is_empty()
        });
        before - self.requests.len()
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.requests.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct IpBlocklist {
    blocked: DashMap<String, BlockEntry>,
}

impl IpBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the ip was already blocked
    pub fn block(&self, ip: &str, reason: &str) -> bool {
        self.blocked
            .insert(
                ip.to_string(),
                BlockEntry {
                    reason: reason.to_string(),
                    blocked_at: Utc::now(),
                },
            )
            .is_none()
    }

    pub fn unblock(&self, ip: &str) -> bool {
        self.blocked.remove(ip).is_some()
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.contains_key(ip)
    }

    pub fn entry(&self, ip: &str) -> Option<BlockEntry> {
        self.blocked.get(ip).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1", None).allowed);
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        let rejected = limiter.check("10.0.0.1", None);
        assert!(!rejected.allowed);
        assert_eq!(rejected.requests, 3);

        // other identifiers are independent
        assert!(limiter.check("10.0.0.2", None).allowed);

        // 60s after the first request it has left the window
        tokio::time::advance(Duration::from_secs(57)).await;
        assert!(limiter.check("10.0.0.1", None).allowed);
        assert_eq!(limiter.request_count("10.0.0.1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 100);
        assert!(limiter.check("login", Some(1)).allowed);
        let decision = limiter.check("login", Some(1));
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 100);
        limiter.check("old", None);
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.check("new", None);
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked_identifiers(), 1);
        assert_eq!(limiter.request_count("new"), 1);
    }

    #[test]
    fn test_blocklist() {
        let list = IpBlocklist::new();
        assert!(list.block("203.0.113.9", "security_violation"));
        assert!(!list.block("203.0.113.9", "again"));
        assert!(list.is_blocked("203.0.113.9"));
        assert_eq!(list.entry("203.0.113.9").unwrap().reason, "again");

        assert!(list.unblock("203.0.113.9"));
        assert!(!list.unblock("203.0.113.9"));
        assert!(list.is_empty());
    }
}
