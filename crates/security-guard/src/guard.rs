//! # Security Guard
//!
//! Gatekeeper for user input and incoming requests. Combines the sanitizer,
//! rate limiter and IP blocklist, and records every security-relevant
//! outcome as a [`SecurityEvent`] mirrored into the audit log.

use audit_trail::event::{into_details, IdentityProvider, ANONYMOUS_USER};
use audit_trail::AuditLog;
use chrono::{Duration as ChronoDuration, Utc};
use metrics::increment_counter;
use parking_lot::Mutex;
use portfolio_monitor_core::{AppResult, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::events::{
    SecurityEvent, SecurityStats, ThreatReport, HIGH_SECURITY_ACTIVITY, IP_BLOCKED, IP_UNBLOCKED,
    RATE_LIMIT_EXCEEDED,
};
use crate::rate_limiter::{IpBlocklist, RateLimiter};
use crate::sanitizer::{sanitize, InputKind};

/// Request metadata checked by [`SecurityGuard::validate_request`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub ip: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

const MIN_USER_AGENT_LEN: usize = 10;

pub struct SecurityGuard {
    config: SecurityConfig,
    audit: Arc<AuditLog>,
    identity: Arc<dyn IdentityProvider>,
    limiter: RateLimiter,
    blocklist: IpBlocklist,
    events: Mutex<VecDeque<SecurityEvent>>,
}

impl SecurityGuard {
    pub fn new(
        config: SecurityConfig,
        audit: Arc<AuditLog>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_window(), config.max_requests_per_window);
        Self {
            events: Mutex::new(VecDeque::with_capacity(config.max_security_events)),
            config,
            audit,
            identity,
            limiter,
            blocklist: IpBlocklist::new(),
        }
    }

    /// Sanitize `input` as `kind`; security-relevant rejections are logged
    #[instrument(skip(self, input))]
    pub fn sanitize_input(&self, input: &str, kind: InputKind) -> AppResult<String> {
        match sanitize(input, kind) {
            Ok(cleaned) => Ok(cleaned),
            Err(rejection) => {
                if let Some(event) = rejection.event {
                    let details = match kind {
                        InputKind::Sql => json!({
                            "pattern": rejection.pattern,
                            "input": rejection.preview,
                        }),
                        _ => json!({
                            "type": kind.as_str(),
                            "pattern": "suspicious_content",
                            "input": rejection.preview,
                        }),
                    };
                    self.log_security_event(event, details);
                }
                Err(rejection.error)
            }
        }
    }

    /// Admit or reject one request for `identifier`
    pub fn check_rate_limit(&self, identifier: &str, limit: Option<usize>) -> bool {
        let decision = self.limiter.check(identifier, limit);
        if !decision.allowed {
            self.log_security_event(
                RATE_LIMIT_EXCEEDED,
                json!({
                    "identifier": identifier,
                    "requests": decision.requests,
                    "limit": decision.limit,
                }),
            );
        }
        decision.allowed
    }

    pub fn block_ip(&self, ip: &str, reason: &str) {
        self.blocklist.block(ip, reason);
        self.log_security_event(
            IP_BLOCKED,
            json!({ "ip": ip, "reason": reason, "timestamp": Utc::now() }),
        );
    }

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.blocklist.is_blocked(ip)
    }

    pub fn unblock_ip(&self, ip: &str) {
        self.blocklist.unblock(ip);
        self.log_security_event(IP_UNBLOCKED, json!({ "ip": ip, "timestamp": Utc::now() }));
    }

    pub fn validate_request(&self, request: &RequestInfo) -> RequestValidation {
        let mut validation = RequestValidation {
            is_valid: true,
            ..Default::default()
        };

        if self.is_ip_blocked(&request.ip) {
            validation.is_valid = false;
            validation.errors.push("IP address is blocked".to_string());
        }

        if !self.check_rate_limit(&request.ip, None) {
            validation.is_valid = false;
            validation.errors.push("Rate limit exceeded".to_string());
        }

        let user_agent_ok = request
            .user_agent
            .as_ref()
            .map_or(false, |ua| ua.chars().count() >= MIN_USER_AGENT_LEN);
        if !user_agent_ok {
            validation.warnings.push("Suspicious user agent".to_string());
        }

        if let Some(referer) = &request.referer {
            if !self.is_valid_referer(referer) {
                validation.warnings.push("Invalid referer".to_string());
            }
        }

        validation
    }

    /// Same origin, or a host containing one of the trusted domains
    pub fn is_valid_referer(&self, referer: &str) -> bool {
        let Ok(referer) = url::Url::parse(referer) else {
            return false;
        };

        let same_origin = url::Url::parse(&self.config.origin)
            .map(|origin| origin.origin() == referer.origin())
            .unwrap_or(false);

        same_origin
            || referer.host_str().map_or(false, |host| {
                self.config
                    .trusted_domains
                    .iter()
                    .any(|domain| host.contains(domain.as_str()))
            })
    }

    pub fn log_security_event(&self, event: &str, details: Value) -> SecurityEvent {
        let record = SecurityEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event: event.to_string(),
            details: into_details(details.clone()),
            user_id: self
                .identity
                .user_id()
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            ip: self.config.client_ip.clone(),
            user_agent: self.config.user_agent.clone(),
        };

        {
            let mut events = self.events.lock();
            events.push_back(record.clone());
            while events.len() > self.config.max_security_events {
                events.pop_front();
            }
        }

        self.audit.log_security_event(event, details);
        increment_counter!("security_events_total", "event" => event.to_string());
        warn!(event = %record.event, ip = %record.ip, "Security Event");
        record
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn security_stats(&self, range: TimeRange) -> SecurityStats {
        let now = Utc::now();
        let recent: Vec<SecurityEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| range.contains(now, e.timestamp))
            .cloned()
            .collect();
        SecurityStats::from_events(&recent, self.blocklist.len())
    }

    /// Flags bursts of events in the last minute and blocks noisy IPs
    pub fn analyze_threats(&self) -> ThreatReport {
        let cutoff = Utc::now() - ChronoDuration::minutes(1);
        let recent: Vec<SecurityEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .cloned()
            .collect();

        let mut report = ThreatReport {
            recent_events: recent.len(),
            ..Default::default()
        };

        if recent.len() > self.config.high_activity_threshold {
            report.high_activity = true;
            self.log_security_event(
                HIGH_SECURITY_ACTIVITY,
                json!({ "eventsCount": recent.len(), "timeWindow": "1 minute" }),
            );
        }

        let mut by_ip: BTreeMap<&str, usize> = BTreeMap::new();
        for event in &recent {
            *by_ip.entry(event.ip.as_str()).or_insert(0) += 1;
        }
        for (ip, count) in by_ip {
            if count > self.config.per_ip_block_threshold && !self.is_ip_blocked(ip) {
                self.block_ip(ip, "multiple_security_violations");
                report.newly_blocked.push(ip.to_string());
            }
        }

        debug!(?report, "Security threat analysis complete");
        report
    }

    /// Drops rate-limit state for identifiers with no recent requests
    pub fn cleanup_rate_limits(&self) -> usize {
        self.limiter.cleanup()
    }

    pub fn blocked_ip_count(&self) -> usize {
        self.blocklist.len()
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_trail::{AuditConfig, NoIdentity};
    use portfolio_monitor_core::Severity;

    fn guard_with(config: SecurityConfig) -> (SecurityGuard, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new(AuditConfig::default(), Arc::new(NoIdentity)));
        (
            SecurityGuard::new(config, audit.clone(), Arc::new(NoIdentity)),
            audit,
        )
    }

    fn guard() -> (SecurityGuard, Arc<AuditLog>) {
        guard_with(SecurityConfig::default())
    }

    #[tokio::test]
    async fn test_sanitize_logs_suspicious_input() {
        let (guard, audit) = guard();

        assert_eq!(guard.sanitize_input("hello world", InputKind::Text).unwrap(), "hello world");

        let err = guard
            .sanitize_input("<script>alert(1)</script>", InputKind::Html)
            .unwrap_err();
        assert!(err.is_validation());

        let events = guard.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "SUSPICIOUS_INPUT");
        assert_eq!(events[0].details["type"], "html");

        let audited = audit.recent();
        assert_eq!(audited[0].action, "SECURITY_SUSPICIOUS_INPUT");
        assert_eq!(audited[0].details["severity"], "high");

        // plain validation failures are not security events
        assert!(guard.sanitize_input("nobody", InputKind::Email).is_err());
        assert_eq!(guard.events().len(), 1);
    }

    #[tokio::test]
    async fn test_sql_attempt_is_logged() {
        let (guard, _) = guard();
        assert!(guard.sanitize_input("' OR 1=1 --", InputKind::Sql).is_err());
        let stats = guard.security_stats(TimeRange::LastHour);
        assert_eq!(stats.sql_injection_attempts, 1);
        assert_eq!(stats.suspicious_inputs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_event() {
        let (guard, _) = guard();
        assert!(guard.check_rate_limit("user-1", Some(2)));
        assert!(guard.check_rate_limit("user-1", Some(2)));
        assert!(!guard.check_rate_limit("user-1", Some(2)));

        let events = guard.events();
        assert_eq!(events[0].event, "RATE_LIMIT_EXCEEDED");
        assert_eq!(events[0].details["limit"], 2);
        assert_eq!(guard.security_stats(TimeRange::LastDay).rate_limit_violations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_request() {
        let (guard, _) = guard();

        let ok = guard.validate_request(&RequestInfo {
            ip: "192.0.2.1".into(),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".into()),
            referer: Some("http://localhost:3000/dashboard".into()),
        });
        assert!(ok.is_valid);
        assert!(ok.warnings.is_empty());

        let odd = guard.validate_request(&RequestInfo {
            ip: "192.0.2.1".into(),
            user_agent: Some("curl".into()),
            referer: Some("https://evil.example/".into()),
        });
        assert!(odd.is_valid);
        assert_eq!(odd.warnings, vec!["Suspicious user agent", "Invalid referer"]);

        guard.block_ip("192.0.2.1", "security_violation");
        let blocked = guard.validate_request(&RequestInfo {
            ip: "192.0.2.1".into(),
            ..Default::default()
        });
        assert!(!blocked.is_valid);
        assert_eq!(blocked.errors, vec!["IP address is blocked"]);

        guard.unblock_ip("192.0.2.1");
        assert!(!guard.is_ip_blocked("192.0.2.1"));
        let names: Vec<String> = guard.events().into_iter().map(|e| e.event).collect();
        assert_eq!(names, vec!["IP_BLOCKED", "IP_UNBLOCKED"]);
    }

    #[test]
    fn test_referer_rules() {
        let (guard, _) = guard();
        assert!(guard.is_valid_referer("http://localhost:3000/"));
        assert!(guard.is_valid_referer("http://127.0.0.1:8080/x"));
        assert!(!guard.is_valid_referer("not a url"));
        assert!(!guard.is_valid_referer("https://example.org/"));
    }

    #[tokio::test]
    async fn test_analyze_threats_blocks_noisy_ip() {
        let (guard, audit) = guard_with(SecurityConfig {
            client_ip: "198.51.100.7".into(),
            ..Default::default()
        });
        for _ in 0..11 {
            let _ = guard.sanitize_input("javascript:alert(1)", InputKind::Text);
        }

        let report = guard.analyze_threats();
        assert_eq!(report.recent_events, 11);
        assert!(report.high_activity);
        assert_eq!(report.newly_blocked, vec!["198.51.100.7"]);
        assert!(guard.is_ip_blocked("198.51.100.7"));

        let second = guard.analyze_threats();
        assert!(second.newly_blocked.is_empty());

        assert!(audit
            .recent()
            .iter()
            .any(|e| e.action == "SECURITY_HIGH_SECURITY_ACTIVITY" && e.severity == Severity::Low));
    }

    #[test]
    fn test_event_list_is_bounded() {
        let (guard, _) = guard_with(SecurityConfig {
            max_security_events: 5,
            ..Default::default()
        });
        for i in 0..8 {
            guard.log_security_event("TEST", json!({ "seq": i }));
        }
        let events = guard.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].details["seq"], 3);
    }
}
