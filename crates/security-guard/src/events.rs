//! Security event records and statistics

use chrono::{DateTime, Utc};
use portfolio_monitor_core::stats::tally;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::sanitizer::{SQL_INJECTION_ATTEMPT, SUSPICIOUS_INPUT};

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const IP_BLOCKED: &str = "IP_BLOCKED";
pub const IP_UNBLOCKED: &str = "IP_UNBLOCKED";
pub const HIGH_SECURITY_ACTIVITY: &str = "HIGH_SECURITY_ACTIVITY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub user_id: String,
    pub ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStats {
    pub total_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub blocked_ips: usize,
    pub rate_limit_violations: usize,
    pub suspicious_inputs: usize,
    pub sql_injection_attempts: usize,
}

impl SecurityStats {
    pub fn from_events(events: &[SecurityEvent], blocked_ips: usize) -> Self {
        let events_by_type = tally(events, |e| e.event.clone());
        let count = |name: &str| events_by_type.get(name).copied().unwrap_or(0);
        let rate_limit_violations = count(RATE_LIMIT_EXCEEDED);
        let suspicious_inputs = count(SUSPICIOUS_INPUT);
        let sql_injection_attempts = count(SQL_INJECTION_ATTEMPT);

        Self {
            total_events: events.len(),
            events_by_type,
            blocked_ips,
            rate_limit_violations,
            suspicious_inputs,
            sql_injection_attempts,
        }
    }
}

/// Result of one threat analysis pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatReport {
    pub recent_events: usize,
    pub high_activity: bool,
    pub newly_blocked: Vec<String>,
}
