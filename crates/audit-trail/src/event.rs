//! Audit event model and action severity classification

use chrono::{DateTime, Utc};
use portfolio_monitor_core::Severity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identity reported when no user is signed in
pub const ANONYMOUS_USER: &str = "anonymous";
/// Session reported when no session exists
pub const UNKNOWN_SESSION: &str = "unknown";

/// Actions logged as high severity (substring match)
pub const HIGH_SEVERITY_ACTIONS: [&str; 7] = [
    "AUTH_LOGIN",
    "AUTH_LOGOUT",
    "AUTH_FAILED",
    "TRANSACTION_BUY",
    "TRANSACTION_SELL",
    "SECURITY_VIOLATION",
    "SECURITY_BREACH",
];

/// Actions logged as medium severity (substring match)
pub const MEDIUM_SEVERITY_ACTIONS: [&str; 5] = [
    "DATA_READ",
    "DATA_UPDATE",
    "DATA_DELETE",
    "SYSTEM_ERROR",
    "SYSTEM_WARNING",
];

/// Severity for an action tag; anything not allowlisted is low
pub fn severity_for_action(action: &str) -> Severity {
    if HIGH_SEVERITY_ACTIONS.iter().any(|high| action.contains(high)) {
        Severity::High
    } else if MEDIUM_SEVERITY_ACTIONS
        .iter()
        .any(|medium| action.contains(medium))
    {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    #[default]
    Success,
    Failure,
}

/// One structured audit entry; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Action tag, e.g. `AUTH_LOGIN`
    pub action: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub user_id: String,
    pub session_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub severity: Severity,
    #[serde(default)]
    pub status: AuditStatus,
}

/// Supplies the signed-in user and session for audit and error records
pub trait IdentityProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;
    fn session_id(&self) -> Option<String>;
}

/// Identity provider for contexts without a session
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityProvider for NoIdentity {
    fn user_id(&self) -> Option<String> {
        None
    }

    fn session_id(&self) -> Option<String> {
        None
    }
}

/// Turns arbitrary JSON into an event detail map
pub fn into_details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_allowlists() {
        assert_eq!(severity_for_action("AUTH_LOGIN"), Severity::High);
        assert_eq!(severity_for_action("TRANSACTION_SELL"), Severity::High);
        assert_eq!(severity_for_action("DATA_READ"), Severity::Medium);
        assert_eq!(severity_for_action("SYSTEM_ERROR"), Severity::Medium);
        assert_eq!(severity_for_action("SYSTEM_LEGACY_INTEGRATION"), Severity::Low);
        // substring match
        assert_eq!(severity_for_action("SECURITY_SECURITY_BREACH"), Severity::High);
    }

    #[test]
    fn test_into_details() {
        assert_eq!(into_details(json!({"a": 1}))["a"], 1);
        assert!(into_details(Value::Null).is_empty());
        assert_eq!(into_details(json!("text"))["value"], "text");
    }

    #[test]
    fn test_event_wire_format() {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: "AUTH_LOGIN".to_string(),
            details: into_details(json!({"email": "admin@abc.com"})),
            user_id: "1".to_string(),
            session_id: "session_1".to_string(),
            user_agent: "portfolio-monitor".to_string(),
            ip_address: "127.0.0.1".to_string(),
            severity: Severity::High,
            status: AuditStatus::Success,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["userId"], "1");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["status"], "success");

        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
