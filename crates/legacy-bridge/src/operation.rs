//! Legacy operation, priority and job status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LegacyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyOperation {
    PortfolioSync,
    TradeExecution,
    RiskAssessment,
    ComplianceCheck,
    DataMigration,
}

impl LegacyOperation {
    pub const ALL: [LegacyOperation; 5] = [
        LegacyOperation::PortfolioSync,
        LegacyOperation::TradeExecution,
        LegacyOperation::RiskAssessment,
        LegacyOperation::ComplianceCheck,
        LegacyOperation::DataMigration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LegacyOperation::PortfolioSync => "portfolio_sync",
            LegacyOperation::TradeExecution => "trade_execution",
            LegacyOperation::RiskAssessment => "risk_assessment",
            LegacyOperation::ComplianceCheck => "compliance_check",
            LegacyOperation::DataMigration => "data_migration",
        }
    }

    /// Name used for performance timers
    pub fn timer_name(&self) -> String {
        format!("legacy_{}", self.as_str())
    }
}

impl fmt::Display for LegacyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LegacyOperation {
    type Err = LegacyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LegacyOperation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LegacyError::UnknownOperation(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort key; lower runs first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = LegacyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(LegacyError::InvalidPayload {
                operation: "enqueue".to_string(),
                message: format!("unknown priority '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One legacy job and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: Uuid,
    pub operation: LegacyOperation,
    #[serde(rename = "data")]
    pub payload: Value,
    pub priority: Priority,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    pub fn new(operation: LegacyOperation, payload: Value, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            payload,
            priority,
            status: JobStatus::Queued,
            timestamp: Utc::now(),
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(
            "risk_assessment".parse::<LegacyOperation>().unwrap(),
            LegacyOperation::RiskAssessment
        );
        assert_eq!(LegacyOperation::TradeExecution.timer_name(), "legacy_trade_execution");
        assert_eq!(
            "teleport".parse::<LegacyOperation>().unwrap_err(),
            LegacyError::UnknownOperation("teleport".into())
        );
    }

    #[test]
    fn test_priority_rank() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Normal];
        priorities.sort_by_key(Priority::rank);
        assert_eq!(priorities, vec![Priority::High, Priority::Normal, Priority::Low]);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_item_wire_format() {
        let item = QueueItem::new(
            LegacyOperation::ComplianceCheck,
            serde_json::json!({"accountId": 1}),
            Priority::High,
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["operation"], "compliance_check");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["data"]["accountId"], 1);
        assert!(json.get("result").is_none());
    }
}
