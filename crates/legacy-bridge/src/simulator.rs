//! # Legacy System Simulator
//!
//! Stand-in for the slow back-office system. Every operation waits a random
//! delay from its own range and returns synthetic data shaped like the real
//! system's responses.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::ops::Range;
use std::time::Duration;
use tracing::debug;

use crate::error::LegacyResult;
use crate::operation::LegacyOperation;

/// Back-office system the bridge talks to
#[async_trait]
pub trait LegacySystem: Send + Sync {
    async fn process(&self, operation: LegacyOperation, payload: &Value) -> LegacyResult<Value>;
}

/// Simulated latency window for an operation, in milliseconds
pub fn latency_range(operation: LegacyOperation) -> Range<u64> {
    match operation {
        LegacyOperation::PortfolioSync => 2000..5000,
        LegacyOperation::TradeExecution => 1000..3000,
        LegacyOperation::RiskAssessment => 1500..4000,
        LegacyOperation::ComplianceCheck => 800..2000,
        LegacyOperation::DataMigration => 5000..15000,
    }
}

/// Share of compliance checks that come back clean
const COMPLIANT_RATE: f64 = 0.9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Default)]
pub struct SimulatedLegacySystem;

impl SimulatedLegacySystem {
    pub fn new() -> Self {
        Self
    }

    fn sample_latency(operation: LegacyOperation) -> Duration {
        let range = latency_range(operation);
        Duration::from_millis(rand::thread_rng().gen_range(range))
    }

    fn respond(operation: LegacyOperation, payload: &Value) -> Value {
        let now = Utc::now();
        let millis = now.timestamp_millis();
        let mut rng = rand::thread_rng();

        match operation {
            LegacyOperation::PortfolioSync => {
                let synced = payload
                    .get("portfolioIds")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                json!({
                    "success": true,
                    "syncedPortfolios": synced,
                    "lastSyncTime": now,
                    "legacySystemId": format!("LEG_{}", millis),
                })
            }
            LegacyOperation::TradeExecution => {
                let suffix: String = (0..9)
                    .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
                    .collect();
                let execution_id = format!("EXE_{}_{}", millis, suffix);
                let amount = payload
                    .get("amount")
                    .and_then(|v| serde_json::from_value::<Decimal>(v.clone()).ok())
                    .unwrap_or_default();
                json!({
                    "success": true,
                    "executionId": execution_id,
                    "status": "executed",
                    "executionTime": now,
                    "legacyConfirmation": format!("LEG_CONF_{}", execution_id),
                    "fees": amount * Decimal::new(1, 3),
                })
            }
            LegacyOperation::RiskAssessment => {
                let score: f64 = rng.gen_range(0.0..100.0);
                let level = if score < 30.0 {
                    "low"
                } else if score < 70.0 {
                    "medium"
                } else {
                    "high"
                };
                json!({
                    "success": true,
                    "riskScore": (score * 100.0).round() / 100.0,
                    "riskLevel": level,
                    "assessmentDate": now,
                    "legacyRiskId": format!("RISK_{}", millis),
                })
            }
            LegacyOperation::ComplianceCheck => {
                let compliant = rng.gen_bool(COMPLIANT_RATE);
                let (status, flags) = if compliant {
                    ("compliant", Vec::new())
                } else {
                    ("review_required", vec!["manual_review"])
                };
                json!({
                    "success": true,
                    "complianceStatus": status,
                    "checkDate": now,
                    "legacyComplianceId": format!("COMP_{}", millis),
                    "flags": flags,
                })
            }
            LegacyOperation::DataMigration => {
                let migration_id = format!("MIG_{}", millis);
                json!({
                    "success": true,
                    "recordsProcessed": payload.get("recordCount").and_then(Value::as_u64).unwrap_or(0),
                    "migrationDate": now,
                    "legacyMigrationId": format!("LEG_MIG_{}", migration_id),
                    "migrationId": migration_id,
                })
            }
        }
    }
}

#[async_trait]
impl LegacySystem for SimulatedLegacySystem {
    async fn process(&self, operation: LegacyOperation, payload: &Value) -> LegacyResult<Value> {
        let latency = Self::sample_latency(operation);
        debug!(%operation, latency_ms = latency.as_millis() as u64, "Simulating legacy call");
        tokio::time::sleep(latency).await;
        Ok(Self::respond(operation, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_latency_within_range() {
        let system = SimulatedLegacySystem::new();
        for operation in LegacyOperation::ALL {
            let started = Instant::now();
            system.process(operation, &json!({})).await.unwrap();
            let elapsed = started.elapsed().as_millis() as u64;
            let range = latency_range(operation);
            assert!(elapsed >= range.start && elapsed <= range.end, "{} took {}ms", operation, elapsed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trade_execution_fee() {
        let result = SimulatedLegacySystem
            .process(LegacyOperation::TradeExecution, &json!({"amount": 25000}))
            .await
            .unwrap();
        assert_eq!(result["status"], "executed");
        assert_eq!(result["fees"], 25.0);
        let execution_id = result["executionId"].as_str().unwrap();
        assert!(execution_id.starts_with("EXE_"));
        assert_eq!(
            result["legacyConfirmation"],
            format!("LEG_CONF_{}", execution_id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_driven_counts() {
        let sync = SimulatedLegacySystem
            .process(LegacyOperation::PortfolioSync, &json!({"portfolioIds": [1, 2, 3]}))
            .await
            .unwrap();
        assert_eq!(sync["syncedPortfolios"], 3);

        let migration = SimulatedLegacySystem
            .process(LegacyOperation::DataMigration, &json!({"recordCount": 500}))
            .await
            .unwrap();
        assert_eq!(migration["recordsProcessed"], 500);

        let empty = SimulatedLegacySystem
            .process(LegacyOperation::DataMigration, &Value::Null)
            .await
            .unwrap();
        assert_eq!(empty["recordsProcessed"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_risk_and_compliance_shapes() {
        let risk = SimulatedLegacySystem
            .process(LegacyOperation::RiskAssessment, &json!({}))
            .await
            .unwrap();
        let score = risk["riskScore"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&score));
        assert!(["low", "medium", "high"].contains(&risk["riskLevel"].as_str().unwrap()));

        let compliance = SimulatedLegacySystem
            .process(LegacyOperation::ComplianceCheck, &json!({}))
            .await
            .unwrap();
        match compliance["complianceStatus"].as_str().unwrap() {
            "compliant" => assert_eq!(compliance["flags"], json!([])),
            "review_required" => assert_eq!(compliance["flags"], json!(["manual_review"])),
            other => panic!("unexpected status {}", other),
        }
    }
}
