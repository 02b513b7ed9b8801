//! Instrumented calls into the legacy system

use audit_trail::{AuditLog, ErrorHandler};
use metrics::increment_counter;
use portfolio_monitor_core::AppError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::LegacyResult;
use crate::operation::LegacyOperation;
use crate::performance::PerformanceMonitor;
use crate::simulator::LegacySystem;

/// Times, audits and error-routes every legacy call
pub struct LegacyBridge {
    system: Arc<dyn LegacySystem>,
    performance: Arc<PerformanceMonitor>,
    audit: Arc<AuditLog>,
    errors: Arc<ErrorHandler>,
}

impl LegacyBridge {
    pub fn new(
        system: Arc<dyn LegacySystem>,
        performance: Arc<PerformanceMonitor>,
        audit: Arc<AuditLog>,
        errors: Arc<ErrorHandler>,
    ) -> Self {
        Self {
            system,
            performance,
            audit,
            errors,
        }
    }

    #[instrument(skip(self, payload))]
    pub async fn integrate(&self, operation: LegacyOperation, payload: &Value) -> LegacyResult<Value> {
        let timer = self.performance.start_timer(operation.timer_name());
        let outcome = self.system.process(operation, payload).await;
        let duration_ms = self.performance.end_timer(timer).as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.performance.record_legacy_integration();
                increment_counter!("legacy_integrations_total", "operation" => operation.as_str(), "outcome" => "success");
                self.audit.log_system_event(
                    "LEGACY_INTEGRATION",
                    json!({
                        "operation": operation,
                        "success": true,
                        "duration": duration_ms,
                    }),
                );
                info!(%operation, duration_ms, "Legacy integration completed");
                Ok(result)
            }
            Err(err) => {
                increment_counter!("legacy_integrations_total", "operation" => operation.as_str(), "outcome" => "failure");
                self.errors.handle_error(
                    &AppError::from(err.clone()),
                    json!({
                        "context": "legacy_integration",
                        "operation": operation,
                        "data": payload,
                    }),
                );
                self.audit.log_system_event(
                    "LEGACY_INTEGRATION_ERROR",
                    json!({
                        "operation": operation,
                        "error": err.to_string(),
                        "duration": duration_ms,
                    }),
                );
                warn!(%operation, duration_ms, "Legacy integration failed: {}", err);
                Err(err)
            }
        }
    }

    pub fn performance(&self) -> &Arc<PerformanceMonitor> {
        &self.performance
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::LegacyError;
    use async_trait::async_trait;
    use audit_trail::{AuditConfig, LogReporter, NoIdentity};
    use std::time::Duration;

    /// Fails every data migration, answers everything else after 10ms
    pub(crate) struct FlakySystem;

    #[async_trait]
    impl LegacySystem for FlakySystem {
        async fn process(&self, operation: LegacyOperation, _payload: &Value) -> LegacyResult<Value> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            match operation {
                LegacyOperation::DataMigration => {
                    Err(LegacyError::system(operation.as_str(), "tape drive offline"))
                }
                _ => Ok(json!({ "success": true, "operation": operation })),
            }
        }
    }

    pub(crate) fn bridge_with(system: Arc<dyn LegacySystem>) -> (LegacyBridge, Arc<AuditLog>, Arc<ErrorHandler>) {
        let audit = Arc::new(AuditLog::new(AuditConfig::default(), Arc::new(NoIdentity)));
        let errors = Arc::new(ErrorHandler::new(
            audit.clone(),
            Arc::new(NoIdentity),
            Arc::new(LogReporter::default()),
        ));
        let performance = Arc::new(PerformanceMonitor::new(audit.clone(), Arc::new(NoIdentity)));
        (
            LegacyBridge::new(system, performance, audit.clone(), errors.clone()),
            audit,
            errors,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_integration_is_audited() {
        let (bridge, audit, _) = bridge_with(Arc::new(FlakySystem));
        let result = bridge
            .integrate(LegacyOperation::RiskAssessment, &json!({}))
            .await
            .unwrap();
        assert_eq!(result["operation"], "risk_assessment");

        let events = audit.recent();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "SYSTEM_LEGACY_INTEGRATION");
        assert_eq!(events[0].details["duration"], 10);
        assert_eq!(bridge.performance().counters().legacy_integrations, 1);
        assert_eq!(bridge.performance().metrics()[0].operation, "legacy_risk_assessment");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_integration_goes_through_error_handler() {
        let (bridge, audit, errors) = bridge_with(Arc::new(FlakySystem));
        let err = bridge
            .integrate(LegacyOperation::DataMigration, &json!({"recordCount": 10}))
            .await
            .unwrap_err();
        assert!(matches!(err, LegacyError::System { .. }));

        let queue = errors.error_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].context["context"], "legacy_integration");
        assert_eq!(queue[0].context["data"]["recordCount"], 10);

        let actions: Vec<String> = audit.recent().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["SYSTEM_ERROR", "SYSTEM_LEGACY_INTEGRATION_ERROR"]);
        assert_eq!(bridge.performance().counters().legacy_integrations, 0);
        assert_eq!(bridge.performance().counters().api_calls, 1);
    }
}
