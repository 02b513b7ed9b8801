//! Error classification and reporting
//!
//! [`ErrorHandler`] turns raised [`AppError`]s into [`ErrorRecord`]s, keeps the
//! last 100 of them, mirrors each into the audit log as `SYSTEM_ERROR` and
//! hands critical ones to an [`ErrorReporter`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::increment_counter;
use parking_lot::Mutex;
use portfolio_monitor_core::stats::{most_common, tally};
use portfolio_monitor_core::{AppError, AppResult, ErrorKind, Severity, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::event::{into_details, IdentityProvider, ANONYMOUS_USER, UNKNOWN_SESSION};
use crate::log::AuditLog;

pub const DEFAULT_ERROR_QUEUE_SIZE: usize = 100;

/// Normalized error entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub severity: Severity,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub user_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl ErrorRecord {
    pub fn from_error(
        error: &AppError,
        context: Map<String, Value>,
        user_id: String,
        session_id: String,
    ) -> Self {
        let mut record = Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message: error.message().to_string(),
            name: error.name().to_string(),
            kind: error.kind(),
            severity: error.severity(),
            context,
            user_id,
            session_id,
            field: None,
            value: None,
            status: None,
            url: None,
            resource: None,
            action: None,
            operation: None,
        };

        match error {
            AppError::Validation { field, value, .. } => {
                record.field = field.clone();
                record.value = value.clone();
            }
            AppError::Network { status, url, .. } => {
                record.status = *status;
                record.url = url.clone();
            }
            AppError::Authentication { action, .. } => {
                record.action = action.clone();
            }
            AppError::Authorization {
                resource, action, ..
            } => {
                record.resource = resource.clone();
                record.action = action.clone();
            }
            AppError::BusinessLogic { operation, .. } => {
                record.operation = operation.clone();
            }
            AppError::System { .. } | AppError::Unknown { .. } => {}
        }
        record
    }
}

/// External destination for critical errors
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, record: &ErrorRecord) -> AppResult<()>;
}

/// Simulated reporting service that only logs
#[derive(Debug, Clone)]
pub struct LogReporter {
    latency: Duration,
}

impl Default for LogReporter {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(100),
        }
    }
}

#[async_trait]
impl ErrorReporter for LogReporter {
    async fn report(&self, record: &ErrorRecord) -> AppResult<()> {
        info!(error_id = %record.id, kind = record.kind.as_str(), "Reporting error: {}", record.message);
        tokio::time::sleep(self.latency).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total_errors: usize,
    pub errors_by_type: BTreeMap<String, usize>,
    pub errors_by_severity: BTreeMap<String, usize>,
    /// Up to five most frequent messages with their counts
    pub most_common_errors: Vec<(String, usize)>,
}

pub struct ErrorHandler {
    queue: Mutex<VecDeque<ErrorRecord>>,
    max_queue_size: usize,
    audit: Arc<AuditLog>,
    identity: Arc<dyn IdentityProvider>,
    reporter: Arc<dyn ErrorReporter>,
    reporting: Arc<AtomicBool>,
}

impl ErrorHandler {
    pub fn new(
        audit: Arc<AuditLog>,
        identity: Arc<dyn IdentityProvider>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(DEFAULT_ERROR_QUEUE_SIZE)),
            max_queue_size: DEFAULT_ERROR_QUEUE_SIZE,
            audit,
            identity,
            reporter,
            reporting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Classify, queue, audit and (for critical errors) report `error`
    pub fn handle_error(&self, error: &AppError, context: Value) -> ErrorRecord {
        let record = ErrorRecord::from_error(
            error,
            into_details(context),
            self.identity
                .user_id()
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            self.identity
                .session_id()
                .unwrap_or_else(|| UNKNOWN_SESSION.to_string()),
        );

        {
            let mut queue = self.queue.lock();
            queue.push_back(record.clone());
            while queue.len() > self.max_queue_size {
                queue.pop_front();
            }
        }

        self.audit.log_system_event(
            "ERROR",
            json!({
                "errorId": record.id,
                "errorType": record.kind,
                "severity": record.severity,
                "message": record.message,
            }),
        );
        increment_counter!("errors_handled_total", "kind" => record.kind.as_str());

        if record.severity == Severity::Critical {
            self.report(record.clone());
        }

        warn!(
            error_id = %record.id,
            kind = record.kind.as_str(),
            severity = %record.severity,
            "{}",
            record.message
        );
        record
    }

    /// Handles a failure that was never classified
    pub fn handle_unexpected(&self, error: &(dyn std::error::Error + 'static), context: Value) -> ErrorRecord {
        self.handle_error(&AppError::unknown(error.to_string()), context)
    }

    fn report(&self, record: ErrorRecord) {
        if self
            .reporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available to report error {}", record.id);
            self.reporting.store(false, Ordering::Release);
            return;
        };

        let reporter = self.reporter.clone();
        let reporting = self.reporting.clone();
        handle.spawn(async move {
            if let Err(err) = reporter.report(&record).await {
                error!("Failed to report error: {}", err);
            }
            reporting.store(false, Ordering::Release);
        });
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting.load(Ordering::Acquire)
    }

    pub fn error_stats(&self, range: TimeRange) -> ErrorStats {
        let now = Utc::now();
        let recent: Vec<ErrorRecord> = self
            .queue
            .lock()
            .iter()
            .filter(|record| range.contains(now, record.timestamp))
            .cloned()
            .collect();

        ErrorStats {
            total_errors: recent.len(),
            errors_by_type: tally(&recent, |r| r.kind.as_str()),
            errors_by_severity: tally(&recent, |r| r.severity.as_str()),
            most_common_errors: most_common(recent.iter().map(|r| r.message.as_str()), 5),
        }
    }

    pub fn error_queue(&self) -> Vec<ErrorRecord> {
        self.queue.lock().iter().cloned().collect()
    }

    pub fn clear_error_queue(&self) {
        self.queue.lock().clear();
    }
}
