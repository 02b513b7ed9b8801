//! # Audit Log
//!
//! Bounded in-memory buffer of structured audit events. When a sink is
//! attached, every event is also handed to a background task that persists
//! it remotely and falls back to a capped local backup list on failure.
//! `log_action` never blocks on persistence; `flush` waits for it.

use chrono::Utc;
use metrics::increment_counter;
use parking_lot::Mutex;
use portfolio_monitor_core::{AppResult, TimeRange};
use portfolio_monitor_database::{LocalStorage, AUDIT_BACKUP_KEY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::event::{
    into_details, severity_for_action, AuditEvent, AuditStatus, IdentityProvider, ANONYMOUS_USER,
    UNKNOWN_SESSION,
};
use crate::report::{render_events, AuditFilters, AuditStats, ExportFormat};
use crate::sink::AuditSink;

/// Audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Events kept in memory
    pub max_buffer_size: usize,
    /// Entries kept in the local backup list
    pub backup_capacity: usize,
    /// Persist events to the record store
    pub persist_remote: bool,
    pub user_agent: String,
    pub ip_address: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            backup_capacity: 100,
            persist_remote: true,
            user_agent: format!("portfolio-monitor/{}", env!("CARGO_PKG_VERSION")),
            ip_address: "127.0.0.1".to_string(),
        }
    }
}

enum PersistCommand {
    Persist(AuditEvent),
    Flush(oneshot::Sender<()>),
}

struct Persistence {
    tx: mpsc::UnboundedSender<PersistCommand>,
    sink: Arc<dyn AuditSink>,
}

/// Audit log service
pub struct AuditLog {
    buffer: Mutex<VecDeque<AuditEvent>>,
    config: AuditConfig,
    identity: Arc<dyn IdentityProvider>,
    persistence: Option<Persistence>,
}

impl AuditLog {
    /// Memory-only audit log
    pub fn new(config: AuditConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(config.max_buffer_size)),
            config,
            identity,
            persistence: None,
        }
    }

    /// Audit log that persists through `sink`, backing up to `backup` on failure.
    /// Spawns the persistence task, so it must be called inside a Tokio runtime.
    pub fn with_sink(
        config: AuditConfig,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn AuditSink>,
        backup: Arc<LocalStorage>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(persistence_loop(
            rx,
            sink.clone(),
            backup,
            config.backup_capacity,
        ));

        let mut log = Self::new(config, identity);
        log.persistence = Some(Persistence { tx, sink });
        log
    }

    /// Record an action and hand it to persistence
    #[instrument(skip(self, details))]
    pub fn log_action(&self, action: &str, details: Value, user_id: Option<String>) -> AuditEvent {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: action.to_string(),
            details: into_details(details),
            user_id: user_id
                .or_else(|| self.identity.user_id())
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            session_id: self
                .identity
                .session_id()
                .unwrap_or_else(|| UNKNOWN_SESSION.to_string()),
            user_agent: self.config.user_agent.clone(),
            ip_address: self.config.ip_address.clone(),
            severity: severity_for_action(action),
            status: AuditStatus::Success,
        };

        {
            let mut buffer = self.buffer.lock();
            buffer.push_back(event.clone());
            while buffer.len() > self.config.max_buffer_size {
                buffer.pop_front();
            }
        }

        if let Some(persistence) = &self.persistence {
            if persistence
                .tx
                .send(PersistCommand::Persist(event.clone()))
                .is_err()
            {
                warn!("Audit persistence task has stopped; event kept in memory only");
            }
        }

        increment_counter!("audit_events_total", "severity" => event.severity.as_str());
        debug!(
            event_id = %event.id,
            severity = %event.severity,
            user_id = %event.user_id,
            "Audit Log"
        );
        event
    }

    pub fn log_auth_event(&self, event: &str, details: Value) -> AuditEvent {
        self.log_action(&format!("AUTH_{}", event), details, None)
    }

    pub fn log_data_access(&self, resource: &str, operation: &str, details: Value) -> AuditEvent {
        let mut merged = into_details(json!({ "resource": resource }));
        merged.extend(into_details(details));
        self.log_action(&format!("DATA_{}", operation), Value::Object(merged), None)
    }

    /// `TRANSACTION_<type>` with amount and currency (USD unless given)
    pub fn log_transaction(&self, transaction_type: &str, amount: Decimal, details: Value) -> AuditEvent {
        let mut merged = into_details(json!({ "amount": amount, "currency": "USD" }));
        merged.extend(into_details(details));
        self.log_action(
            &format!("TRANSACTION_{}", transaction_type),
            Value::Object(merged),
            None,
        )
    }

    /// `SECURITY_<event>`; details are always tagged high severity
    pub fn log_security_event(&self, event: &str, details: Value) -> AuditEvent {
        let mut merged = into_details(details);
        merged.insert("severity".to_string(), json!("high"));
        self.log_action(&format!("SECURITY_{}", event), Value::Object(merged), None)
    }

    pub fn log_system_event(&self, event: &str, details: Value) -> AuditEvent {
        self.log_action(&format!("SYSTEM_{}", event), details, None)
    }

    /// Snapshot of the in-memory buffer, oldest first
    pub fn recent(&self) -> Vec<AuditEvent> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Query persisted events, falling back to the memory buffer
    #[instrument(skip(self))]
    pub async fn get_audit_logs(&self, filters: &AuditFilters) -> Vec<AuditEvent> {
        if let Some(persistence) = &self.persistence {
            match persistence.sink.query(filters).await {
                Ok(events) => return filters.apply(events),
                Err(err) => warn!("Failed to fetch audit logs: {}", err),
            }
        }
        filters.apply(self.recent())
    }

    pub async fn export(&self, format: ExportFormat, filters: &AuditFilters) -> AppResult<String> {
        let events = self.get_audit_logs(filters).await;
        info!("Exporting {} audit events as {}", events.len(), format);
        render_events(&events, format)
    }

    pub async fn stats(&self, range: TimeRange) -> AuditStats {
        let filters = AuditFilters {
            start_date: Some(range.cutoff(Utc::now())),
            ..Default::default()
        };
        AuditStats::from_events(&self.get_audit_logs(&filters).await)
    }

    /// Waits until every event logged so far has been persisted or backed up
    pub async fn flush(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if persistence.tx.send(PersistCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}

async fn persistence_loop(
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    sink: Arc<dyn AuditSink>,
    backup: Arc<LocalStorage>,
    backup_capacity: usize,
) {
    while let Some(command) = rx.recv().await {
        match command {
            PersistCommand::Persist(event) => {
                if let Err(err) = sink.persist(&event).await {
                    warn!("Failed to persist audit log: {}", err);
                    increment_counter!("audit_backup_writes_total");
                    if let Err(err) = backup.append_capped(AUDIT_BACKUP_KEY, &event, backup_capacity) {
                        warn!("Failed to store backup log: {}", err);
                    }
                }
            }
            PersistCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Audit persistence task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoIdentity;
    use async_trait::async_trait;
    use portfolio_monitor_core::{AppError, Severity};
    use rust_decimal_macros::dec;

    struct FixedIdentity;

    impl IdentityProvider for FixedIdentity {
        fn user_id(&self) -> Option<String> {
            Some("1".to_string())
        }

        fn session_id(&self) -> Option<String> {
            Some("session_abc".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn persist(&self, event: &AuditEvent) -> AppResult<()> {
            self.events.lock().push(event.clone());
            Ok(())
        }

        async fn query(&self, _filters: &AuditFilters) -> AppResult<Vec<AuditEvent>> {
            Ok(self.events.lock().clone())
        }
    }

    struct OfflineSink;

    #[async_trait]
    impl AuditSink for OfflineSink {
        async fn persist(&self, _event: &AuditEvent) -> AppResult<()> {
            Err(AppError::network("connection refused", None, Some("http://localhost:4000/audit-logs")))
        }

        async fn query(&self, _filters: &AuditFilters) -> AppResult<Vec<AuditEvent>> {
            Err(AppError::network("connection refused", None, None::<String>))
        }
    }

    fn memory_log() -> AuditLog {
        AuditLog::new(AuditConfig::default(), Arc::new(NoIdentity))
    }

    #[test]
    fn test_event_fields() {
        let log = AuditLog::new(AuditConfig::default(), Arc::new(FixedIdentity));
        let event = log.log_auth_event("LOGIN", json!({"email": "admin@abc.com"}));

        assert_eq!(event.action, "AUTH_LOGIN");
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.user_id, "1");
        assert_eq!(event.session_id, "session_abc");
        assert_eq!(event.ip_address, "127.0.0.1");
        assert_eq!(event.status, AuditStatus::Success);
    }

    #[test]
    fn test_anonymous_defaults() {
        let event = memory_log().log_action("PAGE_VIEW", Value::Null, None);
        assert_eq!(event.user_id, "anonymous");
        assert_eq!(event.session_id, "unknown");
        assert_eq!(event.severity, Severity::Low);

        let explicit = memory_log().log_action("PAGE_VIEW", Value::Null, Some("7".into()));
        assert_eq!(explicit.user_id, "7");
    }

    #[test]
    fn test_buffer_is_capped() {
        let log = memory_log();
        for i in 0..1001 {
            log.log_action("DATA_READ", json!({ "seq": i }), None);
        }
        let events = log.recent();
        assert_eq!(events.len(), 1000);
        assert_eq!(events[0].details["seq"], 1);
        assert_eq!(events[999].details["seq"], 1000);
    }

    #[test]
    fn test_wrappers() {
        let log = memory_log();

        let tx = log.log_transaction("BUY", dec!(1755), json!({"symbol": "AAPL"}));
        assert_eq!(tx.action, "TRANSACTION_BUY");
        assert_eq!(tx.details["currency"], "USD");
        assert_eq!(tx.details["symbol"], "AAPL");
        assert_eq!(tx.severity, Severity::High);

        let eur = log.log_transaction("SELL", dec!(10), json!({"currency": "EUR"}));
        assert_eq!(eur.details["currency"], "EUR");

        let data = log.log_data_access("portfolio", "READ", json!({"count": 3}));
        assert_eq!(data.action, "DATA_READ");
        assert_eq!(data.details["resource"], "portfolio");
        assert_eq!(data.severity, Severity::Medium);

        let sec = log.log_security_event("RATE_LIMIT_EXCEEDED", json!({"severity": "low"}));
        assert_eq!(sec.details["severity"], "high");

        let sys = log.log_system_event("ERROR", json!({}));
        assert_eq!(sys.action, "SYSTEM_ERROR");
        assert_eq!(sys.severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_persists_through_sink() {
        let sink = Arc::new(RecordingSink::default());
        let backup = Arc::new(LocalStorage::in_memory());
        let log = AuditLog::with_sink(
            AuditConfig::default(),
            Arc::new(NoIdentity),
            sink.clone(),
            backup.clone(),
        );

        log.log_auth_event("LOGIN", json!({}));
        log.log_data_access("orders", "READ", json!({}));
        log.flush().await;

        assert_eq!(sink.events.lock().len(), 2);
        assert!(!backup.contains(AUDIT_BACKUP_KEY));

        let logins = log
            .get_audit_logs(&AuditFilters {
                action: Some("AUTH_LOGIN".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(logins.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persistence_goes_to_backup() {
        let backup = Arc::new(LocalStorage::in_memory());
        let config = AuditConfig {
            backup_capacity: 3,
            ..Default::default()
        };
        let log = AuditLog::with_sink(config, Arc::new(NoIdentity), Arc::new(OfflineSink), backup.clone());

        for _ in 0..5 {
            log.log_system_event("WARNING", json!({}));
        }
        log.flush().await;

        let backed_up: Vec<AuditEvent> = backup.get(AUDIT_BACKUP_KEY).unwrap();
        assert_eq!(backed_up.len(), 3);

        // query falls back to the memory buffer
        let events = log.get_audit_logs(&AuditFilters::default()).await;
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_export_and_stats_from_memory() {
        let log = memory_log();
        log.log_auth_event("LOGIN", json!({}));
        log.log_data_access("portfolio", "READ", json!({}));

        let csv = log.export(ExportFormat::Csv, &AuditFilters::default()).await.unwrap();
        assert_eq!(csv.lines().count(), 3);

        let stats = log.stats(TimeRange::LastHour).await;
        assert_eq!(stats.total_actions, 2);
        assert_eq!(stats.actions_by_severity["high"], 1);
    }
}
