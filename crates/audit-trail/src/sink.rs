//! Remote persistence for audit events

use async_trait::async_trait;
use portfolio_monitor_core::AppResult;
use portfolio_monitor_database::RecordStore;
use std::sync::Arc;
use tracing::warn;

use crate::event::AuditEvent;
use crate::report::AuditFilters;

/// Destination for persisted audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, event: &AuditEvent) -> AppResult<()>;

    async fn query(&self, filters: &AuditFilters) -> AppResult<Vec<AuditEvent>>;
}

/// Persists to the record store's `/audit-logs` collection
pub struct StoreSink {
    store: Arc<dyn RecordStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreSink {
    async fn persist(&self, event: &AuditEvent) -> AppResult<()> {
        let body = serde_json::to_value(event)?;
        self.store.post_audit_log(&body).await?;
        Ok(())
    }

    async fn query(&self, filters: &AuditFilters) -> AppResult<Vec<AuditEvent>> {
        let rows = self.store.audit_logs(&filters.to_query()).await?;
        let events = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<AuditEvent>(row) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!("Skipping malformed audit log row: {}", err);
                    None
                }
            })
            .collect();
        Ok(events)
    }
}
