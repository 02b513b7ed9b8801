//! # Performance Monitor
//!
//! Times operations, keeps the last 1000 measurements and flags anything
//! slower than one second in the audit log.

use audit_trail::event::{IdentityProvider, ANONYMOUS_USER};
use audit_trail::AuditLog;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::histogram;
use parking_lot::Mutex;
use portfolio_monitor_core::stats::tally;
use portfolio_monitor_core::TimeRange;
use portfolio_monitor_database::{CacheStats, TtlCache};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_METRICS: usize = 1000;
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(1000);
const SLOWEST_OPERATIONS: usize = 10;
/// Age after which `optimize_memory` discards metrics
const METRIC_RETENTION_DAYS: i64 = 7;

/// Running timer returned by [`PerformanceMonitor::start_timer`]
#[derive(Debug, Clone)]
pub struct Timer {
    pub operation: String,
    started: Instant,
}

impl Timer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    /// Milliseconds
    pub duration: f64,
    pub user_id: String,
}

/// Lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCounters {
    pub api_calls: u64,
    pub legacy_integrations: u64,
    pub total_response_time: f64,
    pub average_response_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub total_operations: usize,
    pub average_response_time: f64,
    pub slowest_operations: Vec<PerformanceMetric>,
    pub operations_by_type: BTreeMap<String, usize>,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStats {
    pub queue_length: usize,
    pub total_integrations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub cache_hit_rate: f64,
    pub performance: ServiceCounters,
    pub legacy: LegacyStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    pub metrics_retained: usize,
    pub metrics_dropped: usize,
    pub cache_entries: usize,
    pub cache_purged: usize,
}

pub struct PerformanceMonitor {
    metrics: Mutex<VecDeque<PerformanceMetric>>,
    counters: Mutex<ServiceCounters>,
    audit: Arc<AuditLog>,
    identity: Arc<dyn IdentityProvider>,
}

impl PerformanceMonitor {
    pub fn new(audit: Arc<AuditLog>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            metrics: Mutex::new(VecDeque::with_capacity(MAX_METRICS)),
            counters: Mutex::new(ServiceCounters::default()),
            audit,
            identity,
        }
    }

    pub fn start_timer(&self, operation: impl Into<String>) -> Timer {
        Timer {
            operation: operation.into(),
            started: Instant::now(),
        }
    }

    /// Stops `timer`, records the measurement and returns its duration
    pub fn end_timer(&self, timer: Timer) -> Duration {
        let elapsed = timer.elapsed();
        let millis = elapsed.as_secs_f64() * 1000.0;

        {
            let mut counters = self.counters.lock();
            counters.api_calls += 1;
            counters.total_response_time += millis;
            counters.average_response_time = counters.total_response_time / counters.api_calls as f64;
        }

        histogram!("operation_duration_seconds", elapsed.as_secs_f64(), "operation" => timer.operation.clone());
        self.record(timer.operation, elapsed);
        elapsed
    }

    fn record(&self, operation: String, duration: Duration) {
        let metric = PerformanceMetric {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            duration: duration.as_secs_f64() * 1000.0,
            user_id: self
                .identity
                .user_id()
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            operation,
        };

        if duration > SLOW_OPERATION_THRESHOLD {
            self.audit.log_system_event(
                "SLOW_OPERATION",
                json!({
                    "operation": metric.operation,
                    "duration": metric.duration,
                    "threshold": SLOW_OPERATION_THRESHOLD.as_millis() as u64,
                }),
            );
        }
        debug!(operation = %metric.operation, duration_ms = metric.duration, "Performance metric");

        let mut metrics = self.metrics.lock();
        metrics.push_back(metric);
        while metrics.len() > MAX_METRICS {
            metrics.pop_front();
        }
    }

    pub fn record_legacy_integration(&self) {
        self.counters.lock().legacy_integrations += 1;
    }

    pub fn counters(&self) -> ServiceCounters {
        self.counters.lock().clone()
    }

    pub fn metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.lock().iter().cloned().collect()
    }

    pub fn performance_stats(&self, range: TimeRange, cache: &CacheStats) -> PerformanceStats {
        let now = Utc::now();
        let mut recent: Vec<PerformanceMetric> = self
            .metrics
            .lock()
            .iter()
            .filter(|m| range.contains(now, m.timestamp))
            .cloned()
            .collect();

        if recent.is_empty() {
            return PerformanceStats::default();
        }

        let operations_by_type = tally(&recent, |m| m.operation.clone());
        let average_response_time =
            recent.iter().map(|m| m.duration).sum::<f64>() / recent.len() as f64;
        let total_operations = recent.len();

        recent.sort_by(|a, b| b.duration.total_cmp(&a.duration));
        recent.truncate(SLOWEST_OPERATIONS);

        PerformanceStats {
            total_operations,
            average_response_time,
            slowest_operations: recent,
            operations_by_type,
            cache_hit_rate: cache.hit_rate(),
        }
    }

    pub fn service_stats(&self, cache: CacheStats, queue_length: usize) -> ServiceStats {
        let performance = self.counters();
        ServiceStats {
            cache_hit_rate: cache.hit_rate(),
            cache,
            legacy: LegacyStats {
                queue_length,
                total_integrations: performance.legacy_integrations,
            },
            performance,
        }
    }

    /// Drops week-old metrics and expired cache entries
    pub fn optimize_memory<V: Clone>(&self, cache: &TtlCache<V>) -> MemoryReport {
        let cutoff = Utc::now() - ChronoDuration::days(METRIC_RETENTION_DAYS);
        let (retained, dropped) = {
            let mut metrics = self.metrics.lock();
            let before = metrics.len();
            metrics.retain(|m| m.timestamp > cutoff);
            (metrics.len(), before - metrics.len())
        };
        let purged = cache.purge_expired();

        let report = MemoryReport {
            metrics_retained: retained,
            metrics_dropped: dropped,
            cache_entries: cache.len(),
            cache_purged: purged,
        };
        self.audit.log_system_event(
            "MEMORY_OPTIMIZATION",
            json!({
                "metricsRetained": report.metrics_retained,
                "cacheEntries": report.cache_entries,
            }),
        );
        info!(?report, "Memory optimization complete");
        report
    }
}
