//! # Legacy Job Queue
//!
//! Priority-ordered queue of legacy operations drained by a single worker.
//! Pending jobs are ordered high, normal, low and by arrival within a tier.
//! The worker takes the head, runs it through the [`LegacyBridge`], records
//! the outcome and pauses for the inter-item delay before taking the next.
//! A failed job is terminal and never retried.
//!
//! A worker woken from idle first waits the collection window, so jobs
//! enqueued together are ordered by priority before the first one starts.
//! [`LegacyQueue::enqueue_batch`] sorts a whole batch under one lock.
//!
//! `enqueue` returns a [`JobHandle`] that resolves to the finished job; the
//! job also stays in the queue history until [`LegacyQueue::clear`].

use metrics::gauge;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::LegacyBridge;
use crate::error::{LegacyError, LegacyResult};
use crate::operation::{JobStatus, LegacyOperation, Priority, QueueItem};

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Pause between two jobs, in milliseconds
    pub inter_item_delay_ms: u64,
    /// Wait before an idle worker takes its first job, in milliseconds
    pub collect_window_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 500,
            collect_window_ms: 50,
        }
    }
}

impl QueueConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn collect_window(&self) -> Duration {
        Duration::from_millis(self.collect_window_ms)
    }
}

/// Awaitable outcome of an enqueued job
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    done: oneshot::Receiver<QueueItem>,
}

impl JobHandle {
    /// Resolves to the job in its terminal state
    pub async fn wait(self) -> LegacyResult<QueueItem> {
        self.done
            .await
            .map_err(|_| LegacyError::WorkerStopped(self.id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemSummary {
    pub id: Uuid,
    pub operation: LegacyOperation,
    pub priority: Priority,
    pub status: JobStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&QueueItem> for QueueItemSummary {
    fn from(item: &QueueItem) -> Self {
        Self {
            id: item.id,
            operation: item.operation,
            priority: item.priority,
            status: item.status,
            timestamp: item.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Jobs waiting to start
    pub queue_length: usize,
    pub is_processing: bool,
    /// History, the running job, then pending jobs in run order
    pub items: Vec<QueueItemSummary>,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<QueueItem>,
    current: Option<QueueItem>,
    history: Vec<QueueItem>,
    waiters: HashMap<Uuid, oneshot::Sender<QueueItem>>,
    is_processing: bool,
}

impl QueueState {
    fn push(&mut self, operation: LegacyOperation, payload: Value, priority: Priority) -> JobHandle {
        let item = QueueItem::new(operation, payload, priority);
        let id = item.id;
        let (done_tx, done_rx) = oneshot::channel();
        debug!(%id, %operation, %priority, "Legacy job queued");

        self.waiters.insert(id, done_tx);
        self.pending.push(item);
        self.pending.sort_by_key(|item| item.priority.rank());
        gauge!("legacy_queue_length", self.pending.len() as f64);

        JobHandle { id, done: done_rx }
    }

    /// Marks the worker busy; true when the caller must spawn it
    fn wake(&mut self) -> bool {
        let idle = !self.is_processing;
        self.is_processing = true;
        idle
    }
}

struct Shared {
    state: Mutex<QueueState>,
    bridge: Arc<LegacyBridge>,
    config: QueueConfig,
}

/// Single-worker legacy job queue
#[derive(Clone)]
pub struct LegacyQueue {
    shared: Arc<Shared>,
}

impl LegacyQueue {
    pub fn new(bridge: Arc<LegacyBridge>, config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                bridge,
                config,
            }),
        }
    }

    /// Queue a job and start the worker if it is idle
    pub fn enqueue(
        &self,
        operation: LegacyOperation,
        payload: Value,
        priority: Priority,
    ) -> LegacyResult<JobHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LegacyError::NoRuntime)?;
        let (handle, start_worker) = {
            let mut state = self.shared.state.lock();
            let handle = state.push(operation, payload, priority);
            (handle, state.wake())
        };
        if start_worker {
            runtime.spawn(run_worker(self.shared.clone()));
        }
        Ok(handle)
    }

    /// Queue several jobs under one lock; handles come back in submission order
    pub fn enqueue_batch(
        &self,
        jobs: Vec<(LegacyOperation, Value, Priority)>,
    ) -> LegacyResult<Vec<JobHandle>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LegacyError::NoRuntime)?;
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let (handles, start_worker) = {
            let mut state = self.shared.state.lock();
            let handles: Vec<JobHandle> = jobs
                .into_iter()
                .map(|(operation, payload, priority)| state.push(operation, payload, priority))
                .collect();
            (handles, state.wake())
        };
        if start_worker {
            runtime.spawn(run_worker(self.shared.clone()));
        }
        Ok(handles)
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        let items = state
            .history
            .iter()
            .chain(state.current.iter())
            .chain(state.pending.iter())
            .map(QueueItemSummary::from)
            .collect();

        QueueStatus {
            queue_length: state.pending.len(),
            is_processing: state.is_processing,
            items,
        }
    }

    /// Current state of one job
    pub fn item(&self, id: Uuid) -> Option<QueueItem> {
        let state = self.shared.state.lock();
        state
            .history
            .iter()
            .chain(state.current.iter())
            .chain(state.pending.iter())
            .find(|item| item.id == id)
            .cloned()
    }

    pub fn history(&self) -> Vec<QueueItem> {
        self.shared.state.lock().history.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.state.lock().is_processing
    }

    /// Drops finished jobs from the history; returns how many
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let cleared = state.history.len();
        state.history.clear();
        cleared
    }
}

async fn run_worker(shared: Arc<Shared>) {
    info!("Legacy queue worker started");
    tokio::time::sleep(shared.config.collect_window()).await;
    loop {
        let next = {
            let mut state = shared.state.lock();
            if state.pending.is_empty() {
                state.is_processing = false;
                None
            } else {
                let mut item = state.pending.remove(0);
                item.status = JobStatus::Processing;
                state.current = Some(item.clone());
                gauge!("legacy_queue_length", state.pending.len() as f64);
                Some(item)
            }
        };

        let Some(mut item) = next else {
            break;
        };

        match shared.bridge.integrate(item.operation, &item.payload).await {
            Ok(result) => {
                item.status = JobStatus::Completed;
                item.result = Some(result);
            }
            Err(err) => {
                item.status = JobStatus::Failed;
                item.error = Some(err.to_string());
            }
        }

        {
            let mut state = shared.state.lock();
            state.current = None;
            state.history.push(item.clone());
            if let Some(waiter) = state.waiters.remove(&item.id) {
                if waiter.send(item).is_err() {
                    debug!("Job handle dropped before completion");
                }
            } else {
                warn!(id = %item.id, "No waiter registered for legacy job");
            }
        }

        tokio::time::sleep(shared.config.inter_item_delay()).await;
    }
    info!("Legacy queue worker idle");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::{bridge_with, FlakySystem};
    use crate::simulator::LegacySystem;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn queue() -> LegacyQueue {
        let (bridge, _, _) = bridge_with(Arc::new(FlakySystem));
        LegacyQueue::new(Arc::new(bridge), QueueConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order() {
        let queue = queue();
        let low = queue
            .enqueue(LegacyOperation::PortfolioSync, json!({}), Priority::Low)
            .unwrap();
        let high = queue
            .enqueue(LegacyOperation::TradeExecution, json!({}), Priority::High)
            .unwrap();
        let normal = queue
            .enqueue(LegacyOperation::RiskAssessment, json!({}), Priority::Normal)
            .unwrap();
        let ids = [high.id, normal.id, low.id];

        let status = queue.status();
        assert_eq!(status.queue_length, 3);
        assert!(status.is_processing);
        assert_eq!(status.items[0].priority, Priority::High);

        low.wait().await.unwrap();
        let order: Vec<Uuid> = queue.history().iter().map(|item| item.id).collect();
        assert_eq!(order, ids);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_resolves_and_failures_do_not_stop_worker() {
        let queue = queue();
        let failing = queue
            .enqueue(LegacyOperation::DataMigration, json!({"recordCount": 5}), Priority::High)
            .unwrap();
        let ok = queue
            .enqueue(LegacyOperation::ComplianceCheck, json!({}), Priority::Normal)
            .unwrap();

        let failed = failing.wait().await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("tape drive offline"));

        let done = ok.wait().await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result.unwrap()["operation"], "compliance_check");

        // still visible in the status until cleared
        assert_eq!(queue.item(done.id).unwrap().status, JobStatus::Completed);
        assert_eq!(queue.status().items.len(), 2);
        assert_eq!(queue.clear(), 2);
        assert!(queue.status().items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_with_inter_item_delay() {
        let queue = queue();
        let started = Instant::now();
        let first = queue
            .enqueue(LegacyOperation::TradeExecution, json!({}), Priority::Normal)
            .unwrap();
        let second = queue
            .enqueue(LegacyOperation::TradeExecution, json!({}), Priority::Normal)
            .unwrap();

        first.wait().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(60));
        second.wait().await.unwrap();
        // 50ms window, 10ms job, 500ms pause, 10ms job
        assert_eq!(started.elapsed(), Duration::from_millis(570));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!queue.is_processing());
        assert_eq!(queue.pending_len(), 0);

        // a new job restarts the worker
        let third = queue
            .enqueue(LegacyOperation::RiskAssessment, json!({}), Priority::Low)
            .unwrap();
        assert!(queue.is_processing());
        assert_eq!(third.wait().await.unwrap().status, JobStatus::Completed);
    }

    /// Records the highest number of jobs in flight at once
    #[derive(Default)]
    struct CountingSystem {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LegacySystem for CountingSystem {
        async fn process(&self, operation: LegacyOperation, _payload: &Value) -> LegacyResult<Value> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({ "operation": operation }))
        }
    }

    fn threaded_queue(system: Arc<dyn LegacySystem>) -> LegacyQueue {
        let (bridge, _, _) = bridge_with(system);
        LegacyQueue::new(
            Arc::new(bridge),
            QueueConfig {
                inter_item_delay_ms: 0,
                collect_window_ms: 100,
            },
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_priority_order_on_multi_thread_runtime() {
        for _ in 0..20 {
            let queue = threaded_queue(Arc::new(FlakySystem));
            let low = queue
                .enqueue(LegacyOperation::PortfolioSync, json!({}), Priority::Low)
                .unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
            let high = queue
                .enqueue(LegacyOperation::TradeExecution, json!({}), Priority::High)
                .unwrap();
            let normal = queue
                .enqueue(LegacyOperation::RiskAssessment, json!({}), Priority::Normal)
                .unwrap();
            let ids = [high.id, normal.id, low.id];

            low.wait().await.unwrap();
            let order: Vec<Uuid> = queue.history().iter().map(|item| item.id).collect();
            assert_eq!(order, ids);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_runs_by_priority_with_one_worker() {
        let system = Arc::new(CountingSystem::default());
        let queue = threaded_queue(system.clone());

        let handles = queue
            .enqueue_batch(vec![
                (LegacyOperation::PortfolioSync, json!({}), Priority::Low),
                (LegacyOperation::TradeExecution, json!({}), Priority::High),
                (LegacyOperation::RiskAssessment, json!({}), Priority::Normal),
                (LegacyOperation::ComplianceCheck, json!({}), Priority::High),
            ])
            .unwrap();
        let expected = [handles[1].id, handles[3].id, handles[2].id, handles[0].id];

        // joins the running worker
        let extra = queue
            .enqueue(LegacyOperation::DataMigration, json!({}), Priority::Low)
            .unwrap();
        for handle in handles {
            assert_eq!(handle.wait().await.unwrap().status, JobStatus::Completed);
        }
        extra.wait().await.unwrap();

        let order: Vec<Uuid> = queue.history().iter().map(|item| item.id).collect();
        assert_eq!(&order[..4], &expected);
        assert_eq!(order.len(), 5);
        assert_eq!(system.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enqueue_requires_runtime() {
        let queue = queue();
        let err = queue
            .enqueue(LegacyOperation::PortfolioSync, json!({}), Priority::High)
            .unwrap_err();
        assert_eq!(err, LegacyError::NoRuntime);
        assert_eq!(queue.pending_len(), 0);
    }
}
