//! # Legacy Bridge
//!
//! Integration with the (simulated) legacy back-office system: the
//! operation simulators, the instrumented bridge that times and audits every
//! call, a single-worker priority job queue and the performance monitor
//! backing the system monitor view.

pub mod bridge;
pub mod error;
pub mod operation;
pub mod performance;
pub mod queue;
pub mod simulator;

pub use bridge::LegacyBridge;
pub use error::{LegacyError, LegacyResult};
pub use operation::{JobStatus, LegacyOperation, Priority, QueueItem};
pub use performance::{
    MemoryReport, PerformanceMetric, PerformanceMonitor, PerformanceStats, ServiceStats, Timer,
};
pub use queue::{JobHandle, LegacyQueue, QueueConfig, QueueStatus};
pub use simulator::{LegacySystem, SimulatedLegacySystem};
