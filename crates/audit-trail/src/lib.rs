//! # Audit Trail
//!
//! Structured audit logging with best-effort remote persistence, error
//! classification and reporting, and audit export and statistics.

pub mod error_handler;
pub mod event;
pub mod log;
pub mod report;
pub mod sink;

pub use error_handler::{ErrorHandler, ErrorRecord, ErrorReporter, ErrorStats, LogReporter};
pub use event::{severity_for_action, AuditEvent, AuditStatus, IdentityProvider, NoIdentity};
pub use log::{AuditConfig, AuditLog};
pub use report::{render_events, AuditFilters, AuditStats, ExportFormat};
pub use sink::{AuditSink, StoreSink};
