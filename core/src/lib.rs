//! # Portfolio Monitor Core
//!
//! Domain types, the application error taxonomy and the pure aggregation
//! functions that turn order records into portfolio views.

pub mod aggregator;
pub mod error;
pub mod export;
pub mod format;
pub mod stats;
pub mod types;
pub mod validation;

pub use error::{AppError, AppResult, ErrorKind};
pub use stats::TimeRange;
pub use types::*;
