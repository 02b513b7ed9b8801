//! # Portfolio Monitor
//!
//! Portfolio management service core: holdings and transaction views over a
//! JSON record store, a structured audit trail, input sanitization with rate
//! limiting, a bounded TTL cache and a priority queue for long-running
//! legacy operations.
//!
//! ## Architecture
//!
//! The system is organized into modular crates:
//! - `core`: domain types, error taxonomy, aggregation and validation
//! - `database`: TTL cache, local storage and the record store client
//! - `audit-trail`: audit log and error classification
//! - `security-guard`: sanitizer, rate limiter and IP blocklist
//! - `legacy-bridge`: legacy job queue and performance metrics
//!
//! This crate wires them together in [`app::PortfolioMonitor`] and exposes the
//! CLI commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use portfolio_monitor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = PortfolioMonitor::new(AppConfig::load(None)?)?;
//!     app.auth().login(&Credentials::new("admin@abc.com", "password123"))?;
//!
//!     let dashboard = app.dashboard().await?;
//!     println!("{} holdings", dashboard.holdings.len());
//!
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod app;
pub mod auth;
pub mod commands;
pub mod config;
pub mod telemetry;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::app::{Dashboard, MonitorSnapshot, PortfolioMonitor};
    pub use crate::auth::{AuthService, Credentials, SessionUser};
    pub use crate::config::AppConfig;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub const BUILD_INFO: &str = concat!("Portfolio Monitor v", env!("CARGO_PKG_VERSION"));
