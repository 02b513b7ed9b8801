//! # Data Layer
//!
//! The record store seam (REST client and in-memory fixtures), the local
//! key-value storage used for session state and audit backups, and the
//! bounded TTL cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use cache::*;
pub use config::*;
pub use error::*;
pub use memory::*;
pub use storage::*;
pub use store::*;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
