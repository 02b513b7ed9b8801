//! # Security Guard
//!
//! Input sanitization, sliding-window rate limiting, IP blocking, request
//! validation, password policy and security event tracking.

pub mod config;
pub mod events;
pub mod guard;
pub mod password;
pub mod patterns;
pub mod rate_limiter;
pub mod sanitizer;

pub use config::SecurityConfig;
pub use events::{SecurityEvent, SecurityStats, ThreatReport};
pub use guard::{RequestInfo, RequestValidation, SecurityGuard};
pub use password::{generate_secure_token, hash_data, validate_password, PasswordCheck};
pub use rate_limiter::{IpBlocklist, RateLimitDecision, RateLimiter};
pub use sanitizer::{sanitize, InputKind, Rejection};
