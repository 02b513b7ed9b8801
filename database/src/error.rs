//! Data layer error types
//!
//! `StoreError` covers the remote record store, `StorageError` the local
//! key-value storage. Both convert into the application taxonomy.

use portfolio_monitor_core::AppError;
use thiserror::Error;

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error! status: {status} ({url})")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// HTTP status when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            StoreError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match err.status() {
            Some(status) => StoreError::Status {
                status: status.as_u16(),
                url,
            },
            None => StoreError::Transport {
                url,
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::Configuration(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Status { status, url } => {
                AppError::network(err.to_string(), Some(*status), Some(url.clone()))
            }
            StoreError::Transport { url, .. } => {
                AppError::network(err.to_string(), None, Some(url.clone()))
            }
            StoreError::NotFound(_) => {
                AppError::business_logic(err.to_string(), None::<String>)
            }
            StoreError::Serialization(_) | StoreError::Configuration(_) => {
                AppError::system(err.to_string())
            }
        }
    }
}

/// Type alias for record store results
pub type StoreResult<T> = Result<T, StoreError>;

/// Local storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::system(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
