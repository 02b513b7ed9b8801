//! Application error taxonomy
//!
//! Every failure surfaced to the user is one of seven kinds. Each kind carries
//! a default severity; system errors may additionally be raised as critical.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::Severity;

/// Result alias used across the workspace
pub type AppResult<T> = Result<T, AppError>;

/// Classified application error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
        value: Option<String>,
    },

    #[error("{message}")]
    Network {
        message: String,
        status: Option<u16>,
        url: Option<String>,
    },

    #[error("{message}")]
    Authentication {
        message: String,
        action: Option<String>,
    },

    #[error("{message}")]
    Authorization {
        message: String,
        resource: Option<String>,
        action: Option<String>,
    },

    #[error("{message}")]
    BusinessLogic {
        message: String,
        operation: Option<String>,
    },

    #[error("{message}")]
    System { message: String, critical: bool },

    #[error("{message}")]
    Unknown { message: String },
}

/// The kind tag of an [`AppError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Network,
    Authentication,
    Authorization,
    BusinessLogic,
    System,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::BusinessLogic => "business_logic",
            ErrorKind::System => "system",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Severity assigned when the error does not specify its own
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::Validation => Severity::Low,
            ErrorKind::Authentication | ErrorKind::Authorization => Severity::High,
            ErrorKind::Network
            | ErrorKind::BusinessLogic
            | ErrorKind::System
            | ErrorKind::Unknown => Severity::Medium,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn owned(value: Option<impl Into<String>>) -> Option<String> {
    value.map(Into::into)
}

impl AppError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(
        message: S,
        field: Option<impl Into<String>>,
        value: Option<impl Into<String>>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field: owned(field),
            value: owned(value),
        }
    }

    /// Create a validation error bound to a field only
    pub fn field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
            value: None,
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(
        message: S,
        status: Option<u16>,
        url: Option<impl Into<String>>,
    ) -> Self {
        Self::Network {
            message: message.into(),
            status,
            url: owned(url),
        }
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S, action: Option<impl Into<String>>) -> Self {
        Self::Authentication {
            message: message.into(),
            action: owned(action),
        }
    }

    /// Create an authorization error
    pub fn authorization<S: Into<String>>(
        message: S,
        resource: Option<impl Into<String>>,
        action: Option<impl Into<String>>,
    ) -> Self {
        Self::Authorization {
            message: message.into(),
            resource: owned(resource),
            action: owned(action),
        }
    }

    /// Create a business logic error
    pub fn business_logic<S: Into<String>>(
        message: S,
        operation: Option<impl Into<String>>,
    ) -> Self {
        Self::BusinessLogic {
            message: message.into(),
            operation: owned(operation),
        }
    }

    /// Create a system error with the default (medium) severity
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
            critical: false,
        }
    }

    /// Create a system error that triggers immediate reporting
    pub fn critical<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
            critical: true,
        }
    }

    /// Create an unknown error
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. } => ErrorKind::Validation,
            AppError::Network { .. } => ErrorKind::Network,
            AppError::Authentication { .. } => ErrorKind::Authentication,
            AppError::Authorization { .. } => ErrorKind::Authorization,
            AppError::BusinessLogic { .. } => ErrorKind::BusinessLogic,
            AppError::System { .. } => ErrorKind::System,
            AppError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AppError::System { critical: true, .. } => Severity::Critical,
            other => other.kind().default_severity(),
        }
    }

    /// Error class name used in error records
    pub fn name(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "ValidationError",
            AppError::Network { .. } => "NetworkError",
            AppError::Authentication { .. } => "AuthenticationError",
            AppError::Authorization { .. } => "AuthorizationError",
            AppError::BusinessLogic { .. } => "BusinessLogicError",
            AppError::System { .. } => "SystemError",
            AppError::Unknown { .. } => "Error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::Network { message, .. }
            | AppError::Authentication { message, .. }
            | AppError::Authorization { message, .. }
            | AppError::BusinessLogic { message, .. }
            | AppError::System { message, .. }
            | AppError::Unknown { message } => message,
        }
    }

    /// Field name for validation errors
    pub fn field_name(&self) -> Option<&str> {
        match self {
            AppError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Get error code for external reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Network { .. } => "NETWORK_ERROR",
            AppError::Authentication { .. } => "AUTHENTICATION_ERROR",
            AppError::Authorization { .. } => "AUTHORIZATION_ERROR",
            AppError::BusinessLogic { .. } => "BUSINESS_LOGIC_ERROR",
            AppError::System { critical: true, .. } => "CRITICAL_SYSTEM_ERROR",
            AppError::System { .. } => "SYSTEM_ERROR",
            AppError::Unknown { .. } => "UNKNOWN_ERROR",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::system(format!("Serialization failure: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severities() {
        assert_eq!(
            AppError::validation("bad", Some("quantity"), None::<String>).severity(),
            Severity::Low
        );
        assert_eq!(
            AppError::network("down", Some(503), Some("http://localhost:4000")).severity(),
            Severity::Medium
        );
        assert_eq!(
            AppError::authentication("nope", Some("login")).severity(),
            Severity::High
        );
        assert_eq!(
            AppError::authorization("nope", Some("orders"), None::<String>).severity(),
            Severity::High
        );
        assert_eq!(AppError::system("oops").severity(), Severity::Medium);
        assert_eq!(AppError::critical("fire").severity(), Severity::Critical);
        assert_eq!(AppError::unknown("?").severity(), Severity::Medium);
    }

    #[test]
    fn test_kind_tags() {
        let err = AppError::business_logic("Insufficient funds", Some("createOrder"));
        assert_eq!(err.kind(), ErrorKind::BusinessLogic);
        assert_eq!(err.kind().as_str(), "business_logic");
        assert_eq!(err.name(), "BusinessLogicError");
        assert_eq!(err.to_string(), "Insufficient funds");
    }

    #[test]
    fn test_field_accessor() {
        let err = AppError::field("Quantity must be greater than 0", "quantity");
        assert!(err.is_validation());
        assert_eq!(err.field_name(), Some("quantity"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
