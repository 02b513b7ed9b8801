use portfolio_monitor_core::AppError;
use thiserror::Error;

/// Legacy integration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LegacyError {
    #[error("Unknown legacy operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid payload for {operation}: {message}")]
    InvalidPayload { operation: String, message: String },

    #[error("Legacy system error during {operation}: {message}")]
    System { operation: String, message: String },

    #[error("Legacy queue worker stopped before job {0} finished")]
    WorkerStopped(String),

    #[error("No async runtime available to process the legacy queue")]
    NoRuntime,
}

impl LegacyError {
    pub fn system(operation: impl Into<String>, message: impl Into<String>) -> Self {
        LegacyError::System {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn operation(&self) -> Option<&str> {
        match self {
            LegacyError::UnknownOperation(op) => Some(op),
            LegacyError::InvalidPayload { operation, .. } | LegacyError::System { operation, .. } => {
                Some(operation)
            }
            LegacyError::WorkerStopped(_) | LegacyError::NoRuntime => None,
        }
    }
}

impl From<LegacyError> for AppError {
    fn from(err: LegacyError) -> Self {
        match &err {
            LegacyError::UnknownOperation(_) | LegacyError::InvalidPayload { .. } => {
                AppError::business_logic(err.to_string(), err.operation())
            }
            LegacyError::System { .. } | LegacyError::WorkerStopped(_) => AppError::system(err.to_string()),
            LegacyError::NoRuntime => AppError::critical(err.to_string()),
        }
    }
}

pub type LegacyResult<T> = Result<T, LegacyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_monitor_core::ErrorKind;

    #[test]
    fn test_app_error_mapping() {
        let unknown: AppError = LegacyError::UnknownOperation("teleport".into()).into();
        assert_eq!(unknown.kind(), ErrorKind::BusinessLogic);
        assert_eq!(unknown.message(), "Unknown legacy operation: teleport");

        let system: AppError = LegacyError::system("trade_execution", "mainframe offline").into();
        assert_eq!(system.kind(), ErrorKind::System);
    }
}
