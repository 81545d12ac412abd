//! Error types for caldav-mcp.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while serving calendar tools.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Calendar '{name}' not found. Available: {}", list_or_none(.available))]
    CalendarNotFound { name: String, available: Vec<String> },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("ICS parse error: {0}")]
    IcsParse(String),
}

/// Stable, machine-readable error category reported to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationMissing,
    AuthenticationFailed,
    CalendarNotFound,
    ValidationError,
    NetworkFailure,
    Timeout,
    InvalidCalendarData,
}

impl CalendarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalendarError::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,
            CalendarError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            CalendarError::CalendarNotFound { .. } => ErrorKind::CalendarNotFound,
            CalendarError::Validation(_) => ErrorKind::ValidationError,
            CalendarError::Network(_) => ErrorKind::NetworkFailure,
            CalendarError::Timeout(_) => ErrorKind::Timeout,
            CalendarError::IcsParse(_) => ErrorKind::InvalidCalendarData,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CalendarError::Validation(msg.into())
    }
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Result type alias for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;
