// src/utils/errors.rs
//! Error types for the capture pipeline

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors that terminate a capture run
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Domain enable or event subscription failed
    #[error("Session setup failed: {0}")]
    SessionSetupFailed(String),

    /// The page failed to load
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// The capture window never closed
    #[error("Capture condition did not resolve within {0:?}")]
    ConditionTimeout(Duration),

    /// `export` was called on a session that was already exported
    #[error("Capture session already detached")]
    AlreadyDetached,

    #[error("Browser error: {0}")]
    BrowserFailed(String),

    #[error("Tracing failed: {0}")]
    TracingFailed(String),

    #[error("Audit failed: {0}")]
    AuditFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for CaptureError {
    fn from(e: config::ConfigError) -> Self {
        CaptureError::ConfigError(e.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for CaptureError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        CaptureError::BrowserFailed(e.to_string())
    }
}

impl CaptureError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CaptureError::ConfigError(_) => 2,
            CaptureError::ConditionTimeout(_) => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaptureError::SessionSetupFailed("Network.enable rejected".to_string());
        assert_eq!(err.to_string(), "Session setup failed: Network.enable rejected");

        let err = CaptureError::ConditionTimeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CaptureError::ConfigError("x".into()).exit_code(), 2);
        assert_eq!(CaptureError::ConditionTimeout(Duration::ZERO).exit_code(), 3);
        assert_eq!(CaptureError::AlreadyDetached.exit_code(), 1);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CaptureError = io.into();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
