//! Error types for splitmux
//!
//! Provides a unified error type used across all splitmux crates.

use std::path::PathBuf;

/// Main error type for splitmux operations
#[derive(Debug, thiserror::Error)]
pub enum SplitmuxError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // === Layout Errors ===

    #[error("Pane not found: {0}")]
    PaneNotFound(String),

    #[error("Not a pane: {0}")]
    NotAPane(String),

    #[error("Cannot close the last pane")]
    CannotClose,

    // === Session Errors ===

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // === Host / PTY Errors ===

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    #[error("Host process not running")]
    HostNotRunning,

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SplitmuxError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a PTY error
    pub fn pty(msg: impl Into<String>) -> Self {
        Self::Pty(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::ProcessSpawn(msg.into())
    }
}

/// Result type alias using SplitmuxError
pub type Result<T> = std::result::Result<T, SplitmuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SplitmuxError::SessionNotFound("term-3".into());
        assert_eq!(err.to_string(), "Session not found: term-3");
    }

    #[test]
    fn test_error_display_not_a_pane() {
        let err = SplitmuxError::NotAPane("7".into());
        assert_eq!(err.to_string(), "Not a pane: 7");
    }

    #[test]
    fn test_error_display_cannot_close() {
        assert_eq!(
            SplitmuxError::CannotClose.to_string(),
            "Cannot close the last pane"
        );
    }

    #[test]
    fn test_error_display_pty() {
        let err = SplitmuxError::pty("failed to allocate PTY");
        assert_eq!(err.to_string(), "PTY error: failed to allocate PTY");
    }

    #[test]
    fn test_error_display_process_spawn() {
        let err = SplitmuxError::spawn("command not found");
        assert_eq!(err.to_string(), "Failed to spawn process: command not found");
    }

    #[test]
    fn test_error_display_file_write() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SplitmuxError::FileWrite {
            path: PathBuf::from("/var/log/splitmux.log"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to write file"));
        assert!(msg.contains("/var/log/splitmux.log"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: SplitmuxError = io_err.into();
        assert!(matches!(err, SplitmuxError::Io(_)));
    }

    #[test]
    fn test_protocol_helper() {
        let err = SplitmuxError::protocol("truncated frame");
        assert!(matches!(err, SplitmuxError::Protocol(_)));
        assert_eq!(err.to_string(), "Protocol error: truncated frame");
    }

    #[test]
    fn test_internal_helper() {
        let err = SplitmuxError::internal("invariant violated");
        assert!(matches!(err, SplitmuxError::Internal(_)));
    }

    #[test]
    fn test_config_helper() {
        let err = SplitmuxError::config("missing boundary path");
        assert!(err.to_string().contains("missing boundary path"));
    }

    #[test]
    fn test_error_debug() {
        let err = SplitmuxError::PaneNotFound("12".into());
        let debug = format!("{:?}", err);
        assert!(debug.contains("PaneNotFound"));
        assert!(debug.contains("12"));
    }
}
