//! Logging infrastructure for splitmux
//!
//! Provides unified logging setup using the tracing ecosystem.
//!
//! The host process speaks its wire protocol on stdout, so the host MUST
//! log to stderr or to a file, never to stdout.

use std::path::PathBuf;

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::{Result, SplitmuxError};

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr (embedding side, host default)
    Stderr,
    /// Log to the given file (host with --log-file)
    File(PathBuf),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g. "info", "debug", "splitmux=debug,tokio=warn")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("SPLITMUX_LOG").unwrap_or_else(|_| "info".into()),
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Config for the host process: stderr unless a log file was requested
    pub fn host(level: &str, log_file: Option<PathBuf>) -> Self {
        Self {
            output: log_file.map(LogOutput::File).unwrap_or(LogOutput::Stderr),
            filter: std::env::var("SPLITMUX_LOG").unwrap_or_else(|_| level.to_string()),
            file_line: true,
        }
    }
}

/// Initialize logging with default configuration
///
/// Uses SPLITMUX_LOG env var for the filter, defaults to "info"
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| SplitmuxError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| SplitmuxError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|e| SplitmuxError::FileWrite {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| SplitmuxError::FileWrite {
                    path: path.clone(),
                    source: e,
                })?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| SplitmuxError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(!config.file_line);
    }

    #[test]
    fn test_host_config_stderr() {
        let config = LogConfig::host("debug", None);
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.file_line);
    }

    #[test]
    fn test_host_config_file() {
        let path = PathBuf::from("/tmp/splitmux-host.log");
        let config = LogConfig::host("info", Some(path.clone()));
        assert_eq!(config.output, LogOutput::File(path));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            output: LogOutput::Stderr,
            filter: "[[[".into(),
            file_line: false,
        };
        assert!(init_logging_with_config(config).is_err());
    }

    #[test]
    fn test_file_logging_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("host.log");
        let config = LogConfig {
            output: LogOutput::File(path.clone()),
            filter: "info".into(),
            file_line: false,
        };
        // Global subscriber may already be set by another test; the file
        // should exist either way once the open succeeded.
        let _ = init_logging_with_config(config);
        assert!(path.parent().unwrap().exists());
    }
}
