//! Common utilities for splitmux
//!
//! Shared error type and logging setup used by every splitmux crate.

pub mod error;
pub mod logging;

pub use error::{Result, SplitmuxError};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
