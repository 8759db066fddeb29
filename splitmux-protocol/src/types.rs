//! Shared value types carried on the wire

use serde::{Deserialize, Serialize};

/// Split direction for layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    Horizontal,
    Vertical,
}

/// Connection status of a terminal session
///
/// Lifecycle: `Disconnected -> Connecting -> Connected -> {Disconnected | Error}`,
/// with `Error` reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A validated spawn request: shell, working directory, terminal geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOptions {
    /// Shell executable (full path or bare name, checked against the whitelist)
    pub shell: String,
    /// Working directory (must exist and resolve inside the boundary)
    pub cwd: String,
    /// Terminal width in columns
    pub cols: u16,
    /// Terminal height in rows
    pub rows: u16,
    /// Extra shell arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl SpawnOptions {
    /// Create spawn options with default 80x24 geometry
    pub fn new(shell: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            cwd: cwd.into(),
            cols: 80,
            rows: 24,
            args: Vec::new(),
        }
    }

    /// Set the terminal geometry
    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    /// Append a shell argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}
