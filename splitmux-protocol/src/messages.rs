//! Bridge-host message types
//!
//! Every wire frame is one JSON object `{ "type": ..., "data": ... }` on a
//! single line. The adjacently-tagged serde representation below produces
//! exactly that shape.

use serde::{Deserialize, Serialize};

use crate::types::SpawnOptions;

/// Stable error codes carried in `error.code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A shell is already running under this host
    DoubleSpawn,
    /// Requested shell is not on the platform whitelist
    ShellNotAllowed,
    /// Working directory does not exist or is not a directory
    InvalidCwd,
    /// Working directory resolves outside the boundary tolerance
    CwdOutsideBoundary,
    /// Spawn-time exception (anything thrown while setting up the shell)
    SpawnException,
    /// The pseudo-terminal could not be opened
    InvalidPty,
    /// The shell process failed to start
    SpawnFailed,
    /// Top-level panic intercepted in the host
    UncaughtException,
    /// Background task failure intercepted in the host
    UnhandledRejection,
}

/// Messages sent from host to bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum HostMessage {
    /// Host process is up and listening on stdin
    Ready {},

    /// Boundary path accepted (informational)
    BoundarySet { path: String },

    /// Shell spawned successfully
    Spawned { pid: u32 },

    /// Output chunk from the shell, forwarded verbatim
    Data(String),

    /// Shell exited
    #[serde(rename_all = "camelCase")]
    Exit { exit_code: i32 },

    /// Typed failure: policy rejection or process-lifecycle error
    Error { message: String, code: ErrorCode },
}

/// Messages sent from bridge to host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum BridgeMessage {
    /// Set the boundary path, once per host lifetime
    SetBoundary { path: String },

    /// Spawn a shell after the validation pipeline passes
    Spawn(SpawnOptions),

    /// Write input bytes to the shell
    Write(String),

    /// Resize the pseudo-terminal
    Resize { cols: u16, rows: u16 },

    /// Gracefully terminate the shell
    Kill {},
}
