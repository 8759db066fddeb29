//! splitmux-protocol: Shared IPC definitions for bridge-host communication
//!
//! This crate defines all message types and data structures used for
//! communication between a process bridge and its host child process over
//! newline-delimited JSON on the host's stdin/stdout.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{BridgeCodec, CodecError, HostCodec, MAX_LINE};
pub use messages::{BridgeMessage, ErrorCode, HostMessage};
pub use types::{SessionStatus, SpawnOptions, SplitDirection};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;
