//! splitmux-client: embedding-side core
//!
//! Multiplexes interactive shell sessions inside a single host view. The
//! pieces compose bottom-up:
//!
//! - [`layout::PaneLayoutTree`]: pure in-memory binary tree of panes
//! - [`registry::SessionRegistry`]: lifecycle of terminal sessions
//! - [`bridge::ProcessBridge`]: one sandboxed host child per session
//! - [`orchestrator::SessionOrchestrator`]: composition root the UI calls

pub mod bridge;
pub mod debounce;
pub mod layout;
pub mod orchestrator;
pub mod registry;

pub use bridge::{BridgeConfig, BridgeEvent, ProcessBridge};
pub use layout::{LayoutSnapshot, PaneId, PaneLayoutTree};
pub use orchestrator::{OrchestratorConfig, OutputSink, SessionOrchestrator};
pub use registry::{ProjectRef, Session, SessionId, SessionInfo, SessionRegistry};
