//! Process bridge
//!
//! Client-side counterpart of one host process. Owns the child-process
//! handle and the NDJSON byte streams, translates structured requests into
//! wire messages, and surfaces wire messages as typed [`BridgeEvent`]s on a
//! per-session channel consumed by the orchestrator's control loop.
//!
//! All sends are fire-and-forget: the protocol is event-driven, not RPC, so
//! nothing here awaits a direct reply to an individual request.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use splitmux_protocol::{
    BridgeCodec, BridgeMessage, ErrorCode, HostMessage, SessionStatus, SpawnOptions,
};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

/// Grace period between the graceful kill and the forced termination
pub const KILL_GRACE: Duration = Duration::from_millis(500);

/// Extra margin restart waits on top of the grace period
pub const RESTART_MARGIN: Duration = Duration::from_millis(250);

/// Typed event raised by a bridge, one channel per session
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Connection status changed
    Status(SessionStatus),
    /// Raw output chunk, forwarded verbatim (no parsing at this layer)
    Data(String),
    /// Shell exited with the given code
    Exit(i32),
    /// Typed failure surfaced by the host (or by process creation)
    Error {
        message: String,
        code: Option<ErrorCode>,
    },
}

/// Bridge configuration, one per session
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to the splitmux-host binary
    pub host_program: PathBuf,
    /// Boundary root forwarded on the host's `ready`
    pub boundary: PathBuf,
    /// Two-phase shutdown grace period
    pub kill_grace: Duration,
}

impl BridgeConfig {
    pub fn new(host_program: impl Into<PathBuf>, boundary: impl Into<PathBuf>) -> Self {
        Self {
            host_program: host_program.into(),
            boundary: boundary.into(),
            kill_grace: KILL_GRACE,
        }
    }
}

/// State shared between the bridge handle and its reader task
struct Shared {
    status: Mutex<SessionStatus>,
    stopping: AtomicBool,
    /// Host has signalled `ready` (boundary already queued ahead of any spawn)
    ready: AtomicBool,
    /// Spawn requested before the host was ready, flushed on `ready`
    pending_spawn: Mutex<Option<SpawnOptions>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl Shared {
    fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Set the status and emit a Status event, once per actual change
    fn transition(&self, status: SessionStatus) {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if *guard == status {
            return;
        }
        *guard = status;
        drop(guard);
        let _ = self.events.send(BridgeEvent::Status(status));
    }

    /// Park the spawn request unless the host is ready.
    ///
    /// Returns the options back when they should be sent now. The ready
    /// check happens under the `pending_spawn` lock, the same lock the
    /// `ready` flush takes, so a request can never be parked after the
    /// flush already ran and miss it.
    fn park_or_pass(&self, options: SpawnOptions) -> Option<SpawnOptions> {
        let mut pending = self.pending_spawn.lock().unwrap_or_else(|e| e.into_inner());
        if self.ready.load(Ordering::SeqCst) {
            Some(options)
        } else {
            *pending = Some(options);
            None
        }
    }
}

/// Per-session bridge to one sandboxed host process
///
/// Methods must be called from within a tokio runtime: `start` spawns the
/// reader and writer tasks, `stop` schedules the forced termination timer.
pub struct ProcessBridge {
    config: BridgeConfig,
    shared: Arc<Shared>,
    child: Option<Arc<tokio::sync::Mutex<Child>>>,
    outgoing: Option<mpsc::UnboundedSender<BridgeMessage>>,
}

impl ProcessBridge {
    /// Create a bridge publishing events on the given channel
    pub fn new(config: BridgeConfig, events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                status: Mutex::new(SessionStatus::Disconnected),
                stopping: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                pending_spawn: Mutex::new(None),
                events,
            }),
            child: None,
            outgoing: None,
        }
    }

    /// Current connection status
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Spawn the host process and begin reading its stream
    ///
    /// Fails closed: returns false and transitions to Error if the process
    /// cannot be created.
    pub fn start(&mut self) -> bool {
        self.shared.stopping.store(false, Ordering::SeqCst);
        self.shared.ready.store(false, Ordering::SeqCst);

        let mut child = match Command::new(&self.config.host_program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.config.host_program.display(), error = %e,
                      "Failed to spawn host process");
                self.shared.transition(SessionStatus::Error);
                let _ = self.shared.events.send(BridgeEvent::Error {
                    message: format!("Failed to spawn host process: {}", e),
                    code: None,
                });
                return false;
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            warn!("Host process spawned without piped stdio");
            self.shared.transition(SessionStatus::Error);
            return false;
        };

        // Writer task drains the outgoing queue so every send stays
        // fire-and-forget for callers.
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<BridgeMessage>();
        let mut writer = FramedWrite::new(stdin, BridgeCodec::new());
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = writer.send(msg).await {
                    warn!(error = %e, "Failed to write to host, stopping writer");
                    break;
                }
            }
        });

        let mut reader = FramedRead::new(stdout, BridgeCodec::new());
        let shared = self.shared.clone();
        let reply_tx = out_tx.clone();
        let boundary = self.config.boundary.to_string_lossy().into_owned();
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(msg) => handle_host_message(&shared, &reply_tx, &boundary, msg),
                    Err(e) => {
                        warn!(error = %e, "Host stream read failed");
                        break;
                    }
                }
            }
            // Abrupt pipe close without an exit frame still surfaces a
            // clean transition.
            if !shared.stopping() && shared.status() != SessionStatus::Disconnected {
                shared.transition(SessionStatus::Disconnected);
            }
        });

        self.child = Some(Arc::new(tokio::sync::Mutex::new(child)));
        self.outgoing = Some(out_tx);
        self.shared.transition(SessionStatus::Connecting);
        true
    }

    fn send(&self, msg: BridgeMessage) {
        match &self.outgoing {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => debug!("Dropping send, bridge not started"),
        }
    }

    /// Request a shell spawn; status stays Connecting until `spawned`
    ///
    /// If the host has not signalled `ready` yet, the request is held back
    /// so the boundary is always set before the first spawn.
    pub fn spawn(&self, options: SpawnOptions) {
        if let Some(options) = self.shared.park_or_pass(options) {
            self.send(BridgeMessage::Spawn(options));
        }
    }

    /// Write input to the shell
    pub fn write(&self, data: impl Into<String>) {
        self.send(BridgeMessage::Write(data.into()));
    }

    /// Resize the pseudo-terminal
    pub fn resize(&self, cols: u16, rows: u16) {
        self.send(BridgeMessage::Resize { cols, rows });
    }

    /// Terminate the shell without stopping the host
    pub fn kill_shell(&self) {
        self.send(BridgeMessage::Kill {});
    }

    /// Sender for raw wire messages (used by the resize debouncer)
    pub fn message_sender(&self) -> Option<mpsc::UnboundedSender<BridgeMessage>> {
        self.outgoing.clone()
    }

    /// Two-phase shutdown: graceful kill now, forced termination after the
    /// grace period if the process is still alive. Status flips to
    /// Disconnected immediately (optimistic).
    pub fn stop(&mut self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.send(BridgeMessage::Kill {});
        self.shared.transition(SessionStatus::Disconnected);

        if let Some(child) = self.child.take() {
            let grace = self.config.kill_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let mut child = child.lock().await;
                match child.try_wait() {
                    Ok(Some(_)) => {}
                    _ => {
                        debug!("Host still alive after grace period, forcing kill");
                        let _ = child.kill().await;
                    }
                }
            });
        }
        self.outgoing = None;
    }

    /// Stop, wait out the grace period plus a small margin, start again
    pub async fn restart(&mut self) -> bool {
        let grace = self.config.kill_grace;
        self.stop();
        tokio::time::sleep(grace + RESTART_MARGIN).await;
        self.start()
    }
}

impl std::fmt::Debug for ProcessBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBridge")
            .field("status", &self.status())
            .field("started", &self.outgoing.is_some())
            .finish()
    }
}

/// Apply one host frame to the bridge state machine
fn handle_host_message(
    shared: &Shared,
    reply_tx: &mpsc::UnboundedSender<BridgeMessage>,
    boundary: &str,
    msg: HostMessage,
) {
    match msg {
        HostMessage::Ready {} => {
            debug!("Host ready, sending boundary");
            let _ = reply_tx.send(BridgeMessage::SetBoundary {
                path: boundary.to_string(),
            });
            // ready flips inside the pending_spawn lock; a concurrent
            // spawn() either parks before this drain or sees ready and
            // sends directly, never both missed
            let pending = {
                let mut slot = shared
                    .pending_spawn
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                shared.ready.store(true, Ordering::SeqCst);
                slot.take()
            };
            if let Some(options) = pending {
                let _ = reply_tx.send(BridgeMessage::Spawn(options));
            }
        }
        HostMessage::BoundarySet { path } => {
            // Informational only
            debug!(path = %path, "Host boundary set");
        }
        HostMessage::Spawned { pid } => {
            debug!(pid, "Shell spawned");
            shared.transition(SessionStatus::Connected);
        }
        HostMessage::Data(data) => {
            let _ = shared.events.send(BridgeEvent::Data(data));
        }
        HostMessage::Exit { exit_code } => {
            debug!(exit_code, "Shell exited");
            if !shared.stopping() {
                shared.transition(SessionStatus::Disconnected);
            }
            let _ = shared.events.send(BridgeEvent::Exit(exit_code));
        }
        HostMessage::Error { message, code } => {
            warn!(message = %message, ?code, "Host reported error");
            shared.transition(SessionStatus::Error);
            let _ = shared.events.send(BridgeEvent::Error {
                message,
                code: Some(code),
            });
        }
    }
}
