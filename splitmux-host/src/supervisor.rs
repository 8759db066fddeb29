//! Shell supervisor: the single-slot owner of the host's PTY
//!
//! Each host process backs exactly one session, so the supervisor holds at
//! most one running shell. The slot is an explicit field, never process-wide
//! state. Every spawn request runs the full validation pipeline before any
//! process side effect, and every failure leaves the host alive with a typed
//! `error` frame on the wire.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use splitmux_protocol::{ErrorCode, HostMessage, SpawnOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::policy::{sanitize_env, BoundaryPolicy, PolicyRejection, ShellPolicy};

/// Interval at which the exit watcher polls the child
const EXIT_POLL: Duration = Duration::from_millis(100);

/// A running shell: PTY master, child process, input writer
///
/// The output reader is not held here; it is moved into a blocking reader
/// thread at spawn time.
struct ShellHandle {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    pid: u32,
}

impl std::fmt::Debug for ShellHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellHandle").field("pid", &self.pid).finish()
    }
}

/// Per-host supervisor enforcing spawn policy and owning the shell slot
pub struct ShellSupervisor {
    shell_policy: ShellPolicy,
    boundary: BoundaryPolicy,
    slot: Arc<Mutex<Option<ShellHandle>>>,
    outgoing: mpsc::UnboundedSender<HostMessage>,
}

impl ShellSupervisor {
    pub fn new(shell_policy: ShellPolicy, outgoing: mpsc::UnboundedSender<HostMessage>) -> Self {
        Self {
            shell_policy,
            boundary: BoundaryPolicy::new(),
            slot: Arc::new(Mutex::new(None)),
            outgoing,
        }
    }

    /// Set the boundary and acknowledge it. A second attempt is logged and
    /// ignored; the boundary is immutable once set.
    pub fn set_boundary(&mut self, path: String) {
        if self.boundary.set(&path) {
            self.send(HostMessage::BoundarySet { path });
        }
    }

    /// Run the validation pipeline and spawn the shell.
    ///
    /// Pipeline order, short-circuiting on first failure: double-spawn
    /// guard, shell whitelist, cwd existence, boundary containment, env
    /// sanitization, PTY spawn. Rejections and spawn failures are reported
    /// over the wire, never propagated.
    pub fn spawn(&self, options: SpawnOptions) {
        if let Err(rejection) = self.validate(&options) {
            warn!(code = ?rejection.code, message = %rejection.message, "Spawn rejected");
            self.reject(rejection);
            return;
        }

        match self.spawn_pty(&options) {
            Ok(pid) => {
                info!(pid, shell = %options.shell, cwd = %options.cwd, "Shell spawned");
                self.send(HostMessage::Spawned { pid });
            }
            Err(rejection) => {
                warn!(code = ?rejection.code, message = %rejection.message, "Spawn failed");
                self.reject(rejection);
            }
        }
    }

    fn validate(&self, options: &SpawnOptions) -> Result<(), PolicyRejection> {
        if self.slot.lock().is_some() {
            return Err(PolicyRejection {
                code: ErrorCode::DoubleSpawn,
                message: "A shell is already running under this host".into(),
            });
        }

        self.shell_policy.check(&options.shell)?;

        let cwd = Path::new(&options.cwd);
        if !cwd.is_dir() {
            return Err(PolicyRejection {
                code: ErrorCode::InvalidCwd,
                message: format!("Working directory does not exist: {}", options.cwd),
            });
        }

        self.boundary.check(cwd)
    }

    fn spawn_pty(&self, options: &SpawnOptions) -> Result<u32, PolicyRejection> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PolicyRejection {
                code: ErrorCode::InvalidPty,
                message: format!("Failed to open PTY: {e}"),
            })?;

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.args(&options.args);
        cmd.cwd(&options.cwd);
        cmd.env_clear();
        for (key, value) in sanitize_env(std::env::vars()) {
            cmd.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| PolicyRejection {
            code: ErrorCode::SpawnFailed,
            message: format!("Failed to spawn shell: {e}"),
        })?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PolicyRejection {
                code: ErrorCode::SpawnException,
                message: format!("Failed to clone PTY reader: {e}"),
            })?;

        let writer = pair.master.take_writer().map_err(|e| PolicyRejection {
            code: ErrorCode::SpawnException,
            message: format!("Failed to take PTY writer: {e}"),
        })?;

        let pid = child.process_id().unwrap_or(0);

        *self.slot.lock() = Some(ShellHandle {
            master: pair.master,
            child,
            writer,
            pid,
        });

        self.start_reader(reader);
        self.start_exit_watcher();

        Ok(pid)
    }

    /// Blocking reader thread: every output chunk becomes a `data` frame
    fn start_reader(&self, mut reader: Box<dyn Read + Send>) {
        let outgoing = self.outgoing.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if outgoing.send(HostMessage::Data(chunk)).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("PTY reader thread finished");
        });
    }

    /// Poll the child until it exits, then emit `exit` and clear the slot
    /// so a future spawn is possible
    fn start_exit_watcher(&self) {
        let slot = self.slot.clone();
        let outgoing = self.outgoing.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(EXIT_POLL).await;

                let exit_code = {
                    let mut guard = slot.lock();
                    let Some(handle) = guard.as_mut() else {
                        return;
                    };
                    match handle.child.try_wait() {
                        Ok(Some(status)) => {
                            let code = status.exit_code() as i32;
                            *guard = None;
                            Some(code)
                        }
                        Ok(None) => None,
                        Err(e) => {
                            warn!(error = %e, "Child wait failed, clearing slot");
                            *guard = None;
                            Some(-1)
                        }
                    }
                };

                if let Some(code) = exit_code {
                    info!(code, "Shell exited");
                    let _ = outgoing.send(HostMessage::Exit { exit_code: code });
                    return;
                }
            }
        });
    }

    /// Forward input to the shell; dropped when no shell is running
    pub fn write(&self, data: &str) {
        let mut guard = self.slot.lock();
        if let Some(handle) = guard.as_mut() {
            if let Err(e) = handle.writer.write_all(data.as_bytes()) {
                warn!(error = %e, "PTY write failed");
            }
        }
    }

    /// Resize the PTY; no-op when no shell is running
    pub fn resize(&self, cols: u16, rows: u16) {
        let guard = self.slot.lock();
        if let Some(handle) = guard.as_ref() {
            if let Err(e) = handle.master.resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            }) {
                warn!(error = %e, "PTY resize failed");
            }
        }
    }

    /// Kill the shell; the exit watcher reaps it and clears the slot
    pub fn kill(&self) {
        let mut guard = self.slot.lock();
        if let Some(handle) = guard.as_mut() {
            debug!(pid = handle.pid, "Killing shell");
            if let Err(e) = handle.child.kill() {
                warn!(error = %e, "Kill failed");
            }
        }
    }

    pub fn has_shell(&self) -> bool {
        self.slot.lock().is_some()
    }

    fn reject(&self, rejection: PolicyRejection) {
        self.send(HostMessage::Error {
            message: rejection.message,
            code: rejection.code,
        });
    }

    fn send(&self, msg: HostMessage) {
        let _ = self.outgoing.send(msg);
    }
}

impl std::fmt::Debug for ShellSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSupervisor")
            .field("boundary_set", &self.boundary.is_set())
            .field("has_shell", &self.has_shell())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor() -> (ShellSupervisor, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ShellSupervisor::new(ShellPolicy::POSIX, tx), rx)
    }

    fn expect_error(rx: &mut mpsc::UnboundedReceiver<HostMessage>, expected: ErrorCode) {
        match rx.try_recv() {
            Ok(HostMessage::Error { code, .. }) => assert_eq!(code, expected),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_unlisted_shell() {
        let (sup, mut rx) = supervisor();
        let dir = TempDir::new().unwrap();
        sup.spawn(SpawnOptions::new(
            "python",
            dir.path().to_string_lossy().into_owned(),
        ));
        expect_error(&mut rx, ErrorCode::ShellNotAllowed);
        assert!(!sup.has_shell());
    }

    #[tokio::test]
    async fn test_rejects_missing_cwd() {
        let (sup, mut rx) = supervisor();
        sup.spawn(SpawnOptions::new("/bin/sh", "/no/such/directory"));
        expect_error(&mut rx, ErrorCode::InvalidCwd);
    }

    #[tokio::test]
    async fn test_rejects_cwd_outside_boundary() {
        let (mut sup, mut rx) = supervisor();
        let root = TempDir::new().unwrap();
        let vault = root.path().join("deep").join("vault");
        std::fs::create_dir_all(&vault).unwrap();
        let outside = root.path().join("totally").join("unrelated");
        std::fs::create_dir_all(&outside).unwrap();

        sup.set_boundary(vault.to_string_lossy().into_owned());
        assert!(matches!(rx.try_recv(), Ok(HostMessage::BoundarySet { .. })));

        sup.spawn(SpawnOptions::new(
            "/bin/sh",
            outside.to_string_lossy().into_owned(),
        ));
        expect_error(&mut rx, ErrorCode::CwdOutsideBoundary);
    }

    #[tokio::test]
    async fn test_second_boundary_ignored() {
        let (mut sup, mut rx) = supervisor();
        sup.set_boundary("/first".into());
        assert!(matches!(rx.try_recv(), Ok(HostMessage::BoundarySet { .. })));

        sup.set_boundary("/second".into());
        // No acknowledgement for the refused replacement
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_and_double_spawn_guard() {
        let (sup, mut rx) = supervisor();
        let dir = TempDir::new().unwrap();
        let cwd = dir.path().to_string_lossy().into_owned();

        sup.spawn(SpawnOptions::new("/bin/sh", cwd.clone()));
        match rx.recv().await {
            Some(HostMessage::Spawned { pid }) => assert!(pid > 0),
            other => panic!("expected spawned frame, got {other:?}"),
        }
        assert!(sup.has_shell());

        // Second spawn is refused and leaves the running shell untouched
        sup.spawn(SpawnOptions::new("/bin/sh", cwd));
        expect_error(&mut rx, ErrorCode::DoubleSpawn);
        assert!(sup.has_shell());

        sup.kill();
    }

    #[tokio::test]
    async fn test_shell_exit_clears_slot() {
        let (sup, mut rx) = supervisor();
        let dir = TempDir::new().unwrap();

        let options = SpawnOptions::new("/bin/sh", dir.path().to_string_lossy().into_owned())
            .with_arg("-c")
            .with_arg("exit 7");
        sup.spawn(options);

        // Drain frames until the exit arrives; output chunks may precede it
        loop {
            match rx.recv().await {
                Some(HostMessage::Exit { exit_code }) => {
                    assert_eq!(exit_code, 7);
                    break;
                }
                Some(_) => continue,
                None => panic!("channel closed before exit frame"),
            }
        }
        assert!(!sup.has_shell());
    }

    #[tokio::test]
    async fn test_shell_output_streams_as_data() {
        let (sup, mut rx) = supervisor();
        let dir = TempDir::new().unwrap();

        let options = SpawnOptions::new("/bin/sh", dir.path().to_string_lossy().into_owned())
            .with_arg("-c")
            .with_arg("echo marker-4217");
        sup.spawn(options);

        let mut collected = String::new();
        loop {
            match rx.recv().await {
                Some(HostMessage::Data(chunk)) => {
                    collected.push_str(&chunk);
                    if collected.contains("marker-4217") {
                        break;
                    }
                }
                Some(HostMessage::Exit { .. }) => break,
                Some(_) => continue,
                None => break,
            }
        }
        assert!(collected.contains("marker-4217"));
    }

    #[tokio::test]
    async fn test_write_and_resize_without_shell_are_noops() {
        let (sup, mut rx) = supervisor();
        sup.write("ls\n");
        sup.resize(120, 40);
        sup.kill();
        assert!(rx.try_recv().is_err());
    }
}
