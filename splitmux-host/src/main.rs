//! splitmux-host: privileged shell host
//!
//! One host process backs one terminal session. It speaks newline-delimited
//! JSON on stdin/stdout and is the only splitmux component allowed to
//! execute a shell. All logging goes to stderr or a file; stdout carries
//! protocol frames exclusively.

mod policy;
mod supervisor;

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use splitmux_protocol::{BridgeMessage, ErrorCode, HostCodec, HostMessage};
use splitmux_utils::{init_logging_with_config, LogConfig};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use policy::ShellPolicy;
use supervisor::ShellSupervisor;

#[derive(Parser, Debug)]
#[command(author, version, about = "Privileged shell host for splitmux")]
struct Args {
    /// Log level filter (overridden by SPLITMUX_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Emit one frame straight to stdout, bypassing the writer task.
///
/// Only for last-resort paths (panic hook, writer task death) where the
/// normal channel is gone. A failed write here is unreportable.
fn emit_raw(msg: &HostMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{json}");
        let _ = stdout.flush();
    }
}

/// Panics must reach the bridge as a typed error, never as a silent death
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        emit_raw(&HostMessage::Error {
            message: format!("Host panicked: {info}"),
            code: ErrorCode::UncaughtException,
        });
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging_with_config(LogConfig::host(&args.log_level, args.log_file.clone()))?;
    install_panic_hook();

    info!("splitmux-host starting");

    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<HostMessage>();

    // Writer task: sole owner of stdout while the host runs
    let writer = tokio::spawn(async move {
        let mut sink = FramedWrite::new(tokio::io::stdout(), HostCodec::new());
        while let Some(msg) = outgoing_rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                error!(error = %e, "stdout write failed, bridge is gone");
                break;
            }
        }
    });

    let mut supervisor = ShellSupervisor::new(ShellPolicy::native(), outgoing_tx.clone());

    // The bridge holds its first spawn until it sees this
    let _ = outgoing_tx.send(HostMessage::Ready {});

    let mut incoming = FramedRead::new(tokio::io::stdin(), HostCodec::new());
    while let Some(result) = incoming.next().await {
        match result {
            Ok(msg) => dispatch(&mut supervisor, msg),
            Err(e) => {
                // Malformed lines are skipped inside the codec; an error
                // here means the pipe itself failed
                error!(error = %e, "stdin read failed");
                break;
            }
        }
    }

    info!("stdin closed, shutting down");
    supervisor.kill();
    // The writer drains until every sender clone is gone: ours, the
    // supervisor's, and the reader/exit tasks that end once the shell dies
    drop(supervisor);
    drop(outgoing_tx);

    if let Err(e) = writer.await {
        warn!(error = %e, "Writer task failed");
        emit_raw(&HostMessage::Error {
            message: format!("Writer task failed: {e}"),
            code: ErrorCode::UnhandledRejection,
        });
    }

    Ok(())
}

fn dispatch(supervisor: &mut ShellSupervisor, msg: BridgeMessage) {
    match msg {
        BridgeMessage::SetBoundary { path } => supervisor.set_boundary(path),
        BridgeMessage::Spawn(options) => supervisor.spawn(options),
        BridgeMessage::Write(data) => supervisor.write(&data),
        BridgeMessage::Resize { cols, rows } => {
            debug!(cols, rows, "Resize");
            supervisor.resize(cols, rows);
        }
        BridgeMessage::Kill {} => supervisor.kill(),
    }
}
