//! Trailing-edge resize debouncing
//!
//! A continuous resize drag produces a storm of geometry updates; forwarding
//! each one floods the host with resize messages. The debouncer coalesces a
//! burst into its final value before handing it to the bridge's wire queue.

use std::time::Duration;

use splitmux_protocol::BridgeMessage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Default quiet window before a resize is forwarded
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(80);

/// Per-session debouncer feeding the bridge's outgoing message queue
#[derive(Debug)]
pub struct ResizeDebouncer {
    tx: watch::Sender<(u16, u16)>,
    task: JoinHandle<()>,
}

impl ResizeDebouncer {
    /// Spawn the debounce task writing into `sink`
    pub fn new(delay: Duration, sink: mpsc::UnboundedSender<BridgeMessage>) -> Self {
        let (tx, mut rx) = watch::channel((0u16, 0u16));

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                // Keep restarting the quiet window until the drag pauses
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let (cols, rows) = *rx.borrow_and_update();
                            if cols > 0 && rows > 0 {
                                let _ = sink.send(BridgeMessage::Resize { cols, rows });
                            }
                            break;
                        }
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self { tx, task }
    }

    /// Record the latest geometry; only the trailing value is forwarded
    pub fn submit(&self, cols: u16, rows: u16) {
        let _ = self.tx.send((cols, rows));
    }
}

impl Drop for ResizeDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_trailing_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = ResizeDebouncer::new(RESIZE_DEBOUNCE, tx);

        debouncer.submit(90, 30);
        debouncer.submit(100, 32);
        debouncer.submit(120, 40);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, BridgeMessage::Resize { cols: 120, rows: 40 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_bursts_both_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = ResizeDebouncer::new(RESIZE_DEBOUNCE, tx);

        debouncer.submit(80, 24);
        let first = rx.recv().await.unwrap();
        assert_eq!(first, BridgeMessage::Resize { cols: 80, rows: 24 });

        tokio::time::sleep(Duration::from_millis(500)).await;

        debouncer.submit(132, 43);
        let second = rx.recv().await.unwrap();
        assert_eq!(second, BridgeMessage::Resize { cols: 132, rows: 43 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_geometry_never_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = ResizeDebouncer::new(RESIZE_DEBOUNCE, tx);

        debouncer.submit(0, 0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }
}
