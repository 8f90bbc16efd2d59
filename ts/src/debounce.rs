//! Debounced background writer.
//!
//! Every state-changing operation calls `signal()`, which is cheap and
//! non-blocking; a single background task coalesces bursts by sleeping
//! `interval` after the first signal before invoking `flush`. Used by the
//! Drake task-file writer, the plan store, the shared planning context, and
//! the configuration service — anywhere the source-of-truth write is
//! comparatively expensive (markdown render, full JSON serialize) and
//! arrives in bursts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type FlushFn = Box<dyn Fn() -> Pin<Box<dyn Future<Output = eyre::Result<()>> + Send>> + Send + Sync>;

/// A handle to a running debounced writer. Dropping it does not stop the
/// background task; call [`DebouncedWriter::shutdown`] to flush and join.
pub struct DebouncedWriter {
    notify: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl DebouncedWriter {
    /// Spawn the background task. `flush` is called at most once per
    /// `interval` even under continuous signalling.
    pub fn spawn(interval: Duration, flush: FlushFn) -> Self {
        let notify = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task_notify = notify.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_notify.notified() => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            if let Err(e) = flush().await {
                                warn!(error = %e, "final debounced flush failed");
                            }
                            return;
                        }
                    }
                }
                tokio::time::sleep(interval).await;
                // Drain any additional signals queued during the sleep.
                while task_notify.notified().now_or_never().is_some() {}
                if let Err(e) = flush().await {
                    warn!(error = %e, "debounced flush failed, in-memory state preserved for retry");
                } else {
                    debug!("debounced flush completed");
                }
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        });

        Self { notify, shutdown_tx, handle: Some(handle) }
    }

    /// Mark a pending write. Coalesced with any write already pending.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Signal a final flush and wait for the background task to complete it.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        self.notify.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

use futures::FutureExt;
