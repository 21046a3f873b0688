//! Background work owned by an engine.
//!
//! Retry passes triggered by reconnects run as spawned tasks. They are
//! tracked here so `shutdown` can cancel them, and so backoff sleeps end
//! early instead of holding the engine alive.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct RetryTasks {
    runtime: Option<Handle>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RetryTasks {
    /// Binds to the runtime the engine is created on, if any. Without a
    /// runtime nothing is spawned and retries only run when called directly.
    pub(crate) fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            runtime: Handle::try_current().ok(),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns `fut`, cancelled on shutdown. Returns false if it was not
    /// spawned.
    pub(crate) fn spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            return false;
        }
        let Some(runtime) = &self.runtime else {
            debug!("No runtime bound; background retry skipped");
            return false;
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        true
    }

    /// Sleeps for `delay`. Returns false if shutdown interrupted the sleep.
    pub(crate) async fn sleep(&self, delay: Duration) -> bool {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = shutdown_rx.changed() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for RetryTasks {
    fn drop(&mut self) {
        self.shutdown();
    }
}
