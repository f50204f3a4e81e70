//! One-way cancellation token.
//!
//! The signal is a channel that never carries a value; triggering it drops the
//! only sender, which disconnects every receiver at once. Waiters can
//! therefore block on [`ShutdownSignal::receiver`] inside
//! `crossbeam_channel::select!` next to their real work queue.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

/// Cloneable shutdown token; every clone observes the same trigger.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.trigger.lock().take();
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (disconnected) once triggered.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Block until triggered or `timeout` elapses; returns whether triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Block until triggered.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
