//! In-process spawner.
//!
//! Kernels are registered under a path and run on named threads when a State
//! spawns that path. Each thread gets its own [`ShutdownSignal`]; terminating
//! the "process" triggers the signal and waits a grace period for the entry to
//! return.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::params::SpawnParams;
use crate::shutdown::ShutdownSignal;
use crate::{ChildProcess, HalError, ProcessSpawner};

/// Entry point of a thread-hosted kernel.
pub type KernelEntry = Arc<dyn Fn(SpawnParams, ShutdownSignal) + Send + Sync>;

/// Runs registered entries on threads instead of OS processes.
pub struct ThreadSpawner {
    entries: RwLock<HashMap<PathBuf, KernelEntry>>,
    next_id: AtomicU64,
    grace: Duration,
}

impl ThreadSpawner {
    /// Default time a terminated thread gets to observe its shutdown signal
    const DEFAULT_GRACE: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self::with_grace(Self::DEFAULT_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            grace,
        }
    }

    /// Register `entry` to run whenever `path` is spawned.
    pub fn register<F>(&self, path: impl Into<PathBuf>, entry: F)
    where
        F: Fn(SpawnParams, ShutdownSignal) + Send + Sync + 'static,
    {
        self.entries.write().insert(path.into(), Arc::new(entry));
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSpawner for ThreadSpawner {
    fn spawn(
        &self,
        exec_path: &Path,
        params: &SpawnParams,
    ) -> Result<Box<dyn ChildProcess>, HalError> {
        let entry = self
            .entries
            .read()
            .get(exec_path)
            .cloned()
            .ok_or_else(|| HalError::NotFound(exec_path.to_path_buf()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shutdown = ShutdownSignal::new();
        let (done_tx, done_rx) = bounded::<()>(0);
        let thread_shutdown = shutdown.clone();
        let thread_params = params.clone();

        let handle = thread::Builder::new()
            .name(format!("asm-kernel:{}", exec_path.display()))
            .spawn(move || {
                // Dropped when the entry returns or unwinds.
                let _done: Sender<()> = done_tx;
                entry(thread_params, thread_shutdown);
            })
            .map_err(|e| HalError::SpawnFailed {
                path: exec_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!(path = %exec_path.display(), id, "spawned kernel thread");
        Ok(Box::new(ThreadProcess {
            id,
            handle: Some(handle),
            done: done_rx,
            shutdown,
            grace: self.grace,
        }))
    }
}

/// A thread-hosted kernel.
pub struct ThreadProcess {
    id: u64,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
    shutdown: ShutdownSignal,
    grace: Duration,
}

impl ThreadProcess {
    fn finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl ChildProcess for ThreadProcess {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_alive(&mut self) -> bool {
        self.handle.is_some() && !self.finished()
    }

    fn terminate(&mut self) -> Result<(), HalError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.shutdown.trigger();

        match self.done.recv_timeout(self.grace) {
            Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!(id = self.id, "kernel thread panicked");
                }
                debug!(id = self.id, "kernel thread joined");
                Ok(())
            }
            _ => {
                warn!(
                    id = self.id,
                    grace_ms = self.grace.as_millis() as u64,
                    "kernel thread ignored shutdown, detaching"
                );
                Err(HalError::TerminateFailed {
                    id: self.id,
                    reason: "thread did not stop within grace period".to_string(),
                })
            }
        }
    }
}

impl Drop for ThreadProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(error = %e, "terminate on drop failed");
        }
    }
}
