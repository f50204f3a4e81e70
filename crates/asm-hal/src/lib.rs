//! Process Abstraction Layer for the ASM orchestrator
//!
//! This crate defines the seam through which a State acquires and releases
//! its child process, so the supervisor logic runs unchanged whether kernels
//! live in real OS processes or in threads of the current process.
//!
//! # Implementations
//!
//! - **[`CommandSpawner`]**: OS processes via `std::process::Command`, with the
//!   spawn parameters rendered as `--key=value` arguments
//! - **[`ThreadSpawner`]**: registered entry functions run on named threads,
//!   used for in-process hosting and tests
//!
//! # Ownership
//!
//! A [`ChildProcess`] is owned by exactly one State. Only that owner may
//! terminate it; `terminate` is idempotent so the owner can call it from every
//! exit path.

mod command;
mod params;
mod shutdown;
mod thread;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use command::{CommandProcess, CommandSpawner};
pub use params::{keys, SpawnParams};
pub use shutdown::ShutdownSignal;
pub use thread::{KernelEntry, ThreadProcess, ThreadSpawner};

/// Process abstraction errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HalError {
    /// No executable (or registered entry) at the given path
    #[error("no executable registered at {0}")]
    NotFound(PathBuf),

    /// The platform refused to create the process
    #[error("failed to spawn {path}: {reason}")]
    SpawnFailed { path: PathBuf, reason: String },

    /// The process could not be stopped
    #[error("failed to terminate process {id}: {reason}")]
    TerminateFailed { id: u64, reason: String },
}

/// Creates child processes for States.
pub trait ProcessSpawner: Send + Sync {
    /// Start `exec_path` with `params`.
    ///
    /// # Returns
    /// * `Ok(process)` - Handle owning the new process
    /// * `Err(HalError::NotFound)` - Nothing to run at `exec_path`
    /// * `Err(HalError::SpawnFailed)` - The platform refused to start it
    fn spawn(&self, exec_path: &Path, params: &SpawnParams)
        -> Result<Box<dyn ChildProcess>, HalError>;
}

/// Handle to a spawned child process.
pub trait ChildProcess: Send {
    /// Platform identifier (OS pid, or a synthetic id for threads)
    fn id(&self) -> u64;

    /// Check if the process is still running
    fn is_alive(&mut self) -> bool;

    /// Stop the process and release its resources.
    ///
    /// Calling this on an already-terminated process succeeds.
    fn terminate(&mut self) -> Result<(), HalError>;
}
