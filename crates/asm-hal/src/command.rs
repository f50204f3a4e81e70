//! OS process spawner.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::params::SpawnParams;
use crate::{ChildProcess, HalError, ProcessSpawner};

/// Spawns executables as OS child processes.
///
/// Spawn parameters are passed as `--key=value` arguments (see
/// [`SpawnParams::to_args`]). Standard input is closed; output streams are
/// inherited unless [`CommandSpawner::quiet`] is set.
#[derive(Clone, Debug, Default)]
pub struct CommandSpawner {
    extra_args: Vec<String>,
    quiet: bool,
}

impl CommandSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fixed argument to every spawned command (before the params).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Discard the children's stdout/stderr.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn(
        &self,
        exec_path: &Path,
        params: &SpawnParams,
    ) -> Result<Box<dyn ChildProcess>, HalError> {
        let mut command = Command::new(exec_path);
        command
            .args(&self.extra_args)
            .args(params.to_args())
            .stdin(Stdio::null());
        if self.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HalError::NotFound(exec_path.to_path_buf())
            } else {
                HalError::SpawnFailed {
                    path: exec_path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        })?;

        info!(path = %exec_path.display(), pid = child.id(), "spawned child process");
        Ok(Box::new(CommandProcess {
            path: exec_path.to_path_buf(),
            child: Some(child),
        }))
    }
}

/// An OS child process; killed and reaped on terminate.
#[derive(Debug)]
pub struct CommandProcess {
    path: PathBuf,
    child: Option<Child>,
}

impl ChildProcess for CommandProcess {
    fn id(&self) -> u64 {
        self.child.as_ref().map(|c| u64::from(c.id())).unwrap_or(0)
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn terminate(&mut self) -> Result<(), HalError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let id = u64::from(child.id());

        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = id, %status, "child already exited");
            return Ok(());
        }
        if let Err(e) = child.kill() {
            // Lost the race with a natural exit; wait() below still reaps it.
            warn!(pid = id, error = %e, "kill failed");
        }
        let status = child.wait().map_err(|e| HalError::TerminateFailed {
            id,
            reason: e.to_string(),
        })?;
        info!(path = %self.path.display(), pid = id, %status, "terminated child process");
        Ok(())
    }
}

impl Drop for CommandProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(error = %e, "terminate on drop failed");
        }
    }
}
