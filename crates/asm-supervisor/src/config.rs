//! Supervisor configuration.
//!
//! Every handshake wait is bounded. The defaults suit thread-hosted kernels
//! and local processes; deployments override them from a JSON document where
//! any omitted field keeps its default:
//!
//! ```json
//! { "ack_timeout_ms": 2000, "yield_timeout_ms": 30000 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use asm_hal::{keys, SpawnParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure loading a [`SupervisorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Deadlines and polling intervals of a State.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Bound on waiting for `ScheduleResponse`
    pub ack_timeout_ms: u64,
    /// Bound on waiting for `Yield` (one full workload cycle)
    pub yield_timeout_ms: u64,
    /// How often an unacknowledged `ScheduleRequest` is re-published
    pub republish_interval_ms: u64,
    /// How often the child is checked for liveness while waiting
    pub liveness_poll_ms: u64,
    /// RPC deadline handed to spawned kernels
    pub rpc_timeout_ms: u64,
}

impl SupervisorConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn yield_timeout(&self) -> Duration {
        Duration::from_millis(self.yield_timeout_ms)
    }

    pub fn republish_interval(&self) -> Duration {
        Duration::from_millis(self.republish_interval_ms.max(1))
    }

    pub fn liveness_poll(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms.max(1))
    }

    /// Write the kernel-facing settings into spawn parameters.
    pub fn write_params(&self, params: &mut SpawnParams) {
        params.insert(keys::RPC_TIMEOUT_MS, self.rpc_timeout_ms.to_string());
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5_000,
            yield_timeout_ms: 60_000,
            republish_interval_ms: 50,
            liveness_poll_ms: 100,
            rpc_timeout_ms: 10_000,
        }
    }
}
