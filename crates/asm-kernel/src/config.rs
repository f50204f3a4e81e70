//! Kernel configuration.
//!
//! The supervisor decides the kernel's deadlines and passes them through the
//! spawn parameters, so a kernel normally builds its config with
//! [`KernelConfig::from_params`].

use std::time::Duration;

use asm_hal::{keys, SpawnParams};
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Deadlines applied by a kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Bound on every blocking parameter RPC
    pub rpc_timeout_ms: u64,
    /// Bound on waiting to be scheduled; `None` waits until shutdown
    pub activation_timeout_ms: Option<u64>,
}

impl KernelConfig {
    /// Default blocking RPC deadline (10 seconds)
    pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn activation_timeout(&self) -> Option<Duration> {
        self.activation_timeout_ms.map(Duration::from_millis)
    }

    /// Read deadlines from spawn parameters, falling back to defaults.
    pub fn from_params(params: &SpawnParams) -> Result<Self, KernelError> {
        let mut config = Self::default();
        if let Some(raw) = params.get(keys::RPC_TIMEOUT_MS) {
            config.rpc_timeout_ms = parse_millis(keys::RPC_TIMEOUT_MS, raw)?;
        }
        if let Some(raw) = params.get(keys::ACTIVATION_TIMEOUT_MS) {
            config.activation_timeout_ms = Some(parse_millis(keys::ACTIVATION_TIMEOUT_MS, raw)?);
        }
        Ok(config)
    }

    /// Write these deadlines into spawn parameters.
    pub fn write_params(&self, params: &mut SpawnParams) {
        params.insert(keys::RPC_TIMEOUT_MS, self.rpc_timeout_ms.to_string());
        if let Some(ms) = self.activation_timeout_ms {
            params.insert(keys::ACTIVATION_TIMEOUT_MS, ms.to_string());
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: Self::DEFAULT_RPC_TIMEOUT_MS,
            activation_timeout_ms: None,
        }
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, KernelError> {
    raw.parse::<u64>().map_err(|e| KernelError::InvalidSpawnParam {
        key: key.to_string(),
        reason: format!("`{}` is not a millisecond count: {}", raw, e),
    })
}
