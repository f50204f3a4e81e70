//! Kernel-side error types.

use asm_ipc::{BusError, ParamError, Status};
use thiserror::Error;

/// Errors surfaced to code running inside a kernel process.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum KernelError {
    /// The supervisor answered a parameter RPC with a non-OK status
    #[error("parameter `{name}` request rejected with {status}")]
    Rejected { name: String, status: Status },

    /// A bounded wait elapsed
    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// A set request was issued for a parameter without a value
    #[error("parameter `{0}` has no value to set")]
    MissingValue(String),

    /// The response was well-formed on the wire but violates the protocol
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A required spawn parameter is absent or malformed
    #[error("invalid spawn parameter `{key}`: {reason}")]
    InvalidSpawnParam { key: String, reason: String },

    /// User workload reported a failure
    #[error("workload failed: {0}")]
    Workload(String),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl KernelError {
    /// Build a [`KernelError::Workload`] from any displayable error.
    pub fn workload(e: impl core::fmt::Display) -> Self {
        KernelError::Workload(e.to_string())
    }

    /// Status carried by a rejected RPC, if this is one.
    pub fn status(&self) -> Option<Status> {
        match self {
            KernelError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
