//! Supervisor error types.
//!
//! Errors fall into the classes a supervisor reacts to differently:
//!
//! - **Configuration** (`LayerError::StateExists`, `StateNotFound`, missing
//!   delegate, ...): raised at the call site, never retried
//! - **Scheduling** (`LayerError::NoTransition`, `NoMatchingTransition`):
//!   fatal to the run loop
//! - **Liveness** (`StateError::Timeout`, `StateError::ProcessExited`): the
//!   child stopped taking part in the handshake

use core::fmt;

use asm_hal::HalError;
use asm_ipc::{BusError, ParamKind, Status};
use thiserror::Error;

/// Failures reported by a [`ParameterDelegate`](crate::ParameterDelegate).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DelegateError {
    /// The name is unknown to the delegate
    #[error("no such parameter `{0}`")]
    NoSuchParameter(String),

    /// The value's kind differs from the parameter's declared kind
    #[error("parameter `{name}` is {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ParamKind,
        found: ParamKind,
    },

    /// No delegate has been wired yet
    #[error("no parameter delegate configured")]
    Unconfigured,

    #[error("{0}")]
    Other(String),
}

impl DelegateError {
    /// Wire status a State answers with when the delegate fails this way.
    pub fn status(&self) -> Status {
        match self {
            DelegateError::NoSuchParameter(_) => Status::NoParam,
            DelegateError::TypeMismatch { .. } => Status::BadType,
            DelegateError::Unconfigured | DelegateError::Other(_) => Status::Err,
        }
    }
}

/// Handshake phase a State was waiting in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitPhase {
    /// Waiting for `ScheduleResponse`
    Acknowledge,
    /// Waiting for `Yield`
    Yield,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::Acknowledge => f.write_str("acknowledge"),
            WaitPhase::Yield => f.write_str("yield"),
        }
    }
}

/// Errors from driving one State.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum StateError {
    #[error("state `{state}` timed out after {waited_ms}ms waiting for {phase}")]
    Timeout {
        state: String,
        phase: WaitPhase,
        waited_ms: u64,
    },

    #[error("child process of state `{state}` exited while waiting for {phase}")]
    ProcessExited { state: String, phase: WaitPhase },

    /// The kernel acknowledged with a non-OK status
    #[error("state `{state}` schedule rejected with {status}")]
    Rejected { state: String, status: Status },

    #[error(transparent)]
    Spawn(#[from] HalError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Errors from building or running a Layer.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LayerError {
    #[error("state `{0}` already exists")]
    StateExists(String),

    #[error("state `{0}` not found")]
    StateNotFound(String),

    /// A State built for another layer
    #[error("state `{state}` belongs to layer `{layer}`")]
    ForeignState { state: String, layer: String },

    #[error("transition `{0}` already exists")]
    TransitionExists(String),

    #[error("transition `{0}` not found")]
    TransitionNotFound(String),

    /// A transition names a state the layer does not own
    #[error("transition `{transition}` references unknown state `{state}`")]
    DanglingTransition { transition: String, state: String },

    /// No transition leaves the current state
    #[error("no transition leaves state `{0}`")]
    NoTransition(String),

    /// Transitions leave the current state but none of their conditions hold
    #[error("no transition condition holds in state `{0}`")]
    NoMatchingTransition(String),

    #[error("scheduling state `{state}` failed: {source}")]
    Schedule {
        state: String,
        #[source]
        source: StateError,
    },

    #[error("terminating state `{state}` failed: {source}")]
    Teardown {
        state: String,
        #[source]
        source: StateError,
    },

    #[error(transparent)]
    Delegate(#[from] DelegateError),
}

impl LayerError {
    /// Whether this is a scheduling failure (as opposed to configuration).
    pub fn is_scheduling(&self) -> bool {
        matches!(
            self,
            LayerError::NoTransition(_) | LayerError::NoMatchingTransition(_) | LayerError::Schedule { .. }
        )
    }
}
