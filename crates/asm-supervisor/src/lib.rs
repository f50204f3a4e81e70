//! Supervisor side of the ASM orchestrator
//!
//! A [`Layer`] drives a finite-state machine whose states each own one child
//! process running a Kernel. Scheduling a [`State`] hands execution to its
//! kernel for exactly one workload cycle; afterwards the layer picks the next
//! state from the guarded, priority-ordered [`Transition`]s leaving the
//! current one.
//!
//! # Architecture
//!
//! ```text
//!   Layer::run
//!     │
//!     ├─▶ State::schedule ──ScheduleRequest──▶ Kernel
//!     │         ▲ ◀──────ScheduleResponse────── │
//!     │         │ ◀──────Param RPC ───────────▶ │  answered via ParameterDelegate
//!     │         └◀─────────Yield─────────────── │
//!     │
//!     └─▶ evaluate transitions → next current state
//! ```
//!
//! Parameter requests from kernels are answered by the layer's delegate slot,
//! which forwards to an upstream [`ParameterDelegate`] such as a
//! [`ParameterStore`].

mod config;
mod delegate;
mod error;
mod handlers;
mod layer;
mod state;
mod transition;

pub use config::{ConfigError, SupervisorConfig};
pub use delegate::{DelegateSlot, ParameterDelegate, ParameterStore};
pub use error::{DelegateError, LayerError, StateError, WaitPhase};
pub use handlers::StateFault;
pub use layer::Layer;
pub use state::State;
pub use transition::{Condition, Guard, Transition};
