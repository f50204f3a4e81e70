//! Kernel side of the ASM orchestrator
//!
//! A kernel runs inside the child process owned by a State. It executes the
//! user's [`Workload`] once per schedule cycle and offers parameter RPC to the
//! supervisor through a [`ParameterClient`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use asm_hal::ShutdownSignal;
//! use asm_ipc::{ParamKind, Parameter};
//! use asm_kernel::{Kernel, KernelContext, KernelError};
//!
//! let mut kernel = Kernel::from_args(bus)?;
//! let mut ticks = 0;
//! kernel.run(
//!     &mut |ctx: &KernelContext| -> Result<(), KernelError> {
//!         ticks += 1;
//!         let p = Parameter::with_value("ticks", ParamKind::Int, ticks)?;
//!         ctx.params().set_parameter(&p)
//!     },
//!     &ShutdownSignal::new(),
//! )?;
//! ```

mod client;
mod config;
mod error;
mod kernel;
mod pending;

use std::sync::Arc;

use asm_hal::{ShutdownSignal, SpawnParams};
use asm_ipc::Bus;
use tracing::error;

pub use client::ParameterClient;
pub use config::KernelConfig;
pub use error::KernelError;
pub use kernel::{Kernel, KernelContext, Workload};

/// Adapt a workload factory into an entry point for a thread-hosted kernel.
///
/// Each spawn builds a fresh workload with `make`, constructs the kernel from
/// the spawn parameters and runs it until the thread's shutdown signal fires.
/// Failures are logged, since a spawned entry has no caller to return to.
pub fn thread_entry<W, F>(
    bus: Arc<dyn Bus>,
    make: F,
) -> impl Fn(SpawnParams, ShutdownSignal) + Send + Sync + 'static
where
    W: Workload,
    F: Fn() -> W + Send + Sync + 'static,
{
    move |params: SpawnParams, shutdown: ShutdownSignal| {
        let mut kernel = match Kernel::from_params(Arc::clone(&bus), &params) {
            Ok(kernel) => kernel,
            Err(e) => {
                error!(error = %e, "cannot start kernel");
                return;
            }
        };
        let mut workload = make();
        if let Err(e) = kernel.run(&mut workload, &shutdown) {
            error!(layer = %kernel.layer(), kernel = %kernel.name(), error = %e, "kernel stopped");
        }
    }
}
