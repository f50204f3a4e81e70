//! Shared fixtures: thread-hosted kernels on an in-memory bus.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asm_hal::ThreadSpawner;
use asm_ipc::{Bus, LocalBus};
use asm_kernel::{KernelContext, KernelError, Workload};
use asm_supervisor::{Layer, ParameterStore, State, SupervisorConfig};

pub const LAYER: &str = "test-layer";

/// Short deadlines so failure paths finish quickly.
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        ack_timeout_ms: 1_000,
        yield_timeout_ms: 2_000,
        republish_interval_ms: 10,
        liveness_poll_ms: 20,
        rpc_timeout_ms: 1_000,
    }
}

pub struct Harness {
    pub bus: LocalBus,
    pub spawner: Arc<ThreadSpawner>,
    pub store: Arc<ParameterStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            bus: LocalBus::new(),
            spawner: Arc::new(ThreadSpawner::with_grace(Duration::from_millis(500))),
            store: Arc::new(ParameterStore::new()),
        }
    }

    pub fn bus(&self) -> Arc<dyn Bus> {
        Arc::new(self.bus.clone())
    }

    /// Host a kernel running a fresh workload from `make` at `path`.
    pub fn register<W, F>(&self, path: &str, make: F)
    where
        W: Workload,
        F: Fn() -> W + Send + Sync + 'static,
    {
        self.spawner
            .register(path, asm_kernel::thread_entry(self.bus(), make));
    }

    /// Host a kernel whose workload only counts its cycles.
    pub fn register_counter(&self, path: &str) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        self.register(path, move || {
            let seen = Arc::clone(&seen);
            move |_ctx: &KernelContext| -> Result<(), KernelError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        count
    }

    pub fn state(&self, name: &str, path: &str, config: SupervisorConfig) -> State {
        State::new(
            LAYER,
            name,
            path,
            self.bus(),
            self.spawner.clone(),
            self.store.clone(),
            config,
        )
    }

    pub fn layer(&self, initial: &str) -> Layer {
        let mut layer = Layer::new(LAYER, initial, self.bus(), self.spawner.clone(), fast_config());
        layer.set_delegate(self.store.clone());
        layer
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.bus.close();
    }
}
