//! Kernel run loop
//!
//! Runs inside the child process and hosts the user workload, gated by the
//! schedule handshake with the paired State:
//!
//! ```text
//!   State                          Kernel
//!     │  ScheduleRequest(cycle)      │
//!     │─────────────────────────────▶│  await activation
//!     │  ScheduleResponse(OK, echo)  │
//!     │◀─────────────────────────────│  acknowledged = true
//!     │                              │  workload()
//!     │  Yield(cycle)                │
//!     │◀─────────────────────────────│  acknowledged = false
//! ```
//!
//! The State re-publishes `ScheduleRequest` until it is acknowledged, so the
//! kernel ignores any request whose cycle it has already served.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use asm_hal::{keys, ShutdownSignal, SpawnParams};
use asm_ipc::{
    handler, Bus, ChannelId, Message, MessageKind, ScheduleRequest, ScheduleResponse, Status, Yield,
};
use crossbeam_channel::{select, unbounded, Receiver};
use tracing::{debug, error, info, trace};

use crate::client::ParameterClient;
use crate::config::KernelConfig;
use crate::error::KernelError;

/// User code hosted by a kernel.
///
/// # Lifecycle
///
/// 1. **init()**: called exactly once, before the first activation
/// 2. **workload()**: called exactly once per schedule cycle
///
/// Both run on the kernel's thread; parameter RPCs issued from them go through
/// [`KernelContext::params`].
pub trait Workload {
    fn init(&mut self, _ctx: &KernelContext) -> Result<(), KernelError> {
        Ok(())
    }

    fn workload(&mut self, ctx: &KernelContext) -> Result<(), KernelError>;
}

impl<F> Workload for F
where
    F: FnMut(&KernelContext) -> Result<(), KernelError>,
{
    fn workload(&mut self, ctx: &KernelContext) -> Result<(), KernelError> {
        self(ctx)
    }
}

/// Execution context handed to the workload.
#[derive(Clone)]
pub struct KernelContext {
    layer: String,
    name: String,
    cycle: u64,
    params: ParameterClient,
    shutdown: ShutdownSignal,
}

impl KernelContext {
    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cycle currently being served (0 during `init`).
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn params(&self) -> &ParameterClient {
        &self.params
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }
}

/// Child-side half of a State/Kernel pair.
pub struct Kernel {
    layer: String,
    name: String,
    bus: Arc<dyn Bus>,
    downlink: ChannelId,
    uplink: ChannelId,
    config: KernelConfig,
    client: ParameterClient,
    acknowledged: Arc<AtomicBool>,
}

impl Kernel {
    pub fn new(
        bus: Arc<dyn Bus>,
        layer: impl Into<String>,
        name: impl Into<String>,
        config: KernelConfig,
    ) -> Self {
        let layer = layer.into();
        let name = name.into();
        let downlink = ChannelId::downlink(&layer, &name);
        let uplink = ChannelId::uplink(&layer, &name);
        let client = ParameterClient::new(Arc::clone(&bus), uplink.clone(), config.rpc_timeout());
        Self {
            layer,
            name,
            bus,
            downlink,
            uplink,
            config,
            client,
            acknowledged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a kernel from the parameters its State spawned it with.
    pub fn from_params(bus: Arc<dyn Bus>, params: &SpawnParams) -> Result<Self, KernelError> {
        let layer = required(params, keys::LAYER)?;
        let name = required(params, keys::NAME)?;
        let config = KernelConfig::from_params(params)?;
        Ok(Self::new(bus, layer, name, config))
    }

    /// Build a kernel from this process's `--key=value` arguments.
    pub fn from_args(bus: Arc<dyn Bus>) -> Result<Self, KernelError> {
        Self::from_params(bus, &SpawnParams::from_args(std::env::args().skip(1)))
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Parameter RPC handle (usable from other threads of this process).
    pub fn params(&self) -> &ParameterClient {
        &self.client
    }

    /// Whether the kernel currently holds execution (between ack and yield).
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// Run the handshake loop until shutdown.
    ///
    /// # Invariants
    ///
    /// - `init()` is called exactly once, before any activation
    /// - `workload()` is called exactly once per acknowledged cycle
    /// - Every acknowledged cycle ends with a `Yield`, even if the workload fails
    ///
    /// # Returns
    ///
    /// - `Ok(())` when `shutdown` fires while waiting for activation
    /// - `Err(Timeout)` if an activation deadline is configured and elapses
    /// - `Err(e)` if `init()` or `workload()` fails, after yielding
    pub fn run<W: Workload + ?Sized>(
        &mut self,
        workload: &mut W,
        shutdown: &ShutdownSignal,
    ) -> Result<(), KernelError> {
        let activations = self.install_handlers()?;
        let mut ctx = KernelContext {
            layer: self.layer.clone(),
            name: self.name.clone(),
            cycle: 0,
            params: self.client.clone(),
            shutdown: shutdown.clone(),
        };

        if let Err(e) = workload.init(&ctx) {
            error!(layer = %self.layer, kernel = %self.name, error = %e, "kernel init failed");
            return Err(e);
        }
        info!(layer = %self.layer, kernel = %self.name, "kernel ready");

        let mut last_cycle = 0;
        loop {
            let request = match self.await_activation(&activations, shutdown, last_cycle)? {
                Some(request) => request,
                None => {
                    info!(layer = %self.layer, kernel = %self.name, "kernel shutting down");
                    return Ok(());
                }
            };
            let cycle = request.cycle;
            last_cycle = cycle;

            self.acknowledged.store(true, Ordering::SeqCst);
            self.bus.publish(
                &self.uplink,
                Message::ScheduleResponse(ScheduleResponse {
                    status: Status::Ok,
                    request,
                }),
            )?;
            debug!(kernel = %self.name, cycle, "activated");

            ctx.cycle = cycle;
            let outcome = workload.workload(&ctx);

            self.acknowledged.store(false, Ordering::SeqCst);
            self.bus.publish(&self.uplink, Message::Yield(Yield { cycle }))?;
            debug!(kernel = %self.name, cycle, "yielded");

            if let Err(e) = outcome {
                error!(layer = %self.layer, kernel = %self.name, cycle, error = %e, "workload failed");
                return Err(e);
            }
        }
    }

    fn install_handlers(&self) -> Result<Receiver<ScheduleRequest>, KernelError> {
        let (tx, rx) = unbounded();
        self.bus.install_callback(
            &self.downlink,
            MessageKind::ScheduleRequest,
            handler(move |msg| {
                if let Message::ScheduleRequest(request) = msg {
                    let _ = tx.send(request);
                }
            }),
        )?;
        self.client.install(&self.downlink)?;
        Ok(rx)
    }

    /// Block until a fresh `ScheduleRequest` arrives.
    ///
    /// Returns `None` on shutdown.
    fn await_activation(
        &self,
        activations: &Receiver<ScheduleRequest>,
        shutdown: &ShutdownSignal,
        last_cycle: u64,
    ) -> Result<Option<ScheduleRequest>, KernelError> {
        let started = Instant::now();
        let deadline = match self.config.activation_timeout() {
            Some(timeout) => crossbeam_channel::at(started + timeout),
            None => crossbeam_channel::never(),
        };

        loop {
            select! {
                recv(activations) -> msg => match msg {
                    Ok(request) if request.cycle <= last_cycle => {
                        trace!(kernel = %self.name, cycle = request.cycle, "stale schedule request ignored");
                    }
                    Ok(request) => return Ok(Some(request)),
                    Err(_) => return Err(asm_ipc::BusError::Closed.into()),
                },
                recv(shutdown.receiver()) -> _ => return Ok(None),
                recv(deadline) -> _ => {
                    return Err(KernelError::Timeout {
                        what: "activation".to_string(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
        }
    }
}

fn required(params: &SpawnParams, key: &str) -> Result<String, KernelError> {
    params
        .get(key)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| KernelError::InvalidSpawnParam {
            key: key.to_string(),
            reason: "missing".to_string(),
        })
}
