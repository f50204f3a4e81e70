//! Parent-side proxy for one child process.
//!
//! A State owns exactly one child process running a Kernel and drives the
//! schedule handshake from the supervisor side:
//!
//! ```text
//!   schedule()
//!     │
//!     ├─ start() on first call: install handlers, spawn child
//!     │
//!     ├─ Acknowledge phase: publish ScheduleRequest(cycle) every
//!     │    republish interval until ScheduleResponse(cycle) or ack timeout
//!     │
//!     └─ Yield phase: wait for Yield(cycle) or yield timeout
//! ```
//!
//! While waiting in either phase the child is polled for liveness, so a
//! crashed kernel surfaces as [`StateError::ProcessExited`] instead of a full
//! timeout.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use asm_hal::{keys, ChildProcess, ProcessSpawner, SpawnParams};
use asm_ipc::{
    handler, Bus, ChannelId, Message, MessageKind, ScheduleRequest, ScheduleResponse, Status, Yield,
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::SupervisorConfig;
use crate::delegate::ParameterDelegate;
use crate::error::{StateError, WaitPhase};
use crate::handlers::{FaultLog, ParamServer, StateFault};

/// Supervisor-side half of a State/Kernel pair.
pub struct State {
    layer: String,
    name: String,
    exec_path: PathBuf,
    bus: Arc<dyn Bus>,
    spawner: Arc<dyn ProcessSpawner>,
    delegate: Arc<dyn ParameterDelegate>,
    config: SupervisorConfig,
    downlink: ChannelId,
    uplink: ChannelId,
    process: Option<Box<dyn ChildProcess>>,
    started: bool,
    cycle: u64,
    acknowledged: Arc<AtomicBool>,
    ack_tx: Sender<ScheduleResponse>,
    ack_rx: Receiver<ScheduleResponse>,
    yield_tx: Sender<Yield>,
    yield_rx: Receiver<Yield>,
    faults: FaultLog,
}

impl State {
    /// Create a State; its child process is not spawned until the first
    /// [`schedule`](Self::schedule).
    ///
    /// # Arguments
    /// * `layer` - Name of the owning layer (part of the channel address)
    /// * `name` - State name, unique within the layer
    /// * `exec_path` - What the spawner runs for this state's kernel
    /// * `delegate` - Answers the kernel's parameter requests
    pub fn new(
        layer: impl Into<String>,
        name: impl Into<String>,
        exec_path: impl Into<PathBuf>,
        bus: Arc<dyn Bus>,
        spawner: Arc<dyn ProcessSpawner>,
        delegate: Arc<dyn ParameterDelegate>,
        config: SupervisorConfig,
    ) -> Self {
        let layer = layer.into();
        let name = name.into();
        let downlink = ChannelId::downlink(&layer, &name);
        let uplink = ChannelId::uplink(&layer, &name);
        let (ack_tx, ack_rx) = unbounded();
        let (yield_tx, yield_rx) = unbounded();
        Self {
            layer,
            name,
            exec_path: exec_path.into(),
            bus,
            spawner,
            delegate,
            config,
            downlink,
            uplink,
            process: None,
            started: false,
            cycle: 0,
            acknowledged: Arc::new(AtomicBool::new(false)),
            ack_tx,
            ack_rx,
            yield_tx,
            yield_rx,
            faults: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn exec_path(&self) -> &Path {
        &self.exec_path
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Whether the child has been spawned and not terminated since.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether the paired kernel currently holds execution.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// Number of schedule cycles issued so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Drain the delegate failures recorded while serving parameter requests.
    pub fn take_faults(&mut self) -> Vec<StateFault> {
        std::mem::take(&mut *self.faults.lock())
    }

    /// Install the uplink handlers and spawn the child process.
    ///
    /// Handlers go in first so nothing the kernel publishes on start-up is
    /// missed. Calling this on a started State is a no-op.
    pub fn start(&mut self) -> Result<(), StateError> {
        if self.started {
            return Ok(());
        }
        self.install_handlers()?;

        let mut params = SpawnParams::new()
            .with(keys::LAYER, self.layer.as_str())
            .with(keys::NAME, self.name.as_str())
            .with(keys::UPLINK, self.uplink.to_string())
            .with(keys::DOWNLINK, self.downlink.to_string());
        self.config.write_params(&mut params);

        let process = self.spawner.spawn(&self.exec_path, &params)?;
        info!(
            layer = %self.layer,
            state = %self.name,
            path = %self.exec_path.display(),
            pid = process.id(),
            "state started"
        );
        self.process = Some(process);
        self.started = true;
        Ok(())
    }

    /// Hand execution to the kernel for exactly one workload cycle.
    ///
    /// # Returns
    /// * `Ok(())` - The kernel acknowledged and yielded this cycle
    /// * `Err(StateError::Timeout)` - A handshake phase exceeded its deadline
    /// * `Err(StateError::ProcessExited)` - The child died mid-handshake
    /// * `Err(StateError::Spawn)` - The child could not be started
    pub fn schedule(&mut self) -> Result<(), StateError> {
        self.start()?;
        self.cycle += 1;
        let cycle = self.cycle;
        debug!(layer = %self.layer, state = %self.name, cycle, "scheduling");

        self.await_acknowledge(cycle)?;
        self.acknowledged.store(true, Ordering::SeqCst);
        let result = self.await_yield(cycle);
        self.acknowledged.store(false, Ordering::SeqCst);
        result?;

        debug!(layer = %self.layer, state = %self.name, cycle, "cycle complete");
        Ok(())
    }

    /// Terminate the child process. Idempotent.
    pub fn terminate(&mut self) -> Result<(), StateError> {
        self.started = false;
        self.acknowledged.store(false, Ordering::SeqCst);
        if let Some(mut process) = self.process.take() {
            process.terminate()?;
            info!(layer = %self.layer, state = %self.name, "state terminated");
        }
        Ok(())
    }

    fn install_handlers(&self) -> Result<(), StateError> {
        let acks = self.ack_tx.clone();
        self.bus.install_callback(
            &self.uplink,
            MessageKind::ScheduleResponse,
            handler(move |msg| {
                if let Message::ScheduleResponse(response) = msg {
                    let _ = acks.send(response);
                }
            }),
        )?;

        let yields = self.yield_tx.clone();
        self.bus.install_callback(
            &self.uplink,
            MessageKind::Yield,
            handler(move |msg| {
                if let Message::Yield(y) = msg {
                    let _ = yields.send(y);
                }
            }),
        )?;

        let server = ParamServer {
            state: self.name.clone(),
            bus: Arc::clone(&self.bus),
            downlink: self.downlink.clone(),
            delegate: Arc::clone(&self.delegate),
            faults: Arc::clone(&self.faults),
        };
        for kind in [MessageKind::ParamGetRequest, MessageKind::ParamSetRequest] {
            let server = server.clone();
            self.bus
                .install_callback(&self.uplink, kind, handler(move |msg| server.handle(msg)))?;
        }
        Ok(())
    }

    fn await_acknowledge(&mut self, cycle: u64) -> Result<(), StateError> {
        let started = Instant::now();
        let deadline = started + self.config.ack_timeout();
        let republish = self.config.republish_interval();
        let mut last_publish: Option<Instant> = None;
        let mut last_probe = started;

        loop {
            let now = Instant::now();
            if last_publish.map_or(true, |at| now.duration_since(at) >= republish) {
                self.bus.publish(
                    &self.downlink,
                    Message::ScheduleRequest(ScheduleRequest { cycle }),
                )?;
                trace!(state = %self.name, cycle, "schedule request published");
                last_publish = Some(now);
            }

            match self.ack_rx.recv_timeout(self.wait_slice(deadline, republish)) {
                Ok(response) if response.request.cycle != cycle => {
                    trace!(state = %self.name, cycle = response.request.cycle, "stale acknowledge ignored");
                }
                Ok(response) if response.status == Status::Ok => return Ok(()),
                Ok(response) => {
                    return Err(StateError::Rejected {
                        state: self.name.clone(),
                        status: response.status,
                    })
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
            self.check_progress(WaitPhase::Acknowledge, started, deadline, &mut last_probe)?;
        }
    }

    fn await_yield(&mut self, cycle: u64) -> Result<(), StateError> {
        let started = Instant::now();
        let deadline = started + self.config.yield_timeout();
        let mut last_probe = started;

        loop {
            match self.yield_rx.recv_timeout(self.wait_slice(deadline, self.config.liveness_poll())) {
                Ok(y) if y.cycle == cycle => return Ok(()),
                Ok(y) => trace!(state = %self.name, cycle = y.cycle, "stale yield ignored"),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
            self.check_progress(WaitPhase::Yield, started, deadline, &mut last_probe)?;
        }
    }

    /// Longest single blocking receive: the next housekeeping tick or the
    /// deadline, whichever is sooner.
    fn wait_slice(&self, deadline: Instant, tick: Duration) -> Duration {
        let tick = tick.min(self.config.liveness_poll());
        deadline.saturating_duration_since(Instant::now()).min(tick)
    }

    fn check_progress(
        &mut self,
        phase: WaitPhase,
        started: Instant,
        deadline: Instant,
        last_probe: &mut Instant,
    ) -> Result<(), StateError> {
        let now = Instant::now();
        if now.duration_since(*last_probe) >= self.config.liveness_poll() {
            *last_probe = now;
            let alive = self.process.as_mut().map_or(false, |p| p.is_alive());
            if !alive {
                warn!(layer = %self.layer, state = %self.name, %phase, "child process exited");
                return Err(StateError::ProcessExited {
                    state: self.name.clone(),
                    phase,
                });
            }
        }
        if now >= deadline {
            let waited_ms = now.duration_since(started).as_millis() as u64;
            warn!(layer = %self.layer, state = %self.name, %phase, waited_ms, "handshake timed out");
            return Err(StateError::Timeout {
                state: self.name.clone(),
                phase,
                waited_ms,
            });
        }
        Ok(())
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(layer = %self.layer, state = %self.name, error = %e, "terminate on drop failed");
        }
    }
}
