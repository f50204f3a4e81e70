//! ASM demo
//!
//! Runs a two-state layer whose kernels are hosted on threads:
//!
//! - **sense**: raises `reading` by one each cycle and sets `alarm` once it
//!   reaches `threshold`
//! - **act**: clears `alarm` and resets `reading`
//!
//! The layer moves `sense → act` while `alarm` holds and back afterwards.
//!
//! Usage: `asm-demo [config.json]`. Set `ASM_CYCLES` to change how many cycles
//! run and `RUST_LOG` to control log output.

use std::error::Error;
use std::sync::Arc;

use asm_hal::ThreadSpawner;
use asm_ipc::{Bus, LocalBus, ParamKind, Parameter};
use asm_kernel::{thread_entry, KernelContext, KernelError};
use asm_supervisor::{Condition, Layer, ParameterStore, SupervisorConfig, Transition};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LAYER: &str = "demo";
const SENSE: &str = "/demo/sense";
const ACT: &str = "/demo/act";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        error!(error = %e, "demo failed");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => SupervisorConfig::from_file(path)?,
        None => SupervisorConfig::default(),
    };
    let cycles: u32 = std::env::var("ASM_CYCLES")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(12);

    let bus = LocalBus::new();
    let shared: Arc<dyn Bus> = Arc::new(bus.clone());

    let spawner = Arc::new(ThreadSpawner::new());
    spawner.register(SENSE, thread_entry(Arc::clone(&shared), || sense));
    spawner.register(ACT, thread_entry(Arc::clone(&shared), || act));

    let store = Arc::new(
        ParameterStore::new()
            .with("reading", 0)
            .with("threshold", 3)
            .with("alarm", false),
    );

    let mut layer = Layer::new(LAYER, "sense", shared, spawner, config);
    layer.set_delegate(store.clone());
    layer.add_state("sense", SENSE)?;
    layer.add_state("act", ACT)?;
    layer.add_transition(Transition::new(
        "raise",
        "sense",
        "act",
        10,
        Condition::param_true("alarm"),
    ))?;
    layer.add_transition(Transition::new("watch", "sense", "sense", 0, Condition::Always))?;
    layer.add_transition(Transition::new("recover", "act", "sense", 0, Condition::Always))?;
    layer.validate()?;

    println!("╔═══════════════════════════════════════════════════╗");
    println!("║                    ASM Demo                       ║");
    println!("╠═══════════════════════════════════════════════════╣");
    println!("║  Layer: {:<42}║", LAYER);
    println!("║  Cycles: {:<41}║", cycles);
    println!("╚═══════════════════════════════════════════════════╝");

    for cycle in 1..=cycles {
        let from = layer.current_state().to_string();
        let to = layer.step()?;
        println!("  {:>3}  {:<6} -> {}", cycle, from, to);
    }

    for (name, value) in store.snapshot() {
        info!(name = %name, value = %value, "final parameter");
    }
    layer.shutdown()?;
    drop(layer);
    bus.close();
    Ok(())
}

fn sense(ctx: &KernelContext) -> Result<(), KernelError> {
    let params = ctx.params();
    let reading = read_int(ctx, "reading")? + 1;
    params.set_parameter(&Parameter::with_value("reading", ParamKind::Int, reading)?)?;

    let threshold = read_int(ctx, "threshold")?;
    if reading >= threshold {
        params.set_parameter(&Parameter::with_value("alarm", ParamKind::Bool, true)?)?;
    }
    info!(cycle = ctx.cycle(), reading, "sensed");
    Ok(())
}

fn act(ctx: &KernelContext) -> Result<(), KernelError> {
    let params = ctx.params();
    params.set_parameter(&Parameter::with_value("alarm", ParamKind::Bool, false)?)?;
    params.set_parameter(&Parameter::with_value("reading", ParamKind::Int, 0)?)?;
    info!(cycle = ctx.cycle(), "alarm handled");
    Ok(())
}

fn read_int(ctx: &KernelContext, name: &str) -> Result<i64, KernelError> {
    let value = ctx.params().get_parameter(&Parameter::new(name, ParamKind::Int))?;
    value
        .as_int()
        .ok_or_else(|| KernelError::Protocol(format!("`{}` is not an int", name)))
}
