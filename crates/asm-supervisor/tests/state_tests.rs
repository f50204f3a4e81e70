//! State integration tests
//!
//! Kernels run on threads via `ThreadSpawner`, talking to the State over a
//! `LocalBus`, so the full handshake and parameter RPC paths are exercised.

mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use asm_hal::{HalError, ShutdownSignal, SpawnParams};
use asm_ipc::{ParamKind, ParamValue, Parameter, Status};
use asm_kernel::{KernelContext, KernelError};
use asm_supervisor::{DelegateError, ParameterDelegate, StateError, SupervisorConfig, WaitPhase};
use crossbeam_channel::unbounded;

use common::{fast_config, Harness};

// ============================================================================
// Handshake
// ============================================================================

#[test]
fn test_schedule_runs_exactly_one_cycle() {
    let h = Harness::new();
    let count = h.register_counter("/bin/counter");
    let mut state = h.state("count", "/bin/counter", fast_config());
    assert!(!state.is_started());

    for expected in 1..=3 {
        state.schedule().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), expected);
        assert!(!state.is_acknowledged());
    }
    assert!(state.is_started());
    assert_eq!(state.cycle(), 3);
}

#[test]
fn test_schedule_unknown_exec_path() {
    let h = Harness::new();
    let mut state = h.state("lost", "/bin/missing", fast_config());

    let err = state.schedule().unwrap_err();
    assert!(matches!(err, StateError::Spawn(HalError::NotFound(_))));
    assert!(!state.is_started());
}

#[test]
fn test_never_acknowledging_kernel_times_out() {
    let h = Harness::new();
    h.spawner
        .register("/bin/mute", |_params: SpawnParams, shutdown: ShutdownSignal| shutdown.wait());
    let config = SupervisorConfig {
        ack_timeout_ms: 100,
        ..fast_config()
    };
    let mut state = h.state("mute", "/bin/mute", config);

    let started = Instant::now();
    let err = state.schedule().unwrap_err();
    assert!(matches!(
        err,
        StateError::Timeout {
            phase: WaitPhase::Acknowledge,
            ..
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!state.is_acknowledged());
}

#[test]
fn test_never_yielding_kernel_times_out() {
    let h = Harness::new();
    h.register("/bin/stuck", || {
        |ctx: &KernelContext| -> Result<(), KernelError> {
            // Released when the State terminates the kernel.
            ctx.shutdown().wait_timeout(Duration::from_secs(5));
            Ok(())
        }
    });
    let config = SupervisorConfig {
        yield_timeout_ms: 100,
        ..fast_config()
    };
    let mut state = h.state("stuck", "/bin/stuck", config);

    let err = state.schedule().unwrap_err();
    assert!(matches!(
        err,
        StateError::Timeout {
            phase: WaitPhase::Yield,
            ..
        }
    ));
    assert!(!state.is_acknowledged());
    state.terminate().unwrap();
}

#[test]
fn test_exited_kernel_is_reported() {
    let h = Harness::new();
    h.spawner
        .register("/bin/crash", |_params: SpawnParams, _shutdown: ShutdownSignal| {});
    let mut state = h.state("crash", "/bin/crash", fast_config());

    let started = Instant::now();
    let err = state.schedule().unwrap_err();
    assert_eq!(
        err,
        StateError::ProcessExited {
            state: "crash".into(),
            phase: WaitPhase::Acknowledge,
        }
    );
    // Detected by liveness polling, well before the ack deadline.
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[test]
fn test_terminate_is_idempotent_and_restartable() {
    let h = Harness::new();
    let count = h.register_counter("/bin/counter");
    let mut state = h.state("count", "/bin/counter", fast_config());

    state.schedule().unwrap();
    state.terminate().unwrap();
    state.terminate().unwrap();
    assert!(!state.is_started());

    // A fresh kernel accepts the next cycle number.
    state.schedule().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(state.cycle(), 2);
}

// ============================================================================
// Parameter RPC
// ============================================================================

#[test]
fn test_parameter_round_trip_for_every_kind() {
    let h = Harness::new();
    h.store.declare("i", 0);
    h.store.declare("f", 0.0);
    h.store.declare("s", "");
    h.store.declare("b", false);

    let cases = vec![
        ("i", ParamKind::Int, ParamValue::Int(42)),
        ("f", ParamKind::Float, ParamValue::Float(2.5)),
        ("s", ParamKind::Str, ParamValue::Str("hello world".into())),
        ("b", ParamKind::Bool, ParamValue::Bool(true)),
    ];
    let (tx, rx) = unbounded();
    let kernel_cases = cases.clone();
    h.register("/bin/params", move || {
        let tx = tx.clone();
        let cases = kernel_cases.clone();
        move |ctx: &KernelContext| -> Result<(), KernelError> {
            for (name, kind, value) in &cases {
                let p = Parameter::with_value(*name, *kind, value.clone())?;
                ctx.params().set_parameter(&p)?;
                let read = ctx.params().get_parameter(&Parameter::new(*name, *kind))?;
                let _ = tx.send((name.to_string(), read));
            }
            Ok(())
        }
    });
    let mut state = h.state("params", "/bin/params", fast_config());

    state.schedule().unwrap();
    for (name, _, value) in &cases {
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), (name.to_string(), value.clone()));
        assert_eq!(h.store.get_parameter_value(name).unwrap(), *value);
    }
    assert!(state.take_faults().is_empty());
}

#[test]
fn test_unknown_parameter_answers_no_param_and_records_fault() {
    let h = Harness::new();
    h.store.declare("known", 1);
    let (tx, rx) = unbounded();
    h.register("/bin/ghost", move || {
        let tx = tx.clone();
        move |ctx: &KernelContext| -> Result<(), KernelError> {
            let result = ctx.params().get_parameter(&Parameter::new("ghost", ParamKind::Int));
            let _ = tx.send(result.map_err(|e| e.status()));
            Ok(())
        }
    });
    let mut state = h.state("ghost", "/bin/ghost", fast_config());

    state.schedule().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Err(Some(Status::NoParam)));

    let faults = state.take_faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].parameter, "ghost");
    assert_eq!(faults[0].status, Status::NoParam);
    assert_eq!(faults[0].error, DelegateError::NoSuchParameter("ghost".into()));
    assert!(state.take_faults().is_empty());

    assert_eq!(h.store.get_all_params_name().unwrap(), vec!["known".to_string()]);
}

#[test]
fn test_kind_mismatch_answers_bad_type() {
    let h = Harness::new();
    h.store.declare("speed", 3);
    let (tx, rx) = unbounded();
    h.register("/bin/mismatch", move || {
        let tx = tx.clone();
        move |ctx: &KernelContext| -> Result<(), KernelError> {
            let get = ctx.params().get_parameter(&Parameter::new("speed", ParamKind::Float));
            let set = ctx
                .params()
                .set_parameter(&Parameter::with_value("speed", ParamKind::Bool, true)?);
            let _ = tx.send((get.map_err(|e| e.status()), set.map_err(|e| e.status())));
            Ok(())
        }
    });
    let mut state = h.state("mismatch", "/bin/mismatch", fast_config());

    state.schedule().unwrap();
    let (get, set) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(get, Err(Some(Status::BadType)));
    assert_eq!(set, Err(Some(Status::BadType)));

    // Only the refused write is a delegate failure.
    let faults = state.take_faults();
    assert_eq!(faults.len(), 1);
    assert!(matches!(faults[0].error, DelegateError::TypeMismatch { .. }));
    assert_eq!(h.store.get_parameter_value("speed").unwrap(), ParamValue::Int(3));
}

#[test]
fn test_async_requests_resolve_within_cycle() {
    let h = Harness::new();
    h.store.declare("mode", "auto");
    let (tx, rx) = unbounded();
    h.register("/bin/async", move || {
        let tx = tx.clone();
        move |ctx: &KernelContext| -> Result<(), KernelError> {
            let (done_tx, done_rx) = unbounded();
            ctx.params()
                .get_parameter_async(&Parameter::new("mode", ParamKind::Str), move |status, value| {
                    let _ = done_tx.send((status, value));
                })?;
            let reply = done_rx
                .recv_timeout(Duration::from_secs(1))
                .map_err(KernelError::workload)?;
            let _ = tx.send(reply);
            Ok(())
        }
    });
    let mut state = h.state("async", "/bin/async", fast_config());

    state.schedule().unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        (Status::Ok, Some(ParamValue::Str("auto".into())))
    );
}
