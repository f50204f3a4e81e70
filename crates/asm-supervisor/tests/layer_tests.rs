//! Layer integration tests
//!
//! Cover the registry, transition selection and the run loop against
//! thread-hosted kernels.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use asm_hal::{HalError, ShutdownSignal};
use asm_ipc::{ParamKind, ParamValue, Parameter};
use asm_kernel::{KernelContext, KernelError};
use asm_supervisor::{
    Condition, DelegateError, LayerError, ParameterDelegate, ParameterStore, StateError, Transition,
};

use common::Harness;

fn edge(name: &str, from: &str, to: &str, priority: i32, condition: Condition) -> Transition {
    Transition::new(name, from, to, priority, condition)
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_rejects_duplicates_and_missing_names() {
    let h = Harness::new();
    let mut layer = h.layer("a");

    layer.add_state("a", "/bin/a").unwrap();
    assert_eq!(
        layer.add_state("a", "/bin/other").err(),
        Some(LayerError::StateExists("a".into()))
    );
    assert!(matches!(layer.get_state("zzz"), Err(LayerError::StateNotFound(_))));
    assert!(matches!(layer.del_state("zzz"), Err(LayerError::StateNotFound(_))));

    layer.add_transition(edge("loop", "a", "a", 0, Condition::Always)).unwrap();
    assert_eq!(
        layer.add_transition(edge("loop", "a", "a", 9, Condition::Never)),
        Err(LayerError::TransitionExists("loop".into()))
    );
    assert_eq!(layer.get_transition("loop").unwrap().priority, 0);
    assert!(matches!(layer.get_transition("nope"), Err(LayerError::TransitionNotFound(_))));

    let removed = layer.del_transition("loop").unwrap();
    assert_eq!(removed.to_state, "a");
    assert!(matches!(layer.del_transition("loop"), Err(LayerError::TransitionNotFound(_))));

    let state = layer.del_state("a").unwrap();
    assert_eq!(state.name(), "a");
    assert!(layer.state_names().is_empty());
}

#[test]
fn test_states_are_addressed_by_layer() {
    let h = Harness::new();
    let mut layer = h.layer("a");
    let state = layer.add_state("a", "/bin/a").unwrap();
    assert_eq!(state.layer(), common::LAYER);
    assert_eq!(state.exec_path(), std::path::Path::new("/bin/a"));
}

#[test]
fn test_validate_catches_bad_configuration_before_spawning() {
    let h = Harness::new();
    let count = h.register_counter("/bin/a");

    let mut layer = h.layer("missing");
    layer.add_state("a", "/bin/a").unwrap();
    assert_eq!(layer.run(), Err(LayerError::StateNotFound("missing".into())));

    layer.set_current_state("a").unwrap();
    layer.add_transition(edge("out", "a", "nowhere", 0, Condition::Always)).unwrap();
    assert_eq!(
        layer.run(),
        Err(LayerError::DanglingTransition {
            transition: "out".into(),
            state: "nowhere".into(),
        })
    );
    assert!(!layer.get_state("a").unwrap().is_started());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Transition selection
// ============================================================================

#[test]
fn test_priority_orders_evaluation_not_outcome() {
    let h = Harness::new();
    for path in ["/bin/a", "/bin/b", "/bin/c"] {
        h.register_counter(path);
    }
    let mut layer = h.layer("a");
    layer.add_state("a", "/bin/a").unwrap();
    layer.add_state("b", "/bin/b").unwrap();
    layer.add_state("c", "/bin/c").unwrap();
    layer.add_transition(edge("high", "a", "b", 10, Condition::Never)).unwrap();
    layer.add_transition(edge("low", "a", "c", 5, Condition::Always)).unwrap();

    assert_eq!(layer.step().unwrap(), "c");
    assert_eq!(layer.current_state(), "c");
}

#[test]
fn test_priority_ties_follow_registration_order() {
    let h = Harness::new();
    h.register_counter("/bin/a");
    h.register_counter("/bin/b");
    h.register_counter("/bin/c");
    let mut layer = h.layer("a");
    layer.add_state("a", "/bin/a").unwrap();
    layer.add_state("b", "/bin/b").unwrap();
    layer.add_state("c", "/bin/c").unwrap();
    // Names chosen so that name order and registration order disagree.
    layer.add_transition(edge("z-first", "a", "b", 1, Condition::Always)).unwrap();
    layer.add_transition(edge("a-second", "a", "c", 1, Condition::Always)).unwrap();
    layer.add_transition(edge("back", "b", "a", 0, Condition::Always)).unwrap();

    let path: Vec<String> = (0..6).map(|_| layer.step().unwrap()).collect();
    assert_eq!(path, ["b", "a", "b", "a", "b", "a"]);
}

#[test]
fn test_no_transition_is_fatal_without_mutation() {
    let h = Harness::new();
    let count = h.register_counter("/bin/s");
    let mut layer = h.layer("s");
    layer.add_state("s", "/bin/s").unwrap();

    let err = layer.run().unwrap_err();
    assert_eq!(err, LayerError::NoTransition("s".into()));
    assert!(err.is_scheduling());
    assert_eq!(layer.current_state(), "s");
    // The state yielded once before the lookup failed.
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(layer.get_state("s").unwrap().cycle(), 1);
}

#[test]
fn test_no_matching_transition_is_fatal_without_mutation() {
    let h = Harness::new();
    h.register_counter("/bin/s");
    h.register_counter("/bin/t");
    let mut layer = h.layer("s");
    layer.add_state("s", "/bin/s").unwrap();
    layer.add_state("t", "/bin/t").unwrap();
    layer.add_transition(edge("blocked", "s", "t", 3, Condition::Never)).unwrap();
    layer
        .add_transition(edge("gated", "s", "t", 1, Condition::param_true("go")))
        .unwrap();

    assert_eq!(layer.step(), Err(LayerError::NoMatchingTransition("s".into())));
    assert_eq!(layer.current_state(), "s");
}

#[test]
fn test_conditions_follow_kernel_parameter_writes() {
    let h = Harness::new();
    h.store.declare("ticks", 0);
    h.register("/bin/tick", || {
        |ctx: &KernelContext| -> Result<(), KernelError> {
            let ticks = ctx
                .params()
                .get_parameter(&Parameter::new("ticks", ParamKind::Int))?
                .as_int()
                .unwrap_or_default();
            let next = Parameter::with_value("ticks", ParamKind::Int, ticks + 1)?;
            ctx.params().set_parameter(&next)
        }
    });
    h.register_counter("/bin/done");

    let mut layer = h.layer("tick");
    layer.add_state("tick", "/bin/tick").unwrap();
    layer.add_state("done", "/bin/done").unwrap();
    layer
        .add_transition(edge("finished", "tick", "done", 1, Condition::param_equals("ticks", 3)))
        .unwrap();
    layer.add_transition(edge("again", "tick", "tick", 0, Condition::Always)).unwrap();
    layer.add_transition(edge("stay", "done", "done", 0, Condition::Always)).unwrap();

    let path: Vec<String> = (0..4).map(|_| layer.step().unwrap()).collect();
    assert_eq!(path, ["tick", "tick", "done", "done"]);
    assert_eq!(h.store.get_parameter_value("ticks"), Ok(ParamValue::Int(3)));
}

#[test]
fn test_predicate_condition_reads_layer_delegate() {
    let h = Harness::new();
    h.store.declare("target", "b");
    h.register_counter("/bin/a");
    h.register_counter("/bin/b");
    let mut layer = h.layer("a");
    layer.add_state("a", "/bin/a").unwrap();
    layer.add_state("b", "/bin/b").unwrap();
    let wants_b = Condition::predicate(|d| {
        d.get_parameter_value("target").ok() == Some(ParamValue::Str("b".into()))
    });
    layer.add_transition(edge("to-b", "a", "b", 0, wants_b)).unwrap();

    assert_eq!(layer.step().unwrap(), "b");
}

// ============================================================================
// Run loop
// ============================================================================

#[test]
fn test_at_most_one_kernel_runs_at_a_time() {
    let h = Harness::new();
    let running = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    for path in ["/bin/ping", "/bin/pong"] {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        h.register(path, move || {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            move |_ctx: &KernelContext| -> Result<(), KernelError> {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }
    let mut layer = h.layer("ping");
    layer.add_state("ping", "/bin/ping").unwrap();
    layer.add_state("pong", "/bin/pong").unwrap();
    layer.add_transition(edge("serve", "ping", "pong", 0, Condition::Always)).unwrap();
    layer.add_transition(edge("return", "pong", "ping", 0, Condition::Always)).unwrap();

    for _ in 0..10 {
        layer.step().unwrap();
        let acknowledged = layer
            .state_names()
            .into_iter()
            .filter(|name| layer.get_state(name).unwrap().is_acknowledged())
            .count();
        assert_eq!(acknowledged, 0);
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_until_stops_between_cycles() {
    let h = Harness::new();
    let shutdown = ShutdownSignal::new();
    let cycles = Arc::new(AtomicU32::new(0));
    let (stop, seen) = (shutdown.clone(), Arc::clone(&cycles));
    h.register("/bin/loop", move || {
        let stop = stop.clone();
        let seen = Arc::clone(&seen);
        move |_ctx: &KernelContext| -> Result<(), KernelError> {
            if seen.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                stop.trigger();
            }
            Ok(())
        }
    });
    let mut layer = h.layer("loop");
    layer.add_state("loop", "/bin/loop").unwrap();
    layer.add_transition(edge("again", "loop", "loop", 0, Condition::Always)).unwrap();

    assert_eq!(layer.run_until(&shutdown), Ok(()));
    assert_eq!(cycles.load(Ordering::SeqCst), 5);
}

#[test]
fn test_run_propagates_schedule_failure() {
    let h = Harness::new();
    let mut layer = h.layer("ghost");
    layer.add_state("ghost", "/bin/unregistered").unwrap();
    layer.add_transition(edge("again", "ghost", "ghost", 0, Condition::Always)).unwrap();

    let err = layer.run().unwrap_err();
    assert!(err.is_scheduling());
    assert!(matches!(
        err,
        LayerError::Schedule {
            source: StateError::Spawn(HalError::NotFound(_)),
            ..
        }
    ));
    assert_eq!(layer.current_state(), "ghost");
}

#[test]
fn test_shutdown_terminates_every_state() {
    let h = Harness::new();
    h.register_counter("/bin/a");
    h.register_counter("/bin/b");
    let mut layer = h.layer("a");
    layer.add_state("a", "/bin/a").unwrap();
    layer.add_state("b", "/bin/b").unwrap();
    layer.add_transition(edge("ab", "a", "b", 0, Condition::Always)).unwrap();
    layer.add_transition(edge("ba", "b", "a", 0, Condition::Always)).unwrap();
    layer.step().unwrap();
    layer.step().unwrap();

    layer.shutdown().unwrap();
    assert!(!layer.get_state("a").unwrap().is_started());
    assert!(!layer.get_state("b").unwrap().is_started());
}

// ============================================================================
// Delegate forwarding
// ============================================================================

#[test]
fn test_delegate_calls_fail_fast_until_wired() {
    let h = Harness::new();
    let mut layer = asm_supervisor::Layer::new(
        "bare",
        "a",
        h.bus(),
        h.spawner.clone(),
        common::fast_config(),
    );
    let handle = layer.delegate_handle();

    assert_eq!(layer.get_parameter_value("x"), Err(DelegateError::Unconfigured));
    assert_eq!(
        layer.set_parameter_value("x", ParamValue::Int(1)),
        Err(DelegateError::Unconfigured)
    );
    assert_eq!(layer.get_all_params_name(), Err(DelegateError::Unconfigured));
    assert_eq!(handle.get_parameter_value("x"), Err(DelegateError::Unconfigured));

    layer.set_delegate(Arc::new(ParameterStore::new().with("x", 1)));
    assert_eq!(layer.get_parameter_value("x"), Ok(ParamValue::Int(1)));
    handle.set_parameter_value("x", ParamValue::Int(2)).unwrap();
    assert_eq!(layer.get_parameter_value("x"), Ok(ParamValue::Int(2)));
    assert_eq!(layer.get_all_params_name(), Ok(vec!["x".to_string()]));
}

#[test]
fn test_unwired_delegate_is_configuration_error() {
    let h = Harness::new();
    let count = h.register_counter("/bin/a");
    h.register_counter("/bin/b");
    let mut layer = asm_supervisor::Layer::new(
        "bare",
        "a",
        h.bus(),
        h.spawner.clone(),
        common::fast_config(),
    );
    layer.add_state("a", "/bin/a").unwrap();
    layer.add_state("b", "/bin/b").unwrap();
    layer.add_transition(edge("never", "a", "b", 5, Condition::Never)).unwrap();
    layer
        .add_transition(edge("go", "a", "b", 1, Condition::param_true("go")))
        .unwrap();

    let err = layer.step().unwrap_err();
    assert_eq!(err, LayerError::Delegate(DelegateError::Unconfigured));
    assert!(!err.is_scheduling());
    assert_eq!(layer.current_state(), "a");
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // Wiring the delegate makes the same edge usable.
    layer.set_delegate(Arc::new(ParameterStore::new().with("go", true)));
    assert_eq!(layer.step().unwrap(), "b");
}

#[test]
fn test_constant_conditions_need_no_delegate() {
    let h = Harness::new();
    h.register_counter("/bin/a");
    h.register_counter("/bin/b");
    let mut layer = asm_supervisor::Layer::new(
        "bare",
        "a",
        h.bus(),
        h.spawner.clone(),
        common::fast_config(),
    );
    layer.add_state("a", "/bin/a").unwrap();
    layer.add_state("b", "/bin/b").unwrap();
    layer.add_transition(edge("ab", "a", "b", 0, Condition::Always)).unwrap();

    assert_eq!(layer.step().unwrap(), "b");
}

#[test]
fn test_insert_state_rejects_other_layers() {
    let h = Harness::new();
    h.register_counter("/bin/x");
    let mut other = asm_supervisor::Layer::new(
        "other",
        "x",
        h.bus(),
        h.spawner.clone(),
        common::fast_config(),
    );
    let err = other
        .insert_state(h.state("x", "/bin/x", common::fast_config()))
        .unwrap_err();
    assert_eq!(
        err,
        LayerError::ForeignState {
            state: "x".into(),
            layer: common::LAYER.into(),
        }
    );
    assert!(!err.is_scheduling());
    assert!(matches!(other.get_state("x"), Err(LayerError::StateNotFound(_))));

    let mut layer = h.layer("x");
    layer
        .insert_state(h.state("x", "/bin/x", common::fast_config()))
        .unwrap();
    assert_eq!(
        layer.insert_state(h.state("x", "/bin/x", common::fast_config())),
        Err(LayerError::StateExists("x".into()))
    );
    assert_eq!(layer.step(), Err(LayerError::NoTransition("x".into())));
    assert_eq!(layer.get_state("x").unwrap().cycle(), 1);
}
