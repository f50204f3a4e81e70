//! Layer: the finite-state-machine supervisor.
//!
//! A Layer owns a set of States and Transitions and runs the scheduling loop:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ 1. states[current].schedule()   (one kernel cycle)       │
//!   │ 2. candidates = transitions leaving `current`            │
//!   │ 3. order by priority desc, then registration order       │
//!   │ 4. first candidate whose condition holds → current = to  │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no terminal state; the loop runs until a cycle fails. A failed
//! cycle leaves `current` unchanged.
//!
//! The Layer also exposes the parameter-delegate calls, forwarding each to
//! the delegate wired with [`Layer::set_delegate`]. The States it creates
//! answer their kernels through the same forwarding slot, and
//! [`Layer::delegate_handle`] hands that slot to a parent hierarchy.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use asm_hal::{ProcessSpawner, ShutdownSignal};
use asm_ipc::{Bus, ParamValue};
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::delegate::{DelegateSlot, ParameterDelegate};
use crate::error::{DelegateError, LayerError};
use crate::state::State;
use crate::transition::Transition;

struct Registered {
    transition: Transition,
    /// Registration order; breaks priority ties
    seq: u64,
}

/// Finite-state machine over States owned by this layer.
pub struct Layer {
    name: String,
    bus: Arc<dyn Bus>,
    spawner: Arc<dyn ProcessSpawner>,
    config: SupervisorConfig,
    states: HashMap<String, State>,
    transitions: HashMap<String, Registered>,
    next_seq: u64,
    current_state: String,
    delegate: DelegateSlot,
}

impl Layer {
    /// Create an empty layer starting in `initial_state`.
    ///
    /// The initial state is checked by [`validate`](Self::validate), which
    /// [`run`](Self::run) calls before the first cycle.
    pub fn new(
        name: impl Into<String>,
        initial_state: impl Into<String>,
        bus: Arc<dyn Bus>,
        spawner: Arc<dyn ProcessSpawner>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            bus,
            spawner,
            config,
            states: HashMap::new(),
            transitions: HashMap::new(),
            next_seq: 0,
            current_state: initial_state.into(),
            delegate: DelegateSlot::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    /// Move the FSM to `name` (which must exist).
    pub fn set_current_state(&mut self, name: &str) -> Result<(), LayerError> {
        if !self.states.contains_key(name) {
            return Err(LayerError::StateNotFound(name.to_string()));
        }
        self.current_state = name.to_string();
        Ok(())
    }

    // ========================================================================
    // Delegate wiring
    // ========================================================================

    /// Wire the upstream delegate this layer forwards to.
    pub fn set_delegate(&mut self, delegate: Arc<dyn ParameterDelegate>) {
        self.delegate.set(delegate);
    }

    /// A delegate that forwards through this layer's slot, including to
    /// delegates wired later.
    pub fn delegate_handle(&self) -> Arc<dyn ParameterDelegate> {
        Arc::new(self.delegate.clone())
    }

    /// Forwarded to the wired delegate; `Unconfigured` if there is none.
    pub fn get_parameter_value(&self, name: &str) -> Result<ParamValue, DelegateError> {
        self.delegate.get_parameter_value(name)
    }

    pub fn set_parameter_value(&self, name: &str, value: ParamValue) -> Result<(), DelegateError> {
        self.delegate.set_parameter_value(name, value)
    }

    pub fn get_all_params_name(&self) -> Result<Vec<String>, DelegateError> {
        self.delegate.get_all_params_name()
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Create a State for `exec_path` under this layer and register it.
    pub fn add_state(
        &mut self,
        name: impl Into<String>,
        exec_path: impl Into<PathBuf>,
    ) -> Result<&mut State, LayerError> {
        let name = name.into();
        if self.states.contains_key(&name) {
            return Err(LayerError::StateExists(name));
        }
        let state = State::new(
            self.name.clone(),
            name.clone(),
            exec_path,
            Arc::clone(&self.bus),
            Arc::clone(&self.spawner),
            self.delegate_handle(),
            self.config.clone(),
        );
        debug!(layer = %self.name, state = %name, "state added");
        Ok(self.states.entry(name).or_insert(state))
    }

    /// Register a State built elsewhere.
    ///
    /// The State must have been created for this layer, since its channels
    /// are addressed by `(layer, name)`.
    pub fn insert_state(&mut self, state: State) -> Result<(), LayerError> {
        if state.layer() != self.name {
            return Err(LayerError::ForeignState {
                state: state.name().to_string(),
                layer: state.layer().to_string(),
            });
        }
        if self.states.contains_key(state.name()) {
            return Err(LayerError::StateExists(state.name().to_string()));
        }
        self.states.insert(state.name().to_string(), state);
        Ok(())
    }

    pub fn get_state(&self, name: &str) -> Result<&State, LayerError> {
        self.states
            .get(name)
            .ok_or_else(|| LayerError::StateNotFound(name.to_string()))
    }

    pub fn get_state_mut(&mut self, name: &str) -> Result<&mut State, LayerError> {
        self.states
            .get_mut(name)
            .ok_or_else(|| LayerError::StateNotFound(name.to_string()))
    }

    /// Remove and return a State. Dropping it terminates its child.
    pub fn del_state(&mut self, name: &str) -> Result<State, LayerError> {
        self.states
            .remove(name)
            .ok_or_else(|| LayerError::StateNotFound(name.to_string()))
    }

    /// State names in sorted order.
    pub fn state_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.states.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn add_transition(&mut self, transition: Transition) -> Result<(), LayerError> {
        if self.transitions.contains_key(&transition.name) {
            return Err(LayerError::TransitionExists(transition.name));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(
            layer = %self.name,
            transition = %transition.name,
            from = %transition.from_state,
            to = %transition.to_state,
            priority = transition.priority,
            "transition added"
        );
        self.transitions
            .insert(transition.name.clone(), Registered { transition, seq });
        Ok(())
    }

    pub fn get_transition(&self, name: &str) -> Result<&Transition, LayerError> {
        self.transitions
            .get(name)
            .map(|r| &r.transition)
            .ok_or_else(|| LayerError::TransitionNotFound(name.to_string()))
    }

    pub fn del_transition(&mut self, name: &str) -> Result<Transition, LayerError> {
        self.transitions
            .remove(name)
            .map(|r| r.transition)
            .ok_or_else(|| LayerError::TransitionNotFound(name.to_string()))
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Check that the current state and every transition endpoint exist.
    pub fn validate(&self) -> Result<(), LayerError> {
        if !self.states.contains_key(&self.current_state) {
            return Err(LayerError::StateNotFound(self.current_state.clone()));
        }
        // Sorted so the reported error does not depend on map order.
        let ordered: BTreeMap<&str, &Transition> = self
            .transitions
            .iter()
            .map(|(name, r)| (name.as_str(), &r.transition))
            .collect();
        for t in ordered.values() {
            for endpoint in [&t.from_state, &t.to_state] {
                if !self.states.contains_key(endpoint) {
                    return Err(LayerError::DanglingTransition {
                        transition: t.name.clone(),
                        state: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run one cycle of the current state and take the next transition.
    ///
    /// # Returns
    /// * `Ok(name)` - The new current state
    /// * `Err(_)` - The cycle failed; the current state is unchanged
    pub fn step(&mut self) -> Result<String, LayerError> {
        let current = self.current_state.clone();
        let state = self
            .states
            .get_mut(&current)
            .ok_or_else(|| LayerError::StateNotFound(current.clone()))?;
        state.schedule().map_err(|source| LayerError::Schedule {
            state: current.clone(),
            source,
        })?;

        let next = self.select_transition(&current)?;
        if !self.states.contains_key(&next) {
            return Err(LayerError::StateNotFound(next));
        }
        if next != current {
            info!(layer = %self.name, from = %current, to = %next, "state change");
        }
        self.current_state = next.clone();
        Ok(next)
    }

    /// Validate, then cycle until a cycle fails.
    ///
    /// Only returns with an error; the FSM has no terminal state.
    pub fn run(&mut self) -> Result<(), LayerError> {
        self.run_until(&ShutdownSignal::new())
    }

    /// Validate, then cycle until `shutdown` fires (checked between cycles)
    /// or a cycle fails.
    pub fn run_until(&mut self, shutdown: &ShutdownSignal) -> Result<(), LayerError> {
        self.validate()?;
        info!(layer = %self.name, state = %self.current_state, "layer running");
        while !shutdown.is_triggered() {
            if let Err(e) = self.step() {
                error!(layer = %self.name, state = %self.current_state, error = %e, "layer stopped");
                return Err(e);
            }
        }
        info!(layer = %self.name, "layer shut down");
        Ok(())
    }

    /// Terminate every owned State's child process.
    ///
    /// All States are terminated even if some fail; the first failure is
    /// returned.
    pub fn shutdown(&mut self) -> Result<(), LayerError> {
        let mut first = None;
        for (name, state) in self.states.iter_mut() {
            if let Err(source) = state.terminate() {
                warn!(layer = %self.name, state = %name, error = %source, "terminate failed");
                first.get_or_insert(LayerError::Teardown {
                    state: name.clone(),
                    source,
                });
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn select_transition(&self, current: &str) -> Result<String, LayerError> {
        let mut candidates: Vec<&Registered> = self
            .transitions
            .values()
            .filter(|r| r.transition.from_state == current)
            .collect();
        if candidates.is_empty() {
            return Err(LayerError::NoTransition(current.to_string()));
        }
        candidates.sort_by(|a, b| {
            b.transition
                .priority
                .cmp(&a.transition.priority)
                .then(a.seq.cmp(&b.seq))
        });

        for t in candidates.into_iter().map(|r| &r.transition) {
            // Unwired delegate is a configuration error, not a false guard.
            if t.condition.reads_parameters() && !self.delegate.is_configured() {
                return Err(LayerError::Delegate(DelegateError::Unconfigured));
            }
            let taken = t.condition.evaluate(&self.delegate);
            debug!(layer = %self.name, transition = %t.name, taken, "condition evaluated");
            if taken {
                return Ok(t.to_state.clone());
            }
        }
        Err(LayerError::NoMatchingTransition(current.to_string()))
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
