//! Guarded FSM edges.
//!
//! A [`Transition`] leads from one state name to another when its
//! [`Condition`] holds. Priority orders evaluation only: the first candidate
//! whose condition holds is taken, however low its priority.

use core::fmt;
use std::sync::Arc;

use asm_ipc::ParamValue;
use tracing::debug;

use crate::delegate::ParameterDelegate;

/// Predicate over the layer's delegate.
pub type Guard = Arc<dyn Fn(&dyn ParameterDelegate) -> bool + Send + Sync>;

/// When a transition may be taken.
#[derive(Clone)]
pub enum Condition {
    Always,
    Never,
    /// Parameter `name` currently equals `value` (same kind and value)
    ParamEquals { name: String, value: ParamValue },
    /// Parameter `name` is the bool `true`
    ParamTrue(String),
    /// Arbitrary guard
    Predicate(Guard),
}

impl Condition {
    pub fn param_equals(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Condition::ParamEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn param_true(name: impl Into<String>) -> Self {
        Condition::ParamTrue(name.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&dyn ParameterDelegate) -> bool + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(f))
    }

    /// Whether evaluation consults the delegate.
    pub fn reads_parameters(&self) -> bool {
        !matches!(self, Condition::Always | Condition::Never)
    }

    /// Evaluate against `delegate`.
    ///
    /// A delegate failure (unknown name, no delegate wired) makes a
    /// parameter condition false.
    pub fn evaluate(&self, delegate: &dyn ParameterDelegate) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::ParamEquals { name, value } => match delegate.get_parameter_value(name) {
                Ok(current) => current == *value,
                Err(e) => {
                    debug!(name = %name, error = %e, "condition parameter unavailable");
                    false
                }
            },
            Condition::ParamTrue(name) => match delegate.get_parameter_value(name) {
                Ok(current) => current.as_bool() == Some(true),
                Err(e) => {
                    debug!(name = %name, error = %e, "condition parameter unavailable");
                    false
                }
            },
            Condition::Predicate(guard) => guard(delegate),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("Always"),
            Condition::Never => f.write_str("Never"),
            Condition::ParamEquals { name, value } => f
                .debug_struct("ParamEquals")
                .field("name", name)
                .field("value", value)
                .finish(),
            Condition::ParamTrue(name) => f.debug_tuple("ParamTrue").field(name).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A guarded, prioritized edge between two state names.
#[derive(Clone, Debug)]
pub struct Transition {
    pub name: String,
    pub from_state: String,
    pub to_state: String,
    /// Higher is evaluated first
    pub priority: i32,
    pub condition: Condition,
}

impl Transition {
    pub fn new(
        name: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        priority: i32,
        condition: Condition,
    ) -> Self {
        Self {
            name: name.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
            priority,
            condition,
        }
    }
}
