//! Parameter delegation.
//!
//! A State answers its kernel's parameter RPCs through a
//! [`ParameterDelegate`]. A Layer is itself a delegate that forwards to
//! whatever delegate sits above it, so requests travel up the hierarchy:
//!
//! ```text
//!   Kernel ──RPC──▶ State ──▶ Layer delegate slot ──▶ root (e.g. ParameterStore)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use asm_ipc::ParamValue;
use parking_lot::{Mutex, RwLock};

use crate::error::DelegateError;

/// Get/set-parameter-by-name capability.
pub trait ParameterDelegate: Send + Sync {
    fn get_parameter_value(&self, name: &str) -> Result<ParamValue, DelegateError>;

    fn set_parameter_value(&self, name: &str, value: ParamValue) -> Result<(), DelegateError>;

    fn get_all_params_name(&self) -> Result<Vec<String>, DelegateError>;
}

impl<D: ParameterDelegate + ?Sized> ParameterDelegate for Arc<D> {
    fn get_parameter_value(&self, name: &str) -> Result<ParamValue, DelegateError> {
        (**self).get_parameter_value(name)
    }

    fn set_parameter_value(&self, name: &str, value: ParamValue) -> Result<(), DelegateError> {
        (**self).set_parameter_value(name, value)
    }

    fn get_all_params_name(&self) -> Result<Vec<String>, DelegateError> {
        (**self).get_all_params_name()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Thread-safe table of declared parameters.
///
/// Each parameter keeps the kind it was declared with; a set with a value of
/// another kind is refused rather than coerced.
#[derive(Default)]
pub struct ParameterStore {
    values: Mutex<BTreeMap<String, ParamValue>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with an initial value (builder form).
    pub fn with(self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.declare(name, value);
        self
    }

    /// Declare or redeclare `name`, fixing its kind to that of `value`.
    pub fn declare(&self, name: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.values.lock().insert(name.into(), value.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.lock().contains_key(name)
    }

    /// Copy of every declared value.
    pub fn snapshot(&self) -> BTreeMap<String, ParamValue> {
        self.values.lock().clone()
    }
}

impl ParameterDelegate for ParameterStore {
    fn get_parameter_value(&self, name: &str) -> Result<ParamValue, DelegateError> {
        self.values
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DelegateError::NoSuchParameter(name.to_string()))
    }

    fn set_parameter_value(&self, name: &str, value: ParamValue) -> Result<(), DelegateError> {
        let mut values = self.values.lock();
        let slot = values
            .get_mut(name)
            .ok_or_else(|| DelegateError::NoSuchParameter(name.to_string()))?;
        if slot.kind() != value.kind() {
            return Err(DelegateError::TypeMismatch {
                name: name.to_string(),
                expected: slot.kind(),
                found: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }

    fn get_all_params_name(&self) -> Result<Vec<String>, DelegateError> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}

// ============================================================================
// Forwarding slot
// ============================================================================

/// Shared, late-bound delegate reference.
///
/// Every clone sees the same slot, so a delegate wired after States were
/// created still reaches them.
#[derive(Clone, Default)]
pub struct DelegateSlot {
    inner: Arc<RwLock<Option<Arc<dyn ParameterDelegate>>>>,
}

impl DelegateSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, delegate: Arc<dyn ParameterDelegate>) {
        *self.inner.write() = Some(delegate);
    }

    pub fn clear(&self) {
        self.inner.write().take();
    }

    pub fn is_configured(&self) -> bool {
        self.inner.read().is_some()
    }

    fn current(&self) -> Result<Arc<dyn ParameterDelegate>, DelegateError> {
        // Clone out so the lock is not held across the upstream call.
        self.inner.read().clone().ok_or(DelegateError::Unconfigured)
    }
}

impl ParameterDelegate for DelegateSlot {
    fn get_parameter_value(&self, name: &str) -> Result<ParamValue, DelegateError> {
        self.current()?.get_parameter_value(name)
    }

    fn set_parameter_value(&self, name: &str, value: ParamValue) -> Result<(), DelegateError> {
        self.current()?.set_parameter_value(name, value)
    }

    fn get_all_params_name(&self) -> Result<Vec<String>, DelegateError> {
        self.current()?.get_all_params_name()
    }
}
