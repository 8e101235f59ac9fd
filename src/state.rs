//! # Module State
//!
//! Every module carries a key/value store of its persistent parameters plus
//! transient values used to pass large payloads between a module and its own
//! UI or algorithm body without going through ports.
//!
//! Persisted values are tagged [`Value`]s and survive serialization;
//! transient values are opaque handles and never do.
//!
//! ## Change Tracking
//!
//! The state carries a version counter bumped on every mutation. The
//! re-execution policy compares versions instead of performing deep value
//! comparisons, so "has this module's state changed since its last completed
//! run" is a single integer comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::datatype::DatatypeHandle;

/// A tagged parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  /// Boolean parameter.
  Bool(bool),
  /// Integer parameter.
  Int(i64),
  /// Floating-point parameter.
  Double(f64),
  /// String parameter.
  Str(String),
  /// Ordered list of values.
  List(Vec<Value>),
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Int(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Double(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::Str(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::Str(value)
  }
}

/// The persisted/transient parameter store attached to one module.
#[derive(Clone, Debug, Default)]
pub struct ModuleState {
  values: BTreeMap<String, Value>,
  transient: HashMap<String, DatatypeHandle>,
  version: u64,
}

impl ModuleState {
  /// Creates an empty state at version 0.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a state pre-populated with default parameter values.
  pub fn with_defaults(defaults: impl IntoIterator<Item = (String, Value)>) -> Self {
    Self {
      values: defaults.into_iter().collect(),
      transient: HashMap::new(),
      version: 0,
    }
  }

  /// Sets a persisted parameter, bumping the version.
  pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
    self.values.insert(name.into(), value.into());
    self.version += 1;
  }

  /// Reads a persisted parameter.
  pub fn value(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  /// Iterates over all persisted parameters in name order.
  pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.values.iter()
  }

  /// Sets a transient value, bumping the version.
  ///
  /// Transient values never appear in the serialized network document, but
  /// setting one still counts as a state change: a source module handed a
  /// new payload this way must re-execute on the next pass.
  pub fn set_transient(&mut self, name: impl Into<String>, handle: DatatypeHandle) {
    self.transient.insert(name.into(), handle);
    self.version += 1;
  }

  /// Reads a transient value.
  pub fn transient(&self, name: &str) -> Option<DatatypeHandle> {
    self.transient.get(name).cloned()
  }

  /// Current mutation version (0 for a fresh state).
  pub fn version(&self) -> u64 {
    self.version
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn mutations_bump_the_version() {
    let mut state = ModuleState::new();
    assert_eq!(state.version(), 0);
    state.set_value("operator", "transpose");
    assert_eq!(state.version(), 1);
    state.set_transient("payload", Arc::new(vec![1.0f64, 2.0]));
    assert_eq!(state.version(), 2);
  }

  #[test]
  fn defaults_do_not_count_as_mutations() {
    let state = ModuleState::with_defaults([("scale".to_string(), Value::Double(1.0))]);
    assert_eq!(state.version(), 0);
    assert_eq!(state.value("scale"), Some(&Value::Double(1.0)));
  }

  #[test]
  fn transient_values_are_readable_but_separate() {
    let mut state = ModuleState::new();
    state.set_transient("matrix", Arc::new(42i32));
    assert!(state.transient("matrix").is_some());
    assert!(state.value("matrix").is_none());
  }
}
