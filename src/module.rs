//! # Modules
//!
//! A module is a node in the dataflow graph wrapping one user-visible unit of
//! computation. It owns its ports, its parameter state, its execution-state
//! machine, and a reference to the algorithm body its execution delegates to.
//!
//! The engine never knows concrete algorithm implementations: every body sits
//! behind the [`Algorithm`] trait, and modules are composed from a delegate
//! object rather than subclassed. A module with `has_algorithm == false`
//! (pure UI/annotation modules in the original tool) completes trivially.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::datatype::{InputHandles, OutputHandles};
use crate::error::AlgorithmError;
use crate::port::{InputPortSet, OutputPortSet, PortId, PortShift};
use crate::registry::ModuleLookupInfo;
use crate::state::ModuleState;

/// Unique, stable identifier for a module instance.
///
/// Formed from the logical module name and a per-name instance counter
/// assigned at add time (`"ComputeGradient:2"`). Never reused while the
/// network lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
  /// Logical module type name.
  pub name: String,
  /// Monotonic per-name instance counter.
  pub instance: usize,
}

impl ModuleId {
  /// Creates a module id from its parts.
  pub fn new(name: impl Into<String>, instance: usize) -> Self {
    Self {
      name: name.into(),
      instance,
    }
  }
}

impl fmt::Display for ModuleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.name, self.instance)
  }
}

impl FromStr for ModuleId {
  type Err = String;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let (name, instance) = text
      .rsplit_once(':')
      .ok_or_else(|| format!("malformed module id '{text}'"))?;
    let instance = instance
      .parse::<usize>()
      .map_err(|_| format!("malformed module id '{text}'"))?;
    Ok(ModuleId::new(name, instance))
  }
}

/// Where a module sits in its execution lifecycle.
///
/// Created as `NotExecuted` when the module is added, mutated only by the
/// scheduler (never by the algorithm body directly), destroyed with the
/// module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionState {
  /// Never executed since creation or the last reset.
  #[default]
  NotExecuted,
  /// Scheduled in the current pass, not yet started.
  Waiting,
  /// Algorithm body currently running.
  Executing,
  /// Last run finished successfully; outputs are valid.
  Completed,
  /// Last run failed, or an upstream failure was propagated.
  Errored,
}

impl fmt::Display for ExecutionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionState::NotExecuted => write!(f, "not executed"),
      ExecutionState::Waiting => write!(f, "waiting"),
      ExecutionState::Executing => write!(f, "executing"),
      ExecutionState::Completed => write!(f, "completed"),
      ExecutionState::Errored => write!(f, "errored"),
    }
  }
}

/// The execution contract every module body implements.
///
/// # Contract
///
/// - May read any currently-populated input handle; inputs it does not read
///   are simply ignored.
/// - Must return a handle for every output port it declares before reporting
///   success (a partial output set is a body bug, not engine-enforced).
/// - Must not block indefinitely: the engine has no timeout, so a hang stalls
///   the whole scheduling pass.
/// - Must convert expected failures into [`AlgorithmError`] instead of
///   panicking across the scheduler boundary.
/// - May spawn internal worker tasks, but they must fully join before the
///   future resolves; the scheduler runs one module at a time.
#[async_trait]
pub trait Algorithm: Send + Sync {
  /// Runs the body once: reads inputs and state, returns outputs.
  async fn execute(
    &self,
    inputs: InputHandles,
    state: &mut ModuleState,
  ) -> Result<OutputHandles, AlgorithmError>;
}

/// Snapshot of the inputs a completed run observed, used by the re-execution
/// policy to decide whether a later pass can skip the module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSignature {
  /// The module's state version when the run completed.
  pub state_version: u64,
  /// Version of each upstream output the run consumed, keyed by the input
  /// port it arrived on.
  pub upstream_versions: BTreeMap<PortId, u64>,
}

/// A single computation node owned by the network.
pub struct Module {
  id: ModuleId,
  info: ModuleLookupInfo,
  state: ModuleState,
  input_ports: InputPortSet,
  output_ports: OutputPortSet,
  execution_state: ExecutionState,
  error_message: Option<String>,
  algorithm: Option<Arc<dyn Algorithm>>,
  always_execute: bool,
  last_run: Option<RunSignature>,
}

impl Module {
  /// Assembles a module from its factory-produced parts.
  ///
  /// Called by the network during `add_module`; not part of the public
  /// mutation surface.
  pub(crate) fn new(
    id: ModuleId,
    info: ModuleLookupInfo,
    state: ModuleState,
    input_ports: InputPortSet,
    output_ports: OutputPortSet,
    algorithm: Option<Arc<dyn Algorithm>>,
  ) -> Self {
    Self {
      id,
      info,
      state,
      input_ports,
      output_ports,
      execution_state: ExecutionState::NotExecuted,
      error_message: None,
      algorithm,
      always_execute: false,
      last_run: None,
    }
  }

  /// This module's network-unique id.
  pub fn id(&self) -> &ModuleId {
    &self.id
  }

  /// The registry triple this module was constructed from.
  pub fn info(&self) -> &ModuleLookupInfo {
    &self.info
  }

  /// Read access to the parameter state.
  pub fn state(&self) -> &ModuleState {
    &self.state
  }

  /// Mutable access to the parameter state (the owning module's edit path).
  pub fn state_mut(&mut self) -> &mut ModuleState {
    &mut self.state
  }

  /// The module's input ports.
  pub fn input_ports(&self) -> &InputPortSet {
    &self.input_ports
  }

  /// The module's output ports.
  pub fn output_ports(&self) -> &OutputPortSet {
    &self.output_ports
  }

  /// Current execution state.
  pub fn execution_state(&self) -> ExecutionState {
    self.execution_state
  }

  /// The error recorded by the most recent failed run, if any.
  pub fn error_message(&self) -> Option<&str> {
    self.error_message.as_deref()
  }

  /// The algorithm body, if this module type declares one.
  pub fn algorithm(&self) -> Option<Arc<dyn Algorithm>> {
    self.algorithm.clone()
  }

  /// Whether this module is flagged to run on every pass regardless of the
  /// caching policy (time-varying sources, side-effecting sinks).
  pub fn always_execute(&self) -> bool {
    self.always_execute
  }

  /// Sets the always-execute override.
  pub fn set_always_execute(&mut self, always: bool) {
    self.always_execute = always;
  }

  /// Signature recorded at the last completed run.
  pub fn last_run(&self) -> Option<&RunSignature> {
    self.last_run.as_ref()
  }

  // Scheduler-facing mutation below. The state machine is driven exclusively
  // by the scheduler and the network; algorithm bodies never touch it.

  pub(crate) fn set_execution_state(&mut self, state: ExecutionState) {
    self.execution_state = state;
  }

  pub(crate) fn record_error(&mut self, message: String) {
    self.execution_state = ExecutionState::Errored;
    self.error_message = Some(message);
  }

  pub(crate) fn record_completed(&mut self, signature: RunSignature) {
    self.execution_state = ExecutionState::Completed;
    self.error_message = None;
    self.last_run = Some(signature);
  }

  pub(crate) fn reset_execution(&mut self) {
    self.execution_state = ExecutionState::NotExecuted;
    self.error_message = None;
    self.last_run = None;
  }

  pub(crate) fn output_ports_mut(&mut self) -> &mut OutputPortSet {
    &mut self.output_ports
  }

  /// Grows the named dynamic input group by one slot.
  ///
  /// Driven by the network during `connect`; cached port-count-dependent
  /// state inside the body is revalidated on the next execution.
  pub(crate) fn add_dynamic_port(&mut self, name: &str) -> Option<(PortId, Vec<PortShift>)> {
    self.input_ports.grow(name)
  }

  /// Removes one dynamic input slot, compacting the group.
  pub(crate) fn remove_dynamic_port(&mut self, id: &PortId) -> Option<Vec<PortShift>> {
    self.input_ports.remove_slot(id)
  }
}

impl fmt::Debug for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Module")
      .field("id", &self.id)
      .field("execution_state", &self.execution_state)
      .field("inputs", &self.input_ports.len())
      .field("outputs", &self.output_ports.len())
      .field("always_execute", &self.always_execute)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn module_id_round_trips_through_display() {
    let id = ModuleId::new("ComputeGradient", 3);
    assert_eq!(id.to_string(), "ComputeGradient:3");
    assert_eq!("ComputeGradient:3".parse::<ModuleId>().unwrap(), id);
  }

  #[test]
  fn malformed_module_ids_are_rejected() {
    assert!("NoCounter".parse::<ModuleId>().is_err());
    assert!("Name:abc".parse::<ModuleId>().is_err());
  }
}
