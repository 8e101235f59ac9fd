//! # Execution Scheduler
//!
//! Drives a scheduling pass over the network: computes a topological order,
//! then visits each module in turn, at most one algorithm body in flight at a
//! time. Per module the scheduler checks the stop flag, propagates upstream
//! failures, consults the re-execution policy, and only then runs the body,
//! publishing its outputs and recording the run signature the policy will
//! compare against next pass.
//!
//! A stop request is advisory: it is honored at module boundaries, so the
//! module currently executing always finishes (successfully or not) before
//! the pass ends early. Modules not yet visited when the pass ends keep
//! their previous execution state and outputs; a module only leaves
//! `Completed` once its own turn decides it must run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::NetworkError;
use crate::events::EngineEvent;
use crate::module::{ExecutionState, ModuleId, RunSignature};
use crate::network::Network;
use crate::reexecute::{DefaultReexecutionStrategy, ReexecutionContext, ReexecutionStrategy};

/// Runs scheduling passes over a network.
pub struct ExecutionScheduler {
  strategy: Arc<dyn ReexecutionStrategy>,
  stop: Arc<AtomicBool>,
}

impl Default for ExecutionScheduler {
  fn default() -> Self {
    Self::new(Arc::new(DefaultReexecutionStrategy))
  }
}

impl ExecutionScheduler {
  /// Creates a scheduler with the given re-execution policy.
  pub fn new(strategy: Arc<dyn ReexecutionStrategy>) -> Self {
    Self {
      strategy,
      stop: Arc::new(AtomicBool::new(false)),
    }
  }

  /// A handle that requests the current or next pass to stop at the next
  /// module boundary. Safe to trigger from any thread.
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    Arc::clone(&self.stop)
  }

  /// Requests that the running pass stop after the current module finishes.
  pub fn request_stop(&self) {
    self.stop.store(true, Ordering::SeqCst);
  }

  /// Executes the whole network once, in dependency order.
  ///
  /// # Errors
  ///
  /// `CycleDetected` if the graph is not a DAG; in that case no module runs
  /// and no execution state changes.
  pub async fn execute_all(&self, network: &mut Network) -> Result<(), NetworkError> {
    let order = network.topological_order()?;
    self.run_pass(network, order).await
  }

  /// Executes one module and everything it transitively depends on, in
  /// dependency order. Modules outside that ancestor set are untouched.
  ///
  /// # Errors
  ///
  /// `ModuleNotFound` for an unknown id; `CycleDetected` if the graph is not
  /// a DAG.
  pub async fn execute_module(
    &self,
    network: &mut Network,
    id: &ModuleId,
  ) -> Result<(), NetworkError> {
    if network.module(id).is_none() {
      return Err(NetworkError::ModuleNotFound(id.clone()));
    }
    let order = network.ancestors_of(id)?;
    self.run_pass(network, order).await
  }

  /// Executes one module's ancestors, the module itself, and everything
  /// downstream of it, in dependency order.
  ///
  /// # Errors
  ///
  /// `ModuleNotFound` for an unknown id; `CycleDetected` if the graph is not
  /// a DAG.
  pub async fn execute_downstream(
    &self,
    network: &mut Network,
    id: &ModuleId,
  ) -> Result<(), NetworkError> {
    if network.module(id).is_none() {
      return Err(NetworkError::ModuleNotFound(id.clone()));
    }
    let mut required: std::collections::HashSet<ModuleId> = std::collections::HashSet::new();
    for member in network.descendants_of(id)? {
      for ancestor in network.ancestors_of(&member)? {
        required.insert(ancestor);
      }
    }
    let order = network
      .topological_order()?
      .into_iter()
      .filter(|module| required.contains(module))
      .collect();
    self.run_pass(network, order).await
  }

  async fn run_pass(
    &self,
    network: &mut Network,
    order: Vec<ModuleId>,
  ) -> Result<(), NetworkError> {
    self.stop.store(false, Ordering::SeqCst);
    let events = network.events().clone();
    info!(modules = order.len(), "execution pass starting");
    events.emit(EngineEvent::ExecutionStarted);

    for id in &order {
      if self.stop.load(Ordering::SeqCst) {
        warn!(module = %id, "stop requested; ending pass early");
        break;
      }
      self.visit(network, id).await;
    }

    events.emit(EngineEvent::ExecutionFinished);
    info!("execution pass finished");
    Ok(())
  }

  // One module's turn in the pass. Never returns an error: failures are
  // recorded on the module and propagated through execution states.
  async fn visit(&self, network: &mut Network, id: &ModuleId) {
    let events = network.events().clone();

    // Fail fast: a failed upstream makes this module's inputs unsatisfiable.
    if let Some(failed) = network.errored_upstream(id) {
      let message = format!("upstream module '{failed}' failed");
      warn!(module = %id, upstream = %failed, "propagating upstream failure");
      if let Some(module) = network.module_mut(id) {
        module.record_error(message.clone());
      }
      events.emit(EngineEvent::ModuleErrored {
        id: id.clone(),
        message,
      });
      events.emit(EngineEvent::ModuleExecuteEnds { id: id.clone() });
      return;
    }

    let (inputs, upstream_versions) = network.collect_inputs(id);
    let Some(module) = network.module_mut(id) else {
      return;
    };
    let signature = RunSignature {
      state_version: module.state().version(),
      upstream_versions,
    };

    let context = ReexecutionContext {
      module: &*module,
      current: signature.clone(),
    };
    if !self.strategy.needs_execute(&context) {
      // The policy only allows a skip for a module already in Completed, so
      // its state and outputs stand as they are.
      debug!(module = %id, "up to date; skipping");
      events.emit(EngineEvent::ModuleExecuteEnds { id: id.clone() });
      return;
    }

    module.set_execution_state(ExecutionState::Waiting);
    events.emit(EngineEvent::ModuleExecuteBegins { id: id.clone() });
    module.set_execution_state(ExecutionState::Executing);
    debug!(module = %id, inputs = inputs.len(), "executing");

    let outcome = match module.algorithm() {
      Some(algorithm) => algorithm.execute(inputs, module.state_mut()).await,
      // UI-only module types have no body and complete trivially.
      None => Ok(crate::datatype::OutputHandles::new()),
    };

    match outcome {
      Ok(outputs) => {
        for (port, handle) in outputs {
          if !module.output_ports_mut().publish(&port, handle) {
            warn!(module = %id, %port, "body returned a handle for an undeclared output port");
          }
        }
        // The body's own state writes are part of this run, so the recorded
        // signature takes the state version as of completion.
        module.record_completed(RunSignature {
          state_version: module.state().version(),
          upstream_versions: signature.upstream_versions,
        });
        debug!(module = %id, "completed");
      }
      Err(error) => {
        let message = error.to_string();
        error!(module = %id, %message, "module failed");
        module.record_error(message.clone());
        events.emit(EngineEvent::ModuleErrored {
          id: id.clone(),
          message,
        });
      }
    }
    events.emit(EngineEvent::ModuleExecuteEnds { id: id.clone() });
  }
}
