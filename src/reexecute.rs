//! # Re-execution Policy
//!
//! During a pass the scheduler asks, per module, whether the work can be
//! skipped because nothing the module depends on has changed since its last
//! completed run. The policy is a pure, pluggable predicate over version
//! counters: it never touches payloads and never mutates anything. Skipping
//! is only offered when every observed version matches the last completed
//! run exactly, so a conservative answer costs a redundant recomputation but
//! never a stale result.
//!
//! [`DefaultReexecutionStrategy`] is the standard policy.
//! [`AlwaysReexecuteStrategy`] disables caching entirely, which is the
//! reference behavior the default policy must agree with on final outputs.

use tracing::trace;

use crate::module::{ExecutionState, Module, RunSignature};

/// Everything the policy may look at for one module, assembled by the
/// scheduler at decision time.
#[derive(Debug)]
pub struct ReexecutionContext<'a> {
  /// The module under consideration.
  pub module: &'a Module,
  /// The run signature the current pass would record if the module executed
  /// now: current state version plus the versions visible on each connected
  /// input.
  pub current: RunSignature,
}

/// Decides whether a module's previous results are still valid.
///
/// Implementations must be pure: same context, same answer, no side effects.
pub trait ReexecutionStrategy: Send + Sync {
  /// Returns true if the module must execute in this pass.
  fn needs_execute(&self, context: &ReexecutionContext<'_>) -> bool;
}

/// The standard caching policy.
///
/// A module may be skipped only when all of the following hold: it is not
/// flagged always-execute, its last run completed successfully, its state
/// version is unchanged since that run, and every upstream output it consumes
/// reports the same publish version the last run observed (including the set
/// of connected inputs itself being unchanged).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultReexecutionStrategy;

impl ReexecutionStrategy for DefaultReexecutionStrategy {
  fn needs_execute(&self, context: &ReexecutionContext<'_>) -> bool {
    let module = context.module;
    if module.always_execute() {
      trace!(module = %module.id(), "needs execute: always-execute flag");
      return true;
    }
    if module.execution_state() != ExecutionState::Completed {
      trace!(module = %module.id(), "needs execute: no valid completed run");
      return true;
    }
    let Some(last) = module.last_run() else {
      return true;
    };
    if *last != context.current {
      trace!(module = %module.id(), "needs execute: inputs or state changed");
      return true;
    }
    trace!(module = %module.id(), "skipping: signature unchanged");
    false
  }
}

/// Caching disabled: every module runs on every pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReexecuteStrategy;

impl ReexecutionStrategy for AlwaysReexecuteStrategy {
  fn needs_execute(&self, _context: &ReexecutionContext<'_>) -> bool {
    true
  }
}
