//! # NetWeave
//!
//! A headless execution engine for dataflow networks of scientific
//! computation modules.
//!
//! A network is a directed acyclic graph: modules carry typed input and
//! output ports, connections move opaque payload handles from an output to an
//! input, and the scheduler runs modules in dependency order with a caching
//! policy that skips work whose inputs have not changed since the last pass.
//!
//! ## Key Pieces
//!
//! - **Network**: the module/connection graph and every mutation over it
//! - **Module**: ports, parameter state, execution state machine, and an
//!   async [`module::Algorithm`] body behind a trait
//! - **ExecutionScheduler**: topological-order passes, one module at a time,
//!   with fail-fast propagation of upstream errors
//! - **ReexecutionStrategy**: pluggable version-counter caching policy
//! - **Serialization**: JSON save/load of the abstract network structure
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netweave::network::Network;
//! use netweave::registry::ModuleRegistry;
//! use netweave::scheduler::ExecutionScheduler;
//!
//! # async fn run(registry: Arc<ModuleRegistry>) -> Result<(), netweave::error::NetworkError> {
//! let mut network = Network::new(registry);
//! let source = network.add_module("CreateMatrix")?;
//! let report = network.add_module("ReportMatrixInfo")?;
//! network.connect(&source, "output", &report, "input")?;
//!
//! let scheduler = ExecutionScheduler::default();
//! scheduler.execute_all(&mut network).await?;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Type-erased, reference-counted payload handles moved between ports.
pub mod datatype;
/// Structural and algorithm error taxonomies.
pub mod error;
/// Engine event bus for structural and execution notifications.
pub mod events;
/// Module instances: ports, state, execution lifecycle, algorithm trait.
pub mod module;
/// The module/connection graph and its mutation and query surface.
pub mod network;
/// Port identities, descriptions, and static/dynamic port sets.
pub mod port;
/// Re-execution caching policy.
pub mod reexecute;
/// Module type registry and factories.
pub mod registry;
/// The dependency-ordered execution scheduler.
pub mod scheduler;
/// JSON save/load of the abstract network structure.
pub mod serialization;
/// Per-module persisted and transient parameter state.
pub mod state;

#[cfg(test)]
mod network_test;
