//! # Error Taxonomy
//!
//! Two error families cross the engine's boundaries:
//!
//! - [`NetworkError`]: structural errors raised synchronously from graph
//!   mutation and query calls. Mutations are all-or-nothing; when one of
//!   these is returned the graph is exactly as it was before the call.
//! - [`AlgorithmError`]: expected, recoverable failures from a module's
//!   algorithm body (missing required input, precondition violation). These
//!   never cross the scheduler boundary as panics; the scheduler records them
//!   on the failing module's execution state and propagates the failure to
//!   downstream modules.

use thiserror::Error;

use crate::module::ModuleId;
use crate::network::ConnectionId;
use crate::port::{PortDirection, PortId};

/// Structural errors from network mutation and query calls.
///
/// The failed call leaves the network unchanged.
#[derive(Debug, Error)]
pub enum NetworkError {
  /// `add_module` was given a name absent from the registry.
  #[error("unknown module type '{0}'")]
  UnknownModuleType(String),

  /// A module type was registered twice under the same name.
  #[error("module type '{0}' is already registered")]
  DuplicateModuleType(String),

  /// An operation referenced a module id not present in the network.
  #[error("module '{0}' not found")]
  ModuleNotFound(ModuleId),

  /// An operation referenced a port the module does not declare.
  #[error("module '{module}' has no {direction} port named '{port}'")]
  PortNotFound {
    /// Module that was searched.
    module: ModuleId,
    /// Side of the module that was searched.
    direction: PortDirection,
    /// Port name that was not found.
    port: String,
  },

  /// A connection targeted a non-dynamic input port that already has one.
  #[error("input port {port} on module '{module}' is already occupied")]
  PortOccupied {
    /// Destination module.
    module: ModuleId,
    /// Occupied input port.
    port: PortId,
  },

  /// The output and input payload type tags are incompatible.
  #[error("type mismatch: cannot connect '{from_type}' output to '{to_type}' input")]
  TypeMismatch {
    /// Source port's payload type tag.
    from_type: String,
    /// Destination port's payload type tag.
    to_type: String,
  },

  /// A connection would link a module to itself.
  #[error("cannot connect module '{0}' to itself")]
  SelfConnection(ModuleId),

  /// `disconnect` was given an id that names no current connection.
  #[error("connection {0} not found")]
  ConnectionNotFound(ConnectionId),

  /// The connection graph is not a DAG; no execution order exists.
  #[error("network contains a cycle; execution order is undefined")]
  CycleDetected,

  /// A serialized network document could not be read or written.
  #[error("network serialization error: {0}")]
  Serialization(String),
}

/// Expected, recoverable failures from an algorithm body.
///
/// Bodies convert every anticipated failure mode into one of these variants
/// instead of panicking; the scheduler turns the error into the module's
/// `Errored` execution state and its recorded message.
#[derive(Debug, Error)]
pub enum AlgorithmError {
  /// A required input port carried no data.
  #[error("required input missing on port {0}")]
  MissingInput(PortId),

  /// Input data was present but the wrong payload type.
  #[error("wrong datatype on port {port}: {message}")]
  WrongDatatype {
    /// Port that carried the unexpected payload.
    port: PortId,
    /// What was expected versus received.
    message: String,
  },

  /// An algorithm precondition was violated.
  #[error("precondition violated: {0}")]
  Precondition(String),

  /// Any other failure internal to the body.
  #[error("{0}")]
  Internal(String),
}
