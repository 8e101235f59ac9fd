//! # Shared Payload Handles
//!
//! Data exchanged between modules is opaque to the engine: a mesh, a field,
//! a matrix, or any other datatype produced by an algorithm body. The engine
//! only moves reference-counted handles between output and input ports, so a
//! payload produced once can be read by every downstream consumer without
//! copying.
//!
//! ## Immutability After Publish
//!
//! Once a handle has been published on an output port, the producing module
//! must treat the payload as immutable. Multiple downstream modules may hold
//! the same handle at different points of an execution pass; mutating the
//! payload after publishing is a caller bug. This is a documented contract,
//! not an enforced one (`Arc` alone cannot prevent interior mutability).

use crate::port::PortId;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A reference-counted, type-erased payload handle.
///
/// Algorithm bodies downcast to their expected concrete type when reading
/// inputs, mirroring the connect-time type-tag check performed by the network.
pub type DatatypeHandle = Arc<dyn Any + Send + Sync>;

/// Input payloads collected for one module execution, keyed by input port.
///
/// A port with no upstream data (unconnected, or upstream produced nothing)
/// is simply absent from the map; the algorithm body decides whether that is
/// an error for a required input or acceptable for an optional one.
pub type InputHandles = HashMap<PortId, DatatypeHandle>;

/// Output payloads returned by one module execution, keyed by output port.
pub type OutputHandles = HashMap<PortId, DatatypeHandle>;

/// Downcasts an input handle to a concrete payload type.
///
/// Returns `None` if the handle holds a different type. Convenience for
/// algorithm bodies; equivalent to `handle.downcast::<T>().ok()`.
pub fn downcast<T: Any + Send + Sync>(handle: DatatypeHandle) -> Option<Arc<T>> {
  handle.downcast::<T>().ok()
}
