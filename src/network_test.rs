//! # Network Test Suite
//!
//! Covers the structural surface of [`Network`]: module lifecycle, connection
//! validation, dynamic input groups with index compaction, topological
//! ordering, and the structural events published on the bus.

use crate::datatype::{InputHandles, OutputHandles};
use crate::error::{AlgorithmError, NetworkError};
use crate::events::{EngineEvent, EventNotification};
use crate::module::{Algorithm, ExecutionState, ModuleId};
use crate::network::Network;
use crate::port::{PortDescription, PortId};
use crate::registry::{ModuleDescription, ModuleLookupInfo, ModuleRegistry};
use crate::state::ModuleState;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Registry
// ============================================================================

struct NoopAlgorithm;

#[async_trait]
impl Algorithm for NoopAlgorithm {
  async fn execute(
    &self,
    _inputs: InputHandles,
    _state: &mut ModuleState,
  ) -> Result<OutputHandles, AlgorithmError> {
    Ok(OutputHandles::new())
  }
}

fn describe(
  name: &str,
  inputs: Vec<PortDescription>,
  outputs: Vec<PortDescription>,
) -> ModuleDescription {
  ModuleDescription {
    info: ModuleLookupInfo::new("Test", "Basic", name),
    input_ports: inputs,
    output_ports: outputs,
    has_algorithm: true,
    has_ui: false,
    default_state: vec![],
  }
}

/// Module types used across these tests: a matrix source, a filter, a sink,
/// a dynamic-input merge, and a source of a different payload type.
fn test_registry() -> Arc<ModuleRegistry> {
  let mut registry = ModuleRegistry::new();
  let noop: crate::registry::AlgorithmFactory = Arc::new(|| Arc::new(NoopAlgorithm));
  let types = vec![
    describe(
      "Source",
      vec![],
      vec![PortDescription::new("output", "Matrix")],
    ),
    describe(
      "Filter",
      vec![PortDescription::new("input", "Matrix")],
      vec![PortDescription::new("output", "Matrix")],
    ),
    describe(
      "Sink",
      vec![PortDescription::new("input", "Matrix")],
      vec![],
    ),
    describe(
      "Merge",
      vec![PortDescription::dynamic("inputs", "Matrix")],
      vec![PortDescription::new("output", "Matrix")],
    ),
    describe(
      "FieldSource",
      vec![],
      vec![PortDescription::new("field", "Field")],
    ),
  ];
  for description in types {
    registry.register(description, noop.clone()).unwrap();
  }
  Arc::new(registry)
}

fn recorded_events(network: &Network) -> Arc<Mutex<Vec<EngineEvent>>> {
  let log = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&log);
  network.events().subscribe(move |notification: &EventNotification| {
    sink.lock().unwrap().push(notification.event.clone());
  });
  log
}

// ============================================================================
// Module Lifecycle
// ============================================================================

#[test]
fn add_module_assigns_sequential_ids_per_type() {
  let mut network = Network::new(test_registry());
  assert_eq!(network.add_module("Source").unwrap(), ModuleId::new("Source", 0));
  assert_eq!(network.add_module("Source").unwrap(), ModuleId::new("Source", 1));
  assert_eq!(network.add_module("Sink").unwrap(), ModuleId::new("Sink", 0));
  assert_eq!(network.module_count(), 3);
}

#[test]
fn add_module_rejects_unknown_types() {
  let mut network = Network::new(test_registry());
  assert!(matches!(
    network.add_module("NoSuchType"),
    Err(NetworkError::UnknownModuleType(_))
  ));
  assert_eq!(network.module_count(), 0);
}

#[test]
fn fresh_modules_start_not_executed() {
  let mut network = Network::new(test_registry());
  let id = network.add_module("Source").unwrap();
  let module = network.module(&id).unwrap();
  assert_eq!(module.execution_state(), ExecutionState::NotExecuted);
  assert!(module.error_message().is_none());
}

#[test]
fn instance_counters_are_never_reused() {
  let mut network = Network::new(test_registry());
  let first = network.add_module("Source").unwrap();
  network.remove_module(&first);
  let second = network.add_module("Source").unwrap();
  assert_eq!(second, ModuleId::new("Source", 1));
}

#[test]
fn remove_module_drops_touching_connections() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let filter = network.add_module("Filter").unwrap();
  let sink = network.add_module("Sink").unwrap();
  network.connect(&source, "output", &filter, "input").unwrap();
  network.connect(&filter, "output", &sink, "input").unwrap();

  network.remove_module(&filter);
  assert_eq!(network.module_count(), 2);
  assert_eq!(network.connection_count(), 0);
}

#[test]
fn remove_module_drops_every_touching_connection_at_once() {
  let mut network = Network::new(test_registry());
  let a = network.add_module("Source").unwrap();
  let b = network.add_module("Source").unwrap();
  let merge = network.add_module("Merge").unwrap();
  let sinks: Vec<_> = (0..3)
    .map(|_| network.add_module("Sink").unwrap())
    .collect();
  network.connect(&a, "output", &merge, "inputs").unwrap();
  network.connect(&b, "output", &merge, "inputs").unwrap();
  for sink in &sinks {
    network.connect(&merge, "output", sink, "input").unwrap();
  }
  assert_eq!(network.connection_count(), 5);

  // Two incoming plus three outgoing all go with the module.
  network.remove_module(&merge);
  assert_eq!(network.connection_count(), 0);
  assert_eq!(network.module_count(), 5);
  assert!(network.module(&merge).is_none());
}

#[test]
fn remove_module_is_idempotent() {
  let mut network = Network::new(test_registry());
  let id = network.add_module("Source").unwrap();
  network.remove_module(&id);
  // Second removal of the same id is a silent no-op.
  network.remove_module(&id);
  assert_eq!(network.module_count(), 0);
}

// ============================================================================
// Connection Validation
// ============================================================================

#[test]
fn connect_links_compatible_ports() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let sink = network.add_module("Sink").unwrap();
  let id = network.connect(&source, "output", &sink, "input").unwrap();

  let connection = network.connection(id).unwrap();
  assert_eq!(connection.from_module, source);
  assert_eq!(connection.to_module, sink);
  assert_eq!(network.connection_count(), 1);
  assert_eq!(
    network.connection_id_for(&source, "output", &sink, &PortId::new(0, "input")),
    Some(id)
  );
}

#[test]
fn occupied_static_input_rejects_a_second_connection() {
  let mut network = Network::new(test_registry());
  let first = network.add_module("Source").unwrap();
  let second = network.add_module("Source").unwrap();
  let sink = network.add_module("Sink").unwrap();
  network.connect(&first, "output", &sink, "input").unwrap();
  assert!(matches!(
    network.connect(&second, "output", &sink, "input"),
    Err(NetworkError::PortOccupied { .. })
  ));
  assert_eq!(network.connection_count(), 1);
}

#[test]
fn outputs_fan_out_freely() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let first = network.add_module("Sink").unwrap();
  let second = network.add_module("Sink").unwrap();
  network.connect(&source, "output", &first, "input").unwrap();
  network.connect(&source, "output", &second, "input").unwrap();
  assert_eq!(network.outgoing(&source).count(), 2);
}

#[test]
fn type_tags_must_match() {
  let mut network = Network::new(test_registry());
  let fields = network.add_module("FieldSource").unwrap();
  let sink = network.add_module("Sink").unwrap();
  assert!(matches!(
    network.connect(&fields, "field", &sink, "input"),
    Err(NetworkError::TypeMismatch { .. })
  ));
  // The failed mutation left the graph untouched.
  assert_eq!(network.connection_count(), 0);
  assert_eq!(network.module_count(), 2);
}

#[test]
fn connect_then_disconnect_restores_prior_structure() {
  let mut network = Network::new(test_registry());
  let a = network.add_module("Source").unwrap();
  let b = network.add_module("Source").unwrap();
  let merge = network.add_module("Merge").unwrap();
  let sink = network.add_module("Sink").unwrap();
  network.connect(&a, "output", &merge, "inputs").unwrap();
  network.connect(&merge, "output", &sink, "input").unwrap();

  let before: Vec<(ModuleId, PortId, ModuleId, PortId)> = network
    .connections()
    .iter()
    .map(|connection| {
      (
        connection.from_module.clone(),
        connection.from_port.clone(),
        connection.to_module.clone(),
        connection.to_port.clone(),
      )
    })
    .collect();

  let transient = network.connect(&b, "output", &merge, "inputs").unwrap();
  network.disconnect(transient).unwrap();

  let after: Vec<(ModuleId, PortId, ModuleId, PortId)> = network
    .connections()
    .iter()
    .map(|connection| {
      (
        connection.from_module.clone(),
        connection.from_port.clone(),
        connection.to_module.clone(),
        connection.to_port.clone(),
      )
    })
    .collect();
  assert_eq!(before, after);
  assert_eq!(network.module_count(), 4);
  assert_eq!(
    network.module(&merge).unwrap().input_ports().group_width("inputs"),
    1
  );
}

#[test]
fn self_connections_are_rejected() {
  let mut network = Network::new(test_registry());
  let filter = network.add_module("Filter").unwrap();
  assert!(matches!(
    network.connect(&filter, "output", &filter, "input"),
    Err(NetworkError::SelfConnection(_))
  ));
}

#[test]
fn unknown_ports_and_modules_are_rejected() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let sink = network.add_module("Sink").unwrap();
  assert!(matches!(
    network.connect(&source, "bogus", &sink, "input"),
    Err(NetworkError::PortNotFound { .. })
  ));
  assert!(matches!(
    network.connect(&source, "output", &sink, "bogus"),
    Err(NetworkError::PortNotFound { .. })
  ));
  let ghost = ModuleId::new("Source", 99);
  assert!(matches!(
    network.connect(&ghost, "output", &sink, "input"),
    Err(NetworkError::ModuleNotFound(_))
  ));
}

#[test]
fn disconnect_unknown_id_is_an_error() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let sink = network.add_module("Sink").unwrap();
  let id = network.connect(&source, "output", &sink, "input").unwrap();
  network.disconnect(id).unwrap();
  assert!(matches!(
    network.disconnect(id),
    Err(NetworkError::ConnectionNotFound(_))
  ));
}

// ============================================================================
// Dynamic Input Groups
// ============================================================================

#[test]
fn dynamic_group_grows_one_slot_per_connection() {
  let mut network = Network::new(test_registry());
  let a = network.add_module("Source").unwrap();
  let b = network.add_module("Source").unwrap();
  let merge = network.add_module("Merge").unwrap();

  network.connect(&a, "output", &merge, "inputs").unwrap();
  network.connect(&b, "output", &merge, "inputs").unwrap();

  let inputs = network.module(&merge).unwrap().input_ports();
  assert_eq!(inputs.group_width("inputs"), 2);
  let slots: Vec<PortId> = network.incoming(&merge).map(|c| c.to_port.clone()).collect();
  assert!(slots.contains(&PortId::new(0, "inputs")));
  assert!(slots.contains(&PortId::new(1, "inputs")));
}

#[test]
fn removing_a_dynamic_slot_compacts_and_retargets() {
  let mut network = Network::new(test_registry());
  let a = network.add_module("Source").unwrap();
  let b = network.add_module("Source").unwrap();
  let c = network.add_module("Source").unwrap();
  let merge = network.add_module("Merge").unwrap();

  let first = network.connect(&a, "output", &merge, "inputs").unwrap();
  network.connect(&b, "output", &merge, "inputs").unwrap();
  network.connect(&c, "output", &merge, "inputs").unwrap();

  // Dropping slot 0 shifts the survivors down; their connections follow.
  network.disconnect(first).unwrap();
  let inputs = network.module(&merge).unwrap().input_ports();
  assert_eq!(inputs.group_width("inputs"), 2);

  let mut endpoints: Vec<(ModuleId, usize)> = network
    .incoming(&merge)
    .map(|connection| (connection.from_module.clone(), connection.to_port.index))
    .collect();
  endpoints.sort_by_key(|(_, index)| *index);
  assert_eq!(endpoints, vec![(b.clone(), 0), (c.clone(), 1)]);
}

// ============================================================================
// Topological Order
// ============================================================================

#[test]
fn topological_order_respects_dependencies() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let filter = network.add_module("Filter").unwrap();
  let sink = network.add_module("Sink").unwrap();
  network.connect(&filter, "output", &sink, "input").unwrap();
  network.connect(&source, "output", &filter, "input").unwrap();

  let order = network.topological_order().unwrap();
  let position =
    |id: &ModuleId| order.iter().position(|candidate| candidate == id).unwrap();
  assert!(position(&source) < position(&filter));
  assert!(position(&filter) < position(&sink));
}

#[test]
fn topological_order_breaks_ties_by_creation_order() {
  let mut network = Network::new(test_registry());
  let first = network.add_module("Source").unwrap();
  let second = network.add_module("Source").unwrap();
  let third = network.add_module("Source").unwrap();
  // No connections at all: order must be creation order, every time.
  let order = network.topological_order().unwrap();
  assert_eq!(order, vec![first, second, third]);
  assert_eq!(network.topological_order().unwrap(), order);
}

#[test]
fn cycles_are_detected() {
  let mut network = Network::new(test_registry());
  let a = network.add_module("Filter").unwrap();
  let b = network.add_module("Filter").unwrap();
  network.connect(&a, "output", &b, "input").unwrap();
  network.connect(&b, "output", &a, "input").unwrap();
  assert!(matches!(
    network.topological_order(),
    Err(NetworkError::CycleDetected)
  ));
}

#[test]
fn ancestors_and_descendants_are_transitive() {
  let mut network = Network::new(test_registry());
  let source = network.add_module("Source").unwrap();
  let filter = network.add_module("Filter").unwrap();
  let sink = network.add_module("Sink").unwrap();
  let lone = network.add_module("Source").unwrap();
  network.connect(&source, "output", &filter, "input").unwrap();
  network.connect(&filter, "output", &sink, "input").unwrap();

  let ancestors = network.ancestors_of(&sink).unwrap();
  assert_eq!(ancestors, vec![source.clone(), filter.clone(), sink.clone()]);
  let descendants = network.descendants_of(&source).unwrap();
  assert_eq!(descendants, vec![source, filter, sink]);
  assert_eq!(network.ancestors_of(&lone).unwrap(), vec![lone]);
}

// ============================================================================
// Structural Events
// ============================================================================

#[test]
fn structural_mutations_publish_events() {
  let mut network = Network::new(test_registry());
  let log = recorded_events(&network);

  let source = network.add_module("Source").unwrap();
  let sink = network.add_module("Sink").unwrap();
  let connection = network.connect(&source, "output", &sink, "input").unwrap();
  network.disconnect(connection).unwrap();
  network.remove_module(&source);

  let events = log.lock().unwrap();
  assert!(matches!(events[0], EngineEvent::ModuleAdded { .. }));
  assert!(matches!(events[1], EngineEvent::ModuleAdded { .. }));
  assert!(matches!(events[2], EngineEvent::ConnectionAdded { .. }));
  assert!(matches!(events[3], EngineEvent::ConnectionRemoved { .. }));
  assert!(matches!(events[4], EngineEvent::ModuleRemoved { .. }));
}

#[test]
fn rejected_connections_publish_invalid_connection() {
  let mut network = Network::new(test_registry());
  let log = recorded_events(&network);
  let fields = network.add_module("FieldSource").unwrap();
  let sink = network.add_module("Sink").unwrap();
  let _ = network.connect(&fields, "field", &sink, "input");

  let events = log.lock().unwrap();
  assert!(events
    .iter()
    .any(|event| matches!(event, EngineEvent::InvalidConnection { .. })));
}
