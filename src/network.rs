//! # Network
//!
//! The single source of truth for graph topology: the module set, the
//! connection set, and every mutation and query over them. Mutations are
//! all-or-nothing; a call that returns an error leaves the graph exactly as
//! it found it.
//!
//! ## Dynamic Port Renumbering
//!
//! Connecting to a dynamic input port grows that group by one slot before
//! attaching; disconnecting a dynamic slot removes it and compacts the
//! remaining indices to stay dense. Both mutations renumber ports after the
//! affected slot, and the network retargets every connection touching a
//! shifted port as part of the same operation — the graph and the port sets
//! never disagree, even transiently between calls.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::datatype::InputHandles;
use crate::error::NetworkError;
use crate::events::{EngineEvent, EventBus};
use crate::module::{ExecutionState, Module, ModuleId};
use crate::port::{PortDirection, PortId, PortShift};
use crate::registry::ModuleRegistry;

/// Opaque identifier for one connection, unique for the network's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "connection#{}", self.0)
  }
}

/// A directed edge from one output port to one input port.
///
/// The connection is a pair of endpoint references, not an owner of either
/// port; port lifetimes are tied to their modules.
#[derive(Clone, Debug)]
pub struct Connection {
  /// Network-unique id.
  pub id: ConnectionId,
  /// Source module.
  pub from_module: ModuleId,
  /// Source output port.
  pub from_port: PortId,
  /// Destination module.
  pub to_module: ModuleId,
  /// Destination input port (a specific slot for dynamic groups).
  pub to_port: PortId,
}

/// The module/connection graph.
pub struct Network {
  registry: Arc<ModuleRegistry>,
  modules: HashMap<ModuleId, Module>,
  creation_order: Vec<ModuleId>,
  connections: Vec<Connection>,
  instance_counters: HashMap<String, usize>,
  next_connection: u64,
  events: EventBus,
}

impl Network {
  /// Creates an empty network resolving module types against `registry`,
  /// with a fresh (subscriber-less) event bus.
  pub fn new(registry: Arc<ModuleRegistry>) -> Self {
    Self::with_events(registry, EventBus::new())
  }

  /// Creates an empty network publishing on an existing bus, so structural
  /// and execution events can share one subscriber list.
  pub fn with_events(registry: Arc<ModuleRegistry>, events: EventBus) -> Self {
    Self {
      registry,
      modules: HashMap::new(),
      creation_order: Vec::new(),
      connections: Vec::new(),
      instance_counters: HashMap::new(),
      next_connection: 0,
      events,
    }
  }

  /// The bus this network publishes structural events on.
  pub fn events(&self) -> &EventBus {
    &self.events
  }

  /// The registry this network resolves module types against.
  pub fn registry(&self) -> &Arc<ModuleRegistry> {
    &self.registry
  }

  // ==========================================================================
  // Mutation
  // ==========================================================================

  /// Adds a module of the named type.
  ///
  /// Looks the constructor up in the registry, assigns a fresh id (logical
  /// name plus per-name instance counter, never reused while the network
  /// lives), installs the type's default state, and starts the execution
  /// state machine at `NotExecuted`.
  ///
  /// # Errors
  ///
  /// `UnknownModuleType` if the registry has no such type.
  pub fn add_module(&mut self, name: &str) -> Result<ModuleId, NetworkError> {
    let (description, state, algorithm) = self.registry.instantiate(name)?;
    let counter = self.instance_counters.entry(name.to_string()).or_insert(0);
    let id = ModuleId::new(name, *counter);
    *counter += 1;

    let module = Module::new(
      id.clone(),
      description.info.clone(),
      state,
      crate::port::InputPortSet::from_descriptions(&description.input_ports),
      crate::port::OutputPortSet::from_descriptions(&description.output_ports),
      algorithm,
    );
    self.modules.insert(id.clone(), module);
    self.creation_order.push(id.clone());
    info!(module = %id, "module added");
    self.events.emit(EngineEvent::ModuleAdded { id: id.clone() });
    Ok(id)
  }

  /// Removes a module and every connection touching it.
  ///
  /// A no-op when the id is unknown (removal is idempotent by contract).
  pub fn remove_module(&mut self, id: &ModuleId) {
    if !self.modules.contains_key(id) {
      debug!(module = %id, "remove_module: unknown id, ignoring");
      return;
    }
    let touching: Vec<ConnectionId> = self
      .connections
      .iter()
      .filter(|connection| connection.from_module == *id || connection.to_module == *id)
      .map(|connection| connection.id)
      .collect();
    for connection_id in touching {
      // Ids stay valid across the renumbering each disconnect may trigger.
      let _ = self.disconnect(connection_id);
    }
    self.modules.remove(id);
    self.creation_order.retain(|existing| existing != id);
    info!(module = %id, "module removed");
    self.events.emit(EngineEvent::ModuleRemoved { id: id.clone() });
  }

  /// Connects an output port to an input port.
  ///
  /// Ports are addressed by base name; connecting to a dynamic input grows
  /// that group by one slot and attaches to the new slot.
  ///
  /// # Errors
  ///
  /// `ModuleNotFound`, `PortNotFound`, `SelfConnection`, `TypeMismatch`, or
  /// `PortOccupied` (non-dynamic input already connected). On any error the
  /// graph is unchanged and an `InvalidConnection` event is published.
  pub fn connect(
    &mut self,
    from: &ModuleId,
    from_port: &str,
    to: &ModuleId,
    to_port: &str,
  ) -> Result<ConnectionId, NetworkError> {
    match self.try_connect(from, from_port, to, to_port) {
      Ok(id) => {
        info!(connection = %id, %from, from_port, %to, to_port, "connected");
        self.events.emit(EngineEvent::ConnectionAdded { id });
        Ok(id)
      }
      Err(error) => {
        warn!(%from, from_port, %to, to_port, %error, "connection rejected");
        self.events.emit(EngineEvent::InvalidConnection {
          reason: error.to_string(),
        });
        Err(error)
      }
    }
  }

  fn try_connect(
    &mut self,
    from: &ModuleId,
    from_port: &str,
    to: &ModuleId,
    to_port: &str,
  ) -> Result<ConnectionId, NetworkError> {
    if from == to {
      return Err(NetworkError::SelfConnection(from.clone()));
    }
    let source = self
      .modules
      .get(from)
      .ok_or_else(|| NetworkError::ModuleNotFound(from.clone()))?;
    let output = source
      .output_ports()
      .by_name(from_port)
      .ok_or_else(|| NetworkError::PortNotFound {
        module: from.clone(),
        direction: PortDirection::Output,
        port: from_port.to_string(),
      })?;
    let out_type = output.port_type.clone();
    let out_id = output.id.clone();

    let destination = self
      .modules
      .get(to)
      .ok_or_else(|| NetworkError::ModuleNotFound(to.clone()))?;

    // Resolve the destination: a dynamic template grows a new slot, a static
    // port must be free. All checks run before any mutation.
    enum Destination {
      Static(PortId, String),
      Dynamic(String),
    }
    let resolved = if let Some(template) = destination.input_ports().template(to_port) {
      Destination::Dynamic(template.port_type.clone())
    } else if let Some(port) = destination.input_ports().by_name(to_port) {
      Destination::Static(port.id.clone(), port.port_type.clone())
    } else {
      return Err(NetworkError::PortNotFound {
        module: to.clone(),
        direction: PortDirection::Input,
        port: to_port.to_string(),
      });
    };

    let in_type = match &resolved {
      Destination::Static(_, port_type) | Destination::Dynamic(port_type) => port_type.clone(),
    };
    if out_type != in_type {
      return Err(NetworkError::TypeMismatch {
        from_type: out_type,
        to_type: in_type,
      });
    }

    let dest_port = match resolved {
      Destination::Static(port_id, _) => {
        let occupied = self
          .connections
          .iter()
          .any(|connection| connection.to_module == *to && connection.to_port == port_id);
        if occupied {
          return Err(NetworkError::PortOccupied {
            module: to.clone(),
            port: port_id,
          });
        }
        port_id
      }
      Destination::Dynamic(_) => {
        // Validation is done; grow the group, then retarget connections to
        // any slot whose index moved as part of the same mutation.
        let (slot_id, shifts) = self
          .modules
          .get_mut(to)
          .and_then(|module| module.add_dynamic_port(to_port))
          .ok_or_else(|| NetworkError::PortNotFound {
            module: to.clone(),
            direction: PortDirection::Input,
            port: to_port.to_string(),
          })?;
        self.retarget(to, &shifts);
        slot_id
      }
    };

    let id = ConnectionId(self.next_connection);
    self.next_connection += 1;
    self.connections.push(Connection {
      id,
      from_module: from.clone(),
      from_port: out_id,
      to_module: to.clone(),
      to_port: dest_port,
    });
    Ok(id)
  }

  /// Removes a connection.
  ///
  /// If the destination was a dynamic slot the group shrinks, subsequent
  /// slot indices are compacted to stay dense, and connections to shifted
  /// slots are retargeted within the same mutation.
  ///
  /// # Errors
  ///
  /// `ConnectionNotFound` if the id names no current connection.
  pub fn disconnect(&mut self, id: ConnectionId) -> Result<(), NetworkError> {
    let position = self
      .connections
      .iter()
      .position(|connection| connection.id == id)
      .ok_or(NetworkError::ConnectionNotFound(id))?;
    let connection = self.connections.remove(position);

    let was_dynamic = self
      .modules
      .get(&connection.to_module)
      .and_then(|module| module.input_ports().get(&connection.to_port))
      .map(|port| port.dynamic)
      .unwrap_or(false);
    if was_dynamic {
      if let Some(shifts) = self
        .modules
        .get_mut(&connection.to_module)
        .and_then(|module| module.remove_dynamic_port(&connection.to_port))
      {
        self.retarget(&connection.to_module, &shifts);
      }
    }
    info!(connection = %id, "disconnected");
    self.events.emit(EngineEvent::ConnectionRemoved { id });
    Ok(())
  }

  // Rewrites connection endpoints after a dynamic-group mutation on one
  // module's input set.
  fn retarget(&mut self, module: &ModuleId, shifts: &[PortShift]) {
    if shifts.is_empty() {
      return;
    }
    for connection in &mut self.connections {
      if connection.to_module != *module {
        continue;
      }
      if let Some(shift) = shifts.iter().find(|shift| shift.from == connection.to_port) {
        connection.to_port = shift.to.clone();
      }
    }
  }

  /// Resets every module to `NotExecuted`, clearing recorded errors and run
  /// signatures. The next pass recomputes everything.
  pub fn reset_execution_state(&mut self) {
    for module in self.modules.values_mut() {
      module.reset_execution();
    }
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  /// Number of modules.
  pub fn module_count(&self) -> usize {
    self.modules.len()
  }

  /// Number of connections.
  pub fn connection_count(&self) -> usize {
    self.connections.len()
  }

  /// Looks up a module by id.
  pub fn module(&self, id: &ModuleId) -> Option<&Module> {
    self.modules.get(id)
  }

  /// Mutable module lookup (state editing, always-execute flag).
  pub fn module_mut(&mut self, id: &ModuleId) -> Option<&mut Module> {
    self.modules.get_mut(id)
  }

  /// Module ids in creation order.
  pub fn module_ids(&self) -> &[ModuleId] {
    &self.creation_order
  }

  /// All connections, in creation order.
  pub fn connections(&self) -> &[Connection] {
    &self.connections
  }

  /// Looks up a connection by id.
  pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
    self
      .connections
      .iter()
      .find(|connection| connection.id == id)
  }

  /// Finds the connection id for a (source, destination) endpoint pair.
  pub fn connection_id_for(
    &self,
    from: &ModuleId,
    from_port: &str,
    to: &ModuleId,
    to_port: &PortId,
  ) -> Option<ConnectionId> {
    self
      .connections
      .iter()
      .find(|connection| {
        connection.from_module == *from
          && connection.from_port.name == from_port
          && connection.to_module == *to
          && connection.to_port == *to_port
      })
      .map(|connection| connection.id)
  }

  /// Connections whose destination is the given module.
  pub fn incoming(&self, id: &ModuleId) -> impl Iterator<Item = &Connection> {
    self
      .connections
      .iter()
      .filter(move |connection| connection.to_module == *id)
  }

  /// Connections whose source is the given module.
  pub fn outgoing(&self, id: &ModuleId) -> impl Iterator<Item = &Connection> {
    self
      .connections
      .iter()
      .filter(move |connection| connection.from_module == *id)
  }

  /// Computes a deterministic topological execution order.
  ///
  /// For every connection (a → b), a precedes b; ties are broken by module
  /// creation order, so the result is stable across calls on an unchanged
  /// graph. Never mutates.
  ///
  /// # Errors
  ///
  /// `CycleDetected` if the connection graph is not a DAG.
  pub fn topological_order(&self) -> Result<Vec<ModuleId>, NetworkError> {
    let rank: HashMap<&ModuleId, usize> = self
      .creation_order
      .iter()
      .enumerate()
      .map(|(position, id)| (id, position))
      .collect();

    let mut in_degree: HashMap<&ModuleId, usize> = HashMap::new();
    let mut adjacency: HashMap<&ModuleId, Vec<&ModuleId>> = HashMap::new();
    for id in &self.creation_order {
      in_degree.insert(id, 0);
      adjacency.insert(id, Vec::new());
    }
    for connection in &self.connections {
      if let (Some(_), Some(slot)) = (
        rank.get(&connection.from_module),
        in_degree.get_mut(&connection.to_module),
      ) {
        *slot += 1;
        if let Some(neighbors) = adjacency.get_mut(&connection.from_module) {
          neighbors.push(&connection.to_module);
        }
      }
    }

    // Kahn's algorithm with a creation-order priority queue for determinism.
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;
    let mut ready: BinaryHeap<Reverse<(usize, &ModuleId)>> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(id, _)| Reverse((rank[*id], *id)))
      .collect();

    let mut order = Vec::with_capacity(self.creation_order.len());
    while let Some(Reverse((_, id))) = ready.pop() {
      order.push(id.clone());
      if let Some(neighbors) = adjacency.get(id) {
        for neighbor in neighbors {
          if let Some(degree) = in_degree.get_mut(neighbor) {
            *degree -= 1;
            if *degree == 0 {
              ready.push(Reverse((rank[neighbor], *neighbor)));
            }
          }
        }
      }
    }

    if order.len() != self.creation_order.len() {
      return Err(NetworkError::CycleDetected);
    }
    Ok(order)
  }

  /// The target plus every module it transitively depends on, in a valid
  /// execution order.
  pub fn ancestors_of(&self, id: &ModuleId) -> Result<Vec<ModuleId>, NetworkError> {
    let required = self.closure(id, |network, module| {
      network
        .incoming(module)
        .map(|connection| connection.from_module.clone())
        .collect()
    });
    Ok(
      self
        .topological_order()?
        .into_iter()
        .filter(|module| required.contains(module))
        .collect(),
    )
  }

  /// The target plus every module transitively reachable from it, in a valid
  /// execution order.
  pub fn descendants_of(&self, id: &ModuleId) -> Result<Vec<ModuleId>, NetworkError> {
    let reachable = self.closure(id, |network, module| {
      network
        .outgoing(module)
        .map(|connection| connection.to_module.clone())
        .collect()
    });
    Ok(
      self
        .topological_order()?
        .into_iter()
        .filter(|module| reachable.contains(module))
        .collect(),
    )
  }

  fn closure(
    &self,
    start: &ModuleId,
    neighbors: impl Fn(&Self, &ModuleId) -> Vec<ModuleId>,
  ) -> HashSet<ModuleId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start.clone());
    queue.push_back(start.clone());
    while let Some(current) = queue.pop_front() {
      for next in neighbors(self, &current) {
        if seen.insert(next.clone()) {
          queue.push_back(next);
        }
      }
    }
    seen
  }

  // ==========================================================================
  // Scheduler support
  // ==========================================================================

  /// Gathers the payload handles and publish versions currently visible on a
  /// module's input ports. Handles are shared, not copied; a port whose
  /// upstream has produced nothing is present in the version map (at 0) but
  /// absent from the handle map.
  pub(crate) fn collect_inputs(&self, id: &ModuleId) -> (InputHandles, BTreeMap<PortId, u64>) {
    let mut handles = InputHandles::new();
    let mut versions = BTreeMap::new();
    for connection in self.incoming(id) {
      let Some(source) = self.modules.get(&connection.from_module) else {
        continue;
      };
      let Some(output) = source.output_ports().get(&connection.from_port) else {
        continue;
      };
      versions.insert(connection.to_port.clone(), output.version());
      if let Some(handle) = output.data() {
        handles.insert(connection.to_port.clone(), handle);
      }
    }
    (handles, versions)
  }

  /// Returns the id of a directly-upstream module currently in the `Errored`
  /// state, if any.
  pub(crate) fn errored_upstream(&self, id: &ModuleId) -> Option<ModuleId> {
    self.incoming(id).find_map(|connection| {
      let source = self.modules.get(&connection.from_module)?;
      (source.execution_state() == ExecutionState::Errored)
        .then(|| connection.from_module.clone())
    })
  }
}
