//! # Ports
//!
//! A port is a typed, named attachment point on a module. Input ports receive
//! data from at most one upstream connection per slot (dynamic input groups
//! accept many, one per slot); output ports fan out to any number of
//! downstream connections.
//!
//! ## Static and Dynamic Ports
//!
//! Static ports are fixed at module construction time. A dynamic input port
//! is declared once as a *template* and grows one slot per connection made to
//! it; disconnecting a slot removes it and compacts the remaining slot
//! indices so they stay dense. Slot removal shifts the indices of every port
//! after the removed slot; the [`PortShift`] records returned by the mutation
//! let the network retarget affected connections as part of the same atomic
//! operation.
//!
//! Dynamic slots always occupy the tail region of a module's input set:
//! static ports keep their declaration-order indices, and dynamic groups grow
//! after them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::datatype::DatatypeHandle;

/// Identifies one port within a module's input set or output set.
///
/// The pair of sequential index and logical name is unique per set. Slots of
/// a dynamic group share the base name and are distinguished by index, so
/// "slot 2 of a 5-wide dynamic group" never collides with a static port of
/// the same name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId {
  /// Sequential index within the owning port set (dense, 0-based).
  pub index: usize,
  /// Logical port name; shared by all slots of a dynamic group.
  pub name: String,
}

impl PortId {
  /// Creates a new port id.
  pub fn new(index: usize, name: impl Into<String>) -> Self {
    Self {
      index,
      name: name.into(),
    }
  }
}

impl fmt::Display for PortId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[{}]", self.name, self.index)
  }
}

/// Which side of a module a port sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
  /// Receives data from an upstream output port.
  Input,
  /// Publishes data to downstream input ports.
  Output,
}

impl fmt::Display for PortDirection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PortDirection::Input => write!(f, "input"),
      PortDirection::Output => write!(f, "output"),
    }
  }
}

/// Static description of a port, as registered for a module type.
///
/// The payload type is a tag string ("Matrix", "Field", ...) compared for
/// equality at connect time; the engine never inspects payloads itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDescription {
  /// Logical port name.
  pub name: String,
  /// Payload type tag used for connect-time compatibility checking.
  pub port_type: String,
  /// Whether this is a dynamic port template (inputs only).
  pub dynamic: bool,
}

impl PortDescription {
  /// Creates a static port description.
  pub fn new(name: impl Into<String>, port_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      port_type: port_type.into(),
      dynamic: false,
    }
  }

  /// Creates a dynamic port template description.
  pub fn dynamic(name: impl Into<String>, port_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      port_type: port_type.into(),
      dynamic: true,
    }
  }
}

/// Records that an existing port's index moved during a dynamic-group
/// mutation. The network applies these to connection endpoints so the graph
/// and the port set never disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortShift {
  /// The port id before the mutation.
  pub from: PortId,
  /// The port id after the mutation.
  pub to: PortId,
}

/// An input attachment point on a module.
#[derive(Clone, Debug)]
pub struct InputPort {
  /// Identity of this port within the module's input set.
  pub id: PortId,
  /// Payload type tag.
  pub port_type: String,
  /// True for slots of a dynamic group.
  pub dynamic: bool,
}

/// An output attachment point on a module.
///
/// The port caches the handle most recently published by the owning module's
/// algorithm body, together with a version counter bumped on every publish.
/// Downstream consumers read the handle; the re-execution policy reads the
/// version.
#[derive(Clone, Debug)]
pub struct OutputPort {
  /// Identity of this port within the module's output set.
  pub id: PortId,
  /// Payload type tag.
  pub port_type: String,
  data: Option<DatatypeHandle>,
  version: u64,
}

impl OutputPort {
  /// Returns the most recently published handle, if any.
  pub fn data(&self) -> Option<DatatypeHandle> {
    self.data.clone()
  }

  /// Returns the publish version (0 until first publish).
  pub fn version(&self) -> u64 {
    self.version
  }

  /// Publishes a handle on this port, bumping the version counter.
  pub fn publish(&mut self, handle: DatatypeHandle) {
    self.data = Some(handle);
    self.version += 1;
  }
}

/// A module's input ports: static ports followed by dynamic group slots.
#[derive(Clone, Debug, Default)]
pub struct InputPortSet {
  ports: Vec<InputPort>,
  templates: Vec<PortDescription>,
}

impl InputPortSet {
  /// Builds an input port set from registered descriptions.
  ///
  /// Static descriptions become ports with declaration-order indices;
  /// dynamic descriptions become templates with zero initial slots.
  pub fn from_descriptions(descriptions: &[PortDescription]) -> Self {
    let mut ports = Vec::new();
    let mut templates = Vec::new();
    for description in descriptions {
      if description.dynamic {
        templates.push(description.clone());
      } else {
        ports.push(InputPort {
          id: PortId::new(ports.len(), &description.name),
          port_type: description.port_type.clone(),
          dynamic: false,
        });
      }
    }
    Self { ports, templates }
  }

  /// Number of ports currently in the set (dynamic slots included).
  pub fn len(&self) -> usize {
    self.ports.len()
  }

  /// True when the set holds no ports (templates may still exist).
  pub fn is_empty(&self) -> bool {
    self.ports.is_empty()
  }

  /// Iterates over all ports in index order.
  pub fn iter(&self) -> impl Iterator<Item = &InputPort> {
    self.ports.iter()
  }

  /// Looks up a port by full id (index and name must both match).
  pub fn get(&self, id: &PortId) -> Option<&InputPort> {
    self
      .ports
      .get(id.index)
      .filter(|port| port.id.name == id.name)
  }

  /// Looks up the first port with the given base name.
  pub fn by_name(&self, name: &str) -> Option<&InputPort> {
    self.ports.iter().find(|port| port.id.name == name)
  }

  /// Returns the dynamic template with the given name, if declared.
  pub fn template(&self, name: &str) -> Option<&PortDescription> {
    self.templates.iter().find(|template| template.name == name)
  }

  /// Number of slots currently open for the named dynamic group.
  pub fn group_width(&self, name: &str) -> usize {
    self.ports.iter().filter(|port| port.id.name == name).count()
  }

  /// Grows the named dynamic group by one slot.
  ///
  /// The new slot is inserted directly after the last existing slot of the
  /// group (or at the end of the set for an empty group) so the group stays
  /// contiguous. Returns the new slot's id plus shift records for every port
  /// whose index moved.
  ///
  /// Returns `None` if no dynamic template with that name is declared.
  pub fn grow(&mut self, name: &str) -> Option<(PortId, Vec<PortShift>)> {
    let template = self.template(name)?.clone();
    let insert_at = self
      .ports
      .iter()
      .rposition(|port| port.id.name == name)
      .map(|position| position + 1)
      .unwrap_or(self.ports.len());
    self.ports.insert(
      insert_at,
      InputPort {
        id: PortId::new(insert_at, &template.name),
        port_type: template.port_type.clone(),
        dynamic: true,
      },
    );
    let shifts = self.renumber();
    let new_id = self.ports[insert_at].id.clone();
    Some((new_id, shifts))
  }

  /// Removes one dynamic slot and compacts the remaining indices.
  ///
  /// Returns shift records for every port whose index moved, or `None` if
  /// the id does not name an existing dynamic slot. Static ports cannot be
  /// removed.
  pub fn remove_slot(&mut self, id: &PortId) -> Option<Vec<PortShift>> {
    let position = self
      .ports
      .iter()
      .position(|port| port.id == *id && port.dynamic)?;
    self.ports.remove(position);
    Some(self.renumber())
  }

  // Reassigns dense indices after an insert or removal and reports which
  // ports moved. The freshly inserted port (if any) is excluded because no
  // connection can reference it yet.
  fn renumber(&mut self) -> Vec<PortShift> {
    let mut shifts = Vec::new();
    for (position, port) in self.ports.iter_mut().enumerate() {
      if port.id.index != position {
        let from = port.id.clone();
        port.id.index = position;
        shifts.push(PortShift {
          from,
          to: port.id.clone(),
        });
      }
    }
    shifts
  }
}

/// A module's output ports. Outputs are always static.
#[derive(Clone, Debug, Default)]
pub struct OutputPortSet {
  ports: Vec<OutputPort>,
}

impl OutputPortSet {
  /// Builds an output port set from registered descriptions.
  pub fn from_descriptions(descriptions: &[PortDescription]) -> Self {
    let ports = descriptions
      .iter()
      .enumerate()
      .map(|(index, description)| OutputPort {
        id: PortId::new(index, &description.name),
        port_type: description.port_type.clone(),
        data: None,
        version: 0,
      })
      .collect();
    Self { ports }
  }

  /// Number of output ports.
  pub fn len(&self) -> usize {
    self.ports.len()
  }

  /// True when the module declares no outputs (a sink).
  pub fn is_empty(&self) -> bool {
    self.ports.is_empty()
  }

  /// Iterates over all ports in index order.
  pub fn iter(&self) -> impl Iterator<Item = &OutputPort> {
    self.ports.iter()
  }

  /// Looks up a port by full id.
  pub fn get(&self, id: &PortId) -> Option<&OutputPort> {
    self
      .ports
      .get(id.index)
      .filter(|port| port.id.name == id.name)
  }

  /// Looks up a port by name.
  pub fn by_name(&self, name: &str) -> Option<&OutputPort> {
    self.ports.iter().find(|port| port.id.name == name)
  }

  /// Publishes a handle on the identified port, bumping its version.
  ///
  /// Returns false if the port does not exist.
  pub fn publish(&mut self, id: &PortId, handle: DatatypeHandle) -> bool {
    match self
      .ports
      .get_mut(id.index)
      .filter(|port| port.id.name == id.name)
    {
      Some(port) => {
        port.publish(handle);
        true
      }
      None => false,
    }
  }
}
