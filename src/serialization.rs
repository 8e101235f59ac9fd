//! # Network Serialization
//!
//! Saves a network's abstract structure as a JSON document and rebuilds an
//! equivalent network from one: module instances with their persisted
//! parameter state, plus connections addressed by module id and logical port
//! name. Execution state, published payloads, and transient state values are
//! deliberately not captured; a loaded network starts every module at
//! `NotExecuted`.
//!
//! Connections are written sorted by destination module and slot index so
//! that replaying them regrows dynamic input groups in the original slot
//! order; a round trip reproduces the same group widths and indices.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::NetworkError;
use crate::module::ModuleId;
use crate::network::Network;
use crate::registry::ModuleRegistry;
use crate::state::Value;

/// One saved module instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleEntry {
  /// The id the module had when saved ("Name:counter"). Used to wire saved
  /// connections; a loaded network may assign different instance counters.
  pub id: String,
  /// Owning package, recorded for provenance.
  #[serde(default)]
  pub package: String,
  /// Category within the package, recorded for provenance.
  #[serde(default)]
  pub category: String,
  /// Registered module type name, resolved against the registry on load.
  pub name: String,
  /// Persisted parameter values.
  pub state: BTreeMap<String, Value>,
  /// Whether the caching override was set.
  #[serde(default)]
  pub always_execute: bool,
}

/// One saved connection, endpoints by module id and logical port name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionEntry {
  /// Source module id as saved.
  pub from: String,
  /// Source output port name.
  pub from_port: String,
  /// Destination module id as saved.
  pub to: String,
  /// Destination input port name (base name for dynamic groups).
  pub to_port: String,
}

/// The on-disk document: everything needed to rebuild an equivalent network
/// against the same registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkFile {
  /// Document format version.
  pub version: u32,
  /// Modules in creation order.
  pub modules: Vec<ModuleEntry>,
  /// Connections in replay order.
  pub connections: Vec<ConnectionEntry>,
}

/// Current document format version.
pub const NETWORK_FILE_VERSION: u32 = 1;

impl NetworkFile {
  /// Captures a network's saveable structure.
  pub fn capture(network: &Network) -> Self {
    let modules = network
      .module_ids()
      .iter()
      .filter_map(|id| network.module(id))
      .map(|module| ModuleEntry {
        id: module.id().to_string(),
        package: module.info().package.clone(),
        category: module.info().category.clone(),
        name: module.id().name.clone(),
        state: module
          .state()
          .values()
          .map(|(key, value)| (key.clone(), value.clone()))
          .collect(),
        always_execute: module.always_execute(),
      })
      .collect();

    let mut connections: Vec<&crate::network::Connection> = network.connections().iter().collect();
    connections.sort_by(|a, b| {
      (&a.to_module, a.to_port.index, &a.from_module)
        .cmp(&(&b.to_module, b.to_port.index, &b.from_module))
    });
    let connections = connections
      .into_iter()
      .map(|connection| ConnectionEntry {
        from: connection.from_module.to_string(),
        from_port: connection.from_port.name.clone(),
        to: connection.to_module.to_string(),
        to_port: connection.to_port.name.clone(),
      })
      .collect();

    Self {
      version: NETWORK_FILE_VERSION,
      modules,
      connections,
    }
  }

  /// Rebuilds a network from this document against the given registry.
  ///
  /// Saved ids are remapped onto freshly assigned ones; the structure,
  /// parameter state, and dynamic group layout are reproduced exactly.
  ///
  /// # Errors
  ///
  /// `Serialization` for a malformed document (bad id, connection referencing
  /// an unsaved module); `UnknownModuleType` when the registry lacks a saved
  /// type; any connect-time structural error if the registry's port
  /// declarations no longer match the saved connections.
  pub fn instantiate(&self, registry: Arc<ModuleRegistry>) -> Result<Network, NetworkError> {
    let mut network = Network::new(registry);
    let mut id_map: HashMap<String, ModuleId> = HashMap::new();

    for entry in &self.modules {
      // Validate the saved id even though the loaded network reassigns it.
      entry
        .id
        .parse::<ModuleId>()
        .map_err(NetworkError::Serialization)?;
      let id = network.add_module(&entry.name)?;
      if let Some(module) = network.module_mut(&id) {
        for (key, value) in &entry.state {
          module.state_mut().set_value(key, value.clone());
        }
        module.set_always_execute(entry.always_execute);
      }
      id_map.insert(entry.id.clone(), id);
    }

    for entry in &self.connections {
      let from = id_map.get(&entry.from).ok_or_else(|| {
        NetworkError::Serialization(format!("connection references unsaved module '{}'", entry.from))
      })?;
      let to = id_map.get(&entry.to).ok_or_else(|| {
        NetworkError::Serialization(format!("connection references unsaved module '{}'", entry.to))
      })?;
      let (from, to) = (from.clone(), to.clone());
      network.connect(&from, &entry.from_port, &to, &entry.to_port)?;
    }

    Ok(network)
  }
}

/// Writes a network document to disk as pretty-printed JSON.
///
/// # Errors
///
/// `Serialization` wrapping the underlying I/O or encoding failure.
pub fn save_network(network: &Network, path: &Path) -> Result<(), NetworkError> {
  let file = NetworkFile::capture(network);
  let text = serde_json::to_string_pretty(&file)
    .map_err(|error| NetworkError::Serialization(error.to_string()))?;
  fs::write(path, text).map_err(|error| NetworkError::Serialization(error.to_string()))?;
  info!(
    path = %path.display(),
    modules = file.modules.len(),
    connections = file.connections.len(),
    "network saved"
  );
  Ok(())
}

/// Reads a network document from disk and rebuilds it against the registry.
///
/// # Errors
///
/// `Serialization` for I/O or decoding failures, plus everything
/// [`NetworkFile::instantiate`] can return.
pub fn load_network(path: &Path, registry: Arc<ModuleRegistry>) -> Result<Network, NetworkError> {
  let text =
    fs::read_to_string(path).map_err(|error| NetworkError::Serialization(error.to_string()))?;
  let file: NetworkFile =
    serde_json::from_str(&text).map_err(|error| NetworkError::Serialization(error.to_string()))?;
  let network = file.instantiate(registry)?;
  info!(
    path = %path.display(),
    modules = network.module_count(),
    connections = network.connection_count(),
    "network loaded"
  );
  Ok(network)
}
