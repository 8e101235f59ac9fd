//! # Module Registry
//!
//! A process-wide mapping from a (package, category, name) triple to a module
//! constructor and its static port/trait descriptor. Populated once at
//! startup and read-only thereafter; the network holds a shared reference and
//! resolves `add_module(name)` against it without knowing any concrete module
//! implementation.
//!
//! The registry is an explicit, injected object rather than a singleton so
//! test networks can carry their own small factories.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::NetworkError;
use crate::module::Algorithm;
use crate::port::PortDescription;
use crate::state::{ModuleState, Value};

/// The (package, category, name) triple identifying one module type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleLookupInfo {
  /// Owning package ("SCIRun", a plugin name, ...).
  pub package: String,
  /// Category within the package ("Math", "Visualization", ...).
  pub category: String,
  /// User-visible module type name; unique across the registry.
  pub name: String,
}

impl ModuleLookupInfo {
  /// Creates a lookup triple.
  pub fn new(
    package: impl Into<String>,
    category: impl Into<String>,
    name: impl Into<String>,
  ) -> Self {
    Self {
      package: package.into(),
      category: category.into(),
      name: name.into(),
    }
  }
}

/// Static description of a module type: its identity, its port layout, and
/// its capability flags.
#[derive(Clone, Debug)]
pub struct ModuleDescription {
  /// Identity triple.
  pub info: ModuleLookupInfo,
  /// Input port descriptions, static first, dynamic templates last.
  pub input_ports: Vec<PortDescription>,
  /// Output port descriptions (always static).
  pub output_ports: Vec<PortDescription>,
  /// Whether the module wraps an algorithm body.
  pub has_algorithm: bool,
  /// Whether the excluded editor layer shows a dialog for this module.
  pub has_ui: bool,
  /// Default persisted parameter values for a fresh instance.
  pub default_state: Vec<(String, Value)>,
}

/// Creates one algorithm body per module instance.
pub type AlgorithmFactory = Arc<dyn Fn() -> Arc<dyn Algorithm> + Send + Sync>;

struct RegistryEntry {
  description: ModuleDescription,
  factory: Option<AlgorithmFactory>,
}

/// Immutable-after-init lookup table of module constructors.
#[derive(Default)]
pub struct ModuleRegistry {
  entries: HashMap<String, RegistryEntry>,
}

impl ModuleRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a module type with an algorithm body.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateModuleType` if the name is already taken.
  pub fn register(
    &mut self,
    description: ModuleDescription,
    factory: AlgorithmFactory,
  ) -> Result<(), NetworkError> {
    self.insert(description, Some(factory))
  }

  /// Registers a module type with no algorithm body (annotation/UI-only
  /// modules); executing one completes trivially with no outputs.
  pub fn register_without_algorithm(
    &mut self,
    description: ModuleDescription,
  ) -> Result<(), NetworkError> {
    self.insert(description, None)
  }

  fn insert(
    &mut self,
    description: ModuleDescription,
    factory: Option<AlgorithmFactory>,
  ) -> Result<(), NetworkError> {
    let name = description.info.name.clone();
    if self.entries.contains_key(&name) {
      return Err(NetworkError::DuplicateModuleType(name));
    }
    self.entries.insert(
      name,
      RegistryEntry {
        description,
        factory,
      },
    );
    Ok(())
  }

  /// Looks up a module type's static description by name.
  pub fn description(&self, name: &str) -> Option<&ModuleDescription> {
    self.entries.get(name).map(|entry| &entry.description)
  }

  /// Returns true if a module type with this name is registered.
  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  /// Number of registered module types.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// True when nothing is registered.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Builds the per-instance parts for a fresh module of the named type:
  /// its default state and (if declared) a new algorithm body.
  pub(crate) fn instantiate(
    &self,
    name: &str,
  ) -> Result<(&ModuleDescription, ModuleState, Option<Arc<dyn Algorithm>>), NetworkError> {
    let entry = self
      .entries
      .get(name)
      .ok_or_else(|| NetworkError::UnknownModuleType(name.to_string()))?;
    let state = ModuleState::with_defaults(entry.description.default_state.iter().cloned());
    let algorithm = entry.factory.as_ref().map(|factory| factory());
    Ok((&entry.description, state, algorithm))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::datatype::{InputHandles, OutputHandles};
  use crate::error::AlgorithmError;
  use async_trait::async_trait;

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

  fn description(name: &str) -> ModuleDescription {
    ModuleDescription {
      info: ModuleLookupInfo::new("Test", "Basic", name),
      input_ports: vec![],
      output_ports: vec![],
      has_algorithm: true,
      has_ui: false,
      default_state: vec![("scale".to_string(), Value::Double(1.0))],
    }
  }

  #[test]
  fn duplicate_registration_is_rejected() {
    let mut registry = ModuleRegistry::new();
    let factory: AlgorithmFactory = Arc::new(|| Arc::new(NoopAlgorithm));
    registry.register(description("A"), factory.clone()).unwrap();
    assert!(matches!(
      registry.register(description("A"), factory),
      Err(NetworkError::DuplicateModuleType(_))
    ));
  }

  #[test]
  fn instantiate_applies_default_state() {
    let mut registry = ModuleRegistry::new();
    registry
      .register(description("A"), Arc::new(|| Arc::new(NoopAlgorithm)))
      .unwrap();
    let (_, state, algorithm) = registry.instantiate("A").unwrap();
    assert_eq!(state.value("scale"), Some(&Value::Double(1.0)));
    assert!(algorithm.is_some());
  }

  #[test]
  fn unknown_type_is_an_error() {
    let registry = ModuleRegistry::new();
    assert!(matches!(
      registry.instantiate("Missing"),
      Err(NetworkError::UnknownModuleType(_))
    ));
  }
}
