//! ServiceDescription - the ordered extension registry for one service

use crate::contracts::{Capability, Extension};
use crate::error::{BuildError, BuildResult};
use crate::extensions::ContainerDefinition;

/// Declarative recipe for one service: extensions keyed by name, in registration order.
///
/// Registration order is the hook invocation order, so it is part of the
/// contract: when two extensions write the same environment key, the one
/// added later wins.
#[derive(Default)]
pub struct ServiceDescription {
    entries: Vec<Box<dyn Extension>>,
}

impl std::fmt::Debug for ServiceDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescription")
            .field("extensions", &self.names())
            .finish()
    }
}

impl ServiceDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension. Fails if an extension with the same name is already registered.
    pub fn add<E: Extension>(&mut self, extension: E) -> BuildResult<&mut Self> {
        self.add_boxed(Box::new(extension))
    }

    pub fn add_boxed(&mut self, extension: Box<dyn Extension>) -> BuildResult<&mut Self> {
        let name = extension.name();
        if self.get(name).is_some() {
            return Err(BuildError::DuplicateExtension(name.to_string()));
        }
        tracing::debug!(extension = name, capability = ?extension.capability(), "Extension registered");
        self.entries.push(extension);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Extension> {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    /// Typed lookup; `None` when absent or of a different type.
    pub fn get_as<T: Extension>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|e| e.as_any().downcast_ref::<T>())
    }

    /// First extension reporting `capability`.
    pub fn find(&self, capability: Capability) -> Option<&dyn Extension> {
        self.entries
            .iter()
            .find(|e| e.capability() == capability)
            .map(|e| e.as_ref())
    }

    pub fn find_all(&self, capability: Capability) -> impl Iterator<Item = &dyn Extension> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.capability() == capability)
            .map(|e| e.as_ref())
    }

    /// The container definition, when exactly one is registered.
    pub fn container(&self) -> Option<&ContainerDefinition> {
        let mut containers = self.find_all(Capability::Container);
        let first = containers.next()?;
        if containers.next().is_some() {
            return None;
        }
        first.as_any().downcast_ref::<ContainerDefinition>()
    }

    /// First extension that can link services, see [`crate::Connectable`].
    pub fn find_connectable(&self) -> Option<&dyn Extension> {
        self.entries
            .iter()
            .find(|e| e.as_connectable().is_some())
            .map(|e| e.as_ref())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &dyn Extension> + '_ {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [Box<dyn Extension>] {
        &mut self.entries
    }
}
