//! Declarative list of probes handed to the orchestrator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::RegistryError;

use super::probe::{Probe, ProbeRef};

/// Ordered set of probes for one orchestration call.
///
/// Adding or removing a probe is a data change: the launcher iterates the
/// registry and starts one task per entry.
pub struct Registry<I: 'static, R: 'static> {
    probes: Vec<ProbeRef<I, R>>,
}

impl<I: 'static, R: 'static> Default for Registry<I, R> {
    fn default() -> Self {
        Self { probes: Vec::new() }
    }
}

impl<I: 'static, R: 'static> Clone for Registry<I, R> {
    fn clone(&self) -> Self {
        Self {
            probes: self.probes.clone(),
        }
    }
}

impl<I: 'static, R: 'static> std::fmt::Debug for Registry<I, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.probes.iter().map(|p| p.name()))
            .finish()
    }
}

impl<I: 'static, R: 'static> Registry<I, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a probe, builder style.
    pub fn with(mut self, probe: impl Probe<I, R>) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    /// Adds an already shared probe.
    pub fn push(&mut self, probe: ProbeRef<I, R>) {
        self.probes.push(probe);
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbeRef<I, R>> {
        self.probes.iter()
    }

    /// Registered probe names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Keeps only the named probes.
    ///
    /// Fails on the first name that is not registered.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, RegistryError> {
        let wanted: Vec<&str> = names.iter().map(|n| n.as_ref().trim()).collect();

        if let Some(unknown) = wanted
            .iter()
            .find(|name| !self.probes.iter().any(|p| p.name() == **name))
        {
            return Err(RegistryError::UnknownProbe {
                name: unknown.to_string(),
            });
        }

        let mut selected = Self::new();
        for probe in self.probes.iter().filter(|p| wanted.contains(&p.name())) {
            selected.push(Arc::clone(probe));
        }
        Ok(selected)
    }

    /// Checks that the registry can start a run.
    ///
    /// Names must be present and unique, and no two probes may claim the
    /// same composite field.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut names = HashSet::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();

        for (index, probe) in self.probes.iter().enumerate() {
            let name = probe.name();
            if name.trim().is_empty() {
                return Err(RegistryError::BlankName { index });
            }
            if !names.insert(name) {
                return Err(RegistryError::DuplicateName {
                    name: name.to_string(),
                });
            }

            for &field in probe.fields() {
                if let Some(first) = owners.insert(field, name) {
                    return Err(RegistryError::OverlappingField {
                        field: field.to_string(),
                        first: first.to_string(),
                        second: name.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
