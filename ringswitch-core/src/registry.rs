//! ## ringswitch-core::registry
//! **Interface ownership across engine instances**
//!
//! Several engines may read distinct hardware queues of one physical
//! interface. The registry records who holds which interface and refuses
//! bindings that would conflict.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::ring::PortId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Interface {0} is not registered")]
    NotFound(String),

    #[error("Interface {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Interface {iface} is bound as {existing:?}, requested {requested:?}")]
    Incompatible {
        iface: String,
        existing: QueueMode,
        requested: QueueMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// The owner reads every queue of the interface.
    NoQueues,
    /// Owners read individual hardware queues.
    HwQueues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub mode: QueueMode,
    /// Process-wide handle opened by the first owner.
    pub port: PortId,
    pub owners: Vec<String>,
}

pub trait InterfaceRegistry: Send + Sync {
    fn find(&self, name: &str) -> Option<Binding>;

    fn create(
        &self,
        name: &str,
        mode: QueueMode,
        port: PortId,
        owner: &str,
    ) -> Result<(), RegistryError>;

    /// Adds `owner` to an existing binding if `mode` is compatible with it.
    fn retrieve_and_rebind(
        &self,
        name: &str,
        mode: QueueMode,
        owner: &str,
    ) -> Result<Binding, RegistryError>;

    /// Drops `owner` from `name`. Returns the binding once its last owner is gone.
    fn unregister(&self, name: &str, owner: &str) -> Option<Binding>;

    /// Drops `owner` everywhere. Returns the bindings left without owners.
    fn unregister_all(&self, owner: &str) -> Vec<Binding>;
}

/// In-process registry shared between engines through an `Arc`.
#[derive(Debug, Default)]
pub struct InterfaceTable {
    entries: RwLock<HashMap<String, Binding>>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl InterfaceRegistry for InterfaceTable {
    fn find(&self, name: &str) -> Option<Binding> {
        self.entries.read().get(name).cloned()
    }

    fn create(
        &self,
        name: &str,
        mode: QueueMode,
        port: PortId,
        owner: &str,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        entries.insert(
            name.to_string(),
            Binding {
                name: name.to_string(),
                mode,
                port,
                owners: vec![owner.to_string()],
            },
        );
        Ok(())
    }

    fn retrieve_and_rebind(
        &self,
        name: &str,
        mode: QueueMode,
        owner: &str,
    ) -> Result<Binding, RegistryError> {
        let mut entries = self.entries.write();
        let binding = entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if binding.mode != QueueMode::HwQueues || mode != QueueMode::HwQueues {
            return Err(RegistryError::Incompatible {
                iface: name.to_string(),
                existing: binding.mode,
                requested: mode,
            });
        }

        if !binding.owners.iter().any(|o| o == owner) {
            binding.owners.push(owner.to_string());
        }
        Ok(binding.clone())
    }

    fn unregister(&self, name: &str, owner: &str) -> Option<Binding> {
        let mut entries = self.entries.write();
        let binding = entries.get_mut(name)?;
        binding.owners.retain(|o| o != owner);
        if binding.owners.is_empty() {
            entries.remove(name)
        } else {
            None
        }
    }

    fn unregister_all(&self, owner: &str) -> Vec<Binding> {
        let mut entries = self.entries.write();
        for binding in entries.values_mut() {
            binding.owners.retain(|o| o != owner);
        }
        let orphaned: Vec<String> = entries
            .iter()
            .filter(|(_, b)| b.owners.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        orphaned
            .into_iter()
            .filter_map(|name| entries.remove(&name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebind_requires_hw_queues_on_both_sides() {
        let table = InterfaceTable::new();
        table
            .create("eth0", QueueMode::NoQueues, PortId(1), "eng0")
            .unwrap();

        let err = table
            .retrieve_and_rebind("eth0", QueueMode::HwQueues, "eng1")
            .unwrap_err();
        assert!(matches!(err, RegistryError::Incompatible { .. }));
    }

    #[test]
    fn rebind_adds_owner_once() {
        let table = InterfaceTable::new();
        table
            .create("eth1", QueueMode::HwQueues, PortId(3), "eng0")
            .unwrap();

        table
            .retrieve_and_rebind("eth1", QueueMode::HwQueues, "eng1")
            .unwrap();
        let binding = table
            .retrieve_and_rebind("eth1", QueueMode::HwQueues, "eng1")
            .unwrap();
        assert_eq!(binding.owners, vec!["eng0", "eng1"]);
        assert_eq!(binding.port, PortId(3));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let table = InterfaceTable::new();
        table
            .create("eth0", QueueMode::HwQueues, PortId(1), "eng0")
            .unwrap();
        assert_eq!(
            table.create("eth0", QueueMode::HwQueues, PortId(2), "eng1"),
            Err(RegistryError::AlreadyRegistered("eth0".into()))
        );
    }

    #[test]
    fn unregister_removes_entry_with_last_owner() {
        let table = InterfaceTable::new();
        table
            .create("eth0", QueueMode::HwQueues, PortId(1), "eng0")
            .unwrap();
        table
            .retrieve_and_rebind("eth0", QueueMode::HwQueues, "eng1")
            .unwrap();

        assert!(table.unregister("eth0", "eng0").is_none());
        assert_eq!(table.len(), 1);
        let removed = table.unregister("eth0", "eng1").unwrap();
        assert_eq!(removed.port, PortId(1));
        assert!(table.is_empty());
    }

    #[test]
    fn unregister_all_only_touches_owner() {
        let table = InterfaceTable::new();
        table
            .create("eth0", QueueMode::NoQueues, PortId(1), "eng0")
            .unwrap();
        table
            .create("eth1", QueueMode::NoQueues, PortId(2), "eng1")
            .unwrap();

        let removed = table.unregister_all("eng0");
        assert_eq!(removed.len(), 1);
        assert!(table.find("eth0").is_none());
        assert!(table.find("eth1").is_some());
    }
}
