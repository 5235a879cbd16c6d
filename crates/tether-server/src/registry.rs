use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tether_common::protocol::{Result, TetherError};

use crate::load_balancer::WeightTable;
use crate::skeleton::Skeleton;

/// Weight given to services that do not declare one.
pub const DEFAULT_WEIGHT: u32 = 1;

/// How one implementation is picked when an interface has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Several implementations are a configuration error
    #[default]
    Strict,
    /// Pick by weight through a [`WeightTable`]
    Weighted,
}

impl SelectionPolicy {
    pub fn from_load_balancing(enabled: bool) -> Self {
        if enabled {
            SelectionPolicy::Weighted
        } else {
            SelectionPolicy::Strict
        }
    }
}

/// A registered service implementation.
#[derive(Clone)]
pub struct ServiceEntry {
    pub name: String,
    pub weight: u32,
    pub skeleton: Arc<dyn Skeleton>,
}

/// Service implementations grouped by interface id.
pub struct ServiceRegistry {
    policy: SelectionPolicy,
    services: RwLock<HashMap<String, Vec<ServiceEntry>>>,
    tables: Mutex<HashMap<String, WeightTable>>,
}

impl ServiceRegistry {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            services: RwLock::new(HashMap::new()),
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Registers `skeleton` under `name` for its interface.
    pub fn register(&self, name: impl Into<String>, weight: u32, skeleton: Arc<dyn Skeleton>) {
        let name = name.into();
        let interface = skeleton.interface().to_string();
        tracing::info!(interface = %interface, service = %name, weight, "Registered service");

        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(interface.clone())
            .or_default()
            .push(ServiceEntry {
                name,
                weight,
                skeleton,
            });

        // Rebuilt from the new candidate set on the next selection
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&interface);
    }

    /// Names of the implementations registered for `interface`.
    pub fn implementations(&self, interface: &str) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(interface)
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Picks the implementation that serves the next call on `interface`.
    pub fn resolve(&self, interface: &str) -> Result<ServiceEntry> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let entries = match services.get(interface) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Err(TetherError::NoImplementationFound(interface.to_string())),
        };

        if entries.len() == 1 {
            return Ok(entries[0].clone());
        }

        match self.policy {
            SelectionPolicy::Strict => Err(TetherError::AmbiguousImplementation {
                interface: interface.to_string(),
                count: entries.len(),
                names: entries.iter().map(|e| e.name.clone()).collect(),
            }),
            SelectionPolicy::Weighted => {
                let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
                let table = tables.entry(interface.to_string()).or_insert_with(|| {
                    WeightTable::new(entries.iter().map(|e| (e.name.clone(), e.weight)).collect())
                });
                let name = table
                    .next()
                    .ok_or_else(|| TetherError::NoImplementationFound(interface.to_string()))?;
                tracing::trace!(interface, service = %name, "Weighted selection");

                entries
                    .iter()
                    .find(|e| e.name == name)
                    .cloned()
                    .ok_or_else(|| TetherError::NoImplementationFound(interface.to_string()))
            }
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(SelectionPolicy::default())
    }
}
