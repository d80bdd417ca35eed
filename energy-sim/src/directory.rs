// src/directory.rs
// Capability-keyed registry of participant identities.

use std::collections::BTreeMap;

use crate::error::MarketError;
use crate::messages::AgentId;

/// Capability advertised by energy suppliers.
pub const RETAILER_CAPABILITY: &str = "energy-retailer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: String,
}

impl AgentDescriptor {
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Directory the kernel injects into agents. Agents never talk to a concrete
/// registry directly.
pub trait DirectoryService {
    /// Advertise `descriptor` under `capability`. Re-registering replaces the
    /// previous entry for the same agent.
    fn register(&mut self, descriptor: AgentDescriptor, capability: &str) -> Result<(), MarketError>;

    /// All agents advertising `capability`, in registration order.
    /// An empty result is reported as [`MarketError::LookupFailure`].
    fn lookup(&self, capability: &str) -> Result<Vec<AgentDescriptor>, MarketError>;

    /// Remove every registration of `agent`. Returns how many were removed.
    fn deregister(&mut self, agent: AgentId) -> usize;
}

/// In-process directory used by the simulation kernel.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    services: BTreeMap<String, Vec<AgentDescriptor>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryService for InMemoryDirectory {
    fn register(&mut self, descriptor: AgentDescriptor, capability: &str) -> Result<(), MarketError> {
        let entries = self.services.entry(capability.to_string()).or_default();
        entries.retain(|d| d.id != descriptor.id);
        entries.push(descriptor);
        Ok(())
    }

    fn lookup(&self, capability: &str) -> Result<Vec<AgentDescriptor>, MarketError> {
        match self.services.get(capability) {
            Some(entries) if !entries.is_empty() => Ok(entries.clone()),
            _ => Err(MarketError::LookupFailure {
                capability: capability.to_string(),
            }),
        }
    }

    fn deregister(&mut self, agent: AgentId) -> usize {
        let mut removed = 0;
        for entries in self.services.values_mut() {
            let before = entries.len();
            entries.retain(|d| d.id != agent);
            removed += before - entries.len();
        }
        self.services.retain(|_, entries| !entries.is_empty());
        removed
    }
}
