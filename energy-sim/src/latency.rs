// latency.rs
// Latency models defining how long messages take to travel between agents
// and how much "compute time" the receiver needs.

use std::collections::HashMap;

use crate::messages::AgentId;

const NS_PER_MS: u64 = 1_000_000;

/// Latency model for simulated network + compute delays.
pub trait LatencyModel {
    /// Network delay for a message travelling from `from` to `to`.
    fn delay_ns(&self, from: AgentId, to: AgentId) -> u64;

    /// Optional compute time on the receiver side.
    fn compute_ns(&self, _agent_id: AgentId) -> u64 {
        0
    }
}

/// Fixed network and compute delays for all messages.
pub struct FixedLatency {
    network_delay_ns: u64,
    compute_delay_ns: u64,
}

impl FixedLatency {
    pub fn new(network_delay_ns: u64, compute_delay_ns: u64) -> Self {
        Self {
            network_delay_ns,
            compute_delay_ns,
        }
    }

    pub fn from_millis(network_ms: u64, compute_ms: u64) -> Self {
        Self::new(network_ms * NS_PER_MS, compute_ms * NS_PER_MS)
    }
}

impl LatencyModel for FixedLatency {
    fn delay_ns(&self, _from: AgentId, _to: AgentId) -> u64 {
        self.network_delay_ns
    }

    fn compute_ns(&self, _agent_id: AgentId) -> u64 {
        self.compute_delay_ns
    }
}

/// Base model plus per-link overrides, e.g. one retailer behind a slow link.
/// Overrides apply in both directions.
pub struct LinkLatency {
    base: Box<dyn LatencyModel>,
    links: HashMap<(AgentId, AgentId), u64>,
}

impl LinkLatency {
    pub fn new(base: Box<dyn LatencyModel>) -> Self {
        Self {
            base,
            links: HashMap::new(),
        }
    }

    pub fn with_link(mut self, a: AgentId, b: AgentId, delay_ns: u64) -> Self {
        self.links.insert(Self::key(a, b), delay_ns);
        self
    }

    fn key(a: AgentId, b: AgentId) -> (AgentId, AgentId) {
        (a.min(b), a.max(b))
    }
}

impl LatencyModel for LinkLatency {
    fn delay_ns(&self, from: AgentId, to: AgentId) -> u64 {
        match self.links.get(&Self::key(from, to)) {
            Some(&delay) => delay,
            None => self.base.delay_ns(from, to),
        }
    }

    fn compute_ns(&self, agent_id: AgentId) -> u64 {
        self.base.compute_ns(agent_id)
    }
}
