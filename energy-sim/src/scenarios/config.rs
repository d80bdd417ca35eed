// src/scenarios/config.rs
// JSON scenario files. Every section is optional and falls back to the
// defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agents::{HomeConfig, RetailerConfig};
use crate::directory::RETAILER_CAPABILITY;
use crate::error::MarketError;
use crate::latency::{FixedLatency, LatencyModel, LinkLatency};
use crate::messages::AgentId;
use crate::negotiation::NegotiationSettings;
use crate::policy::PurchasePolicy;
use crate::scheduler::{SupplyDrift, NS_PER_MS};
use crate::state::{InitialRanges, ParticipantState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_scenario_name")]
    pub scenario_name: String,
    #[serde(default = "default_duration_sec")]
    pub duration_sec: u64,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub policy: PurchasePolicy,
    #[serde(default)]
    pub ranges: InitialRanges,
    #[serde(default = "default_retailers")]
    pub retailers: Vec<RetailerSpec>,
    #[serde(default = "default_homes")]
    pub homes: Vec<HomeSpec>,
}

fn default_scenario_name() -> String {
    "energy_market".to_string()
}

fn default_duration_sec() -> u64 {
    600
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_tick_ms() -> u64 {
    100
}

fn default_retailers() -> Vec<RetailerSpec> {
    (1..=2).map(|id| RetailerSpec::named(id, format!("retailer-{id}"))).collect()
}

fn default_homes() -> Vec<HomeSpec> {
    (10..=12).map(|id| HomeSpec::named(id, format!("home-{id}"))).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub network_ms: u64,
    pub compute_ms: u64,
    /// Per-link network delay overrides.
    pub links: Vec<LinkConfig>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            network_ms: 1,
            compute_ms: 0,
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: AgentId,
    pub b: AgentId,
    pub delay_ms: u64,
}

impl LatencyConfig {
    pub fn build(&self) -> Box<dyn LatencyModel> {
        let base = FixedLatency::from_millis(self.network_ms, self.compute_ms);
        if self.links.is_empty() {
            return Box::new(base);
        }
        let model = self
            .links
            .iter()
            .fold(LinkLatency::new(Box::new(base)), |model, link| {
                model.with_link(link.a, link.b, link.delay_ms.saturating_mul(NS_PER_MS))
            });
        Box::new(model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    pub reply_timeout_ms: u64,
    pub cooldown_max_ms: u64,
    pub capability: String,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 5_000,
            cooldown_max_ms: 60_000,
            capability: RETAILER_CAPABILITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub supply_tick_max_ms: u64,
    pub budget_interval_ms: u64,
    pub consumer_drift: SupplyDrift,
    pub retailer_drift: SupplyDrift,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            supply_tick_max_ms: 300_000,
            budget_interval_ms: 60_000,
            consumer_drift: SupplyDrift::SubtractBoth,
            retailer_drift: SupplyDrift::GenerationOnly,
        }
    }
}

/// A retailer. Unset fields are drawn from `ranges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerSpec {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub price_per_unit: Option<u64>,
    #[serde(default)]
    pub generation_rate: Option<u64>,
    #[serde(default)]
    pub supply: Option<i64>,
}

impl RetailerSpec {
    pub fn named(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            price_per_unit: None,
            generation_rate: None,
            supply: None,
        }
    }

    pub fn initial_state<R: rand::Rng>(&self, rng: &mut R, ranges: &InitialRanges) -> ParticipantState {
        let mut state = ParticipantState::random_supplier(rng, ranges);
        if let Some(price) = self.price_per_unit {
            state.price_per_unit = price;
        }
        if let Some(rate) = self.generation_rate {
            state.generation_rate = rate;
        }
        if let Some(supply) = self.supply {
            state.supply = supply;
        }
        state
    }
}

/// A home. Unset fields are drawn from `ranges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeSpec {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub budget: Option<u64>,
    #[serde(default)]
    pub generation_rate: Option<u64>,
    #[serde(default)]
    pub usage_rate: Option<u64>,
    #[serde(default)]
    pub supply: Option<i64>,
    /// Retailer to buy from while it is listed in the directory.
    #[serde(default)]
    pub retailer: Option<AgentId>,
}

impl HomeSpec {
    pub fn named(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            budget: None,
            generation_rate: None,
            usage_rate: None,
            supply: None,
            retailer: None,
        }
    }

    pub fn initial_state<R: rand::Rng>(&self, rng: &mut R, ranges: &InitialRanges) -> ParticipantState {
        let mut state = ParticipantState::random_consumer(rng, ranges);
        if let Some(budget) = self.budget {
            state.budget = budget;
        }
        if let Some(rate) = self.generation_rate {
            state.generation_rate = rate;
        }
        if let Some(rate) = self.usage_rate {
            state.usage_rate = rate;
        }
        if let Some(supply) = self.supply {
            state.supply = supply;
        }
        state
    }
}

impl ScenarioConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MarketError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| match e {
            MarketError::Config { reason, .. } => MarketError::Config {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, MarketError> {
        let config: Self = serde_json::from_str(content).map_err(|e| MarketError::Config {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Supply is a non-negative quantity when an agent starts.
    fn validate(&self) -> Result<(), MarketError> {
        let pinned = self
            .retailers
            .iter()
            .map(|r| ("retailer", r.id, r.supply))
            .chain(self.homes.iter().map(|h| ("home", h.id, h.supply)));
        for (role, id, supply) in pinned {
            if let Some(supply) = supply.filter(|s| *s < 0) {
                return Err(MarketError::Config {
                    path: "<inline>".to_string(),
                    reason: format!("{role} {id}: supply must be non-negative, got {supply}"),
                });
            }
        }
        Ok(())
    }

    pub fn tick_ns(&self) -> u64 {
        self.tick_ms.max(1).saturating_mul(NS_PER_MS)
    }

    /// Number of kernel ticks covering `duration_sec`.
    pub fn max_ticks(&self) -> usize {
        let ticks = self.duration_sec.saturating_mul(1_000) / self.tick_ms.max(1);
        usize::try_from(ticks).unwrap_or(usize::MAX)
    }

    pub fn home_config(&self, spec: &HomeSpec) -> HomeConfig {
        HomeConfig {
            negotiation: NegotiationSettings {
                reply_timeout_ns: self.negotiation.reply_timeout_ms.saturating_mul(NS_PER_MS),
                cooldown_max_ns: self.negotiation.cooldown_max_ms.saturating_mul(NS_PER_MS),
                capability: self.negotiation.capability.clone(),
                preferred: spec.retailer,
            },
            policy: self.policy,
            supply_tick_max_ns: self.tasks.supply_tick_max_ms.saturating_mul(NS_PER_MS),
            budget_interval_ns: self.tasks.budget_interval_ms.saturating_mul(NS_PER_MS),
            drift: self.tasks.consumer_drift,
        }
    }

    pub fn retailer_config(&self) -> RetailerConfig {
        RetailerConfig {
            capability: self.negotiation.capability.clone(),
            supply_tick_max_ns: self.tasks.supply_tick_max_ms.saturating_mul(NS_PER_MS),
            drift: self.tasks.retailer_drift,
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            scenario_name: default_scenario_name(),
            duration_sec: default_duration_sec(),
            logs_dir: default_logs_dir(),
            seed: default_seed(),
            tick_ms: default_tick_ms(),
            latency: LatencyConfig::default(),
            negotiation: NegotiationConfig::default(),
            tasks: TaskConfig::default(),
            policy: PurchasePolicy::default(),
            ranges: InitialRanges::default(),
            retailers: default_retailers(),
            homes: default_homes(),
        }
    }
}

/// Look for `<name>.json` in the usual places.
pub fn find_config_file(scenario_name: &str) -> Option<String> {
    let candidates = [
        format!("energy-sim/src/scenarios/{scenario_name}.json"),
        format!("src/scenarios/{scenario_name}.json"),
        format!("scenarios/{scenario_name}.json"),
        format!("{scenario_name}.json"),
    ];
    candidates.into_iter().find(|path| Path::new(path).exists())
}
