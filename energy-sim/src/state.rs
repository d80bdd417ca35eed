// src/state.rs
// Per-agent numeric state and the exchange order carried by purchase requests.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::messages::AgentId;

/// Resource and financial state owned by exactly one agent.
///
/// Consumers use `budget`/`expenditure`/`usage_rate`; suppliers use
/// `price_per_unit`. Both use `generation_rate` and `supply`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantState {
    pub budget: u64,
    pub expenditure: u64,
    pub generation_rate: u64,
    pub usage_rate: u64,
    /// Negative supply is a shortage.
    pub supply: i64,
    pub price_per_unit: u64,
}

impl ParticipantState {
    pub fn consumer(budget: u64, generation_rate: u64, usage_rate: u64, supply: i64) -> Self {
        Self {
            budget,
            generation_rate,
            usage_rate,
            supply,
            ..Self::default()
        }
    }

    pub fn supplier(generation_rate: u64, price_per_unit: u64, supply: i64) -> Self {
        Self {
            generation_rate,
            price_per_unit,
            supply,
            ..Self::default()
        }
    }

    pub fn random_consumer<R: Rng>(rng: &mut R, ranges: &InitialRanges) -> Self {
        Self::consumer(
            sample_below(rng, ranges.budget_max),
            sample_below(rng, ranges.generation_max),
            sample_below(rng, ranges.usage_max),
            sample_supply(rng, ranges.supply_max),
        )
    }

    pub fn random_supplier<R: Rng>(rng: &mut R, ranges: &InitialRanges) -> Self {
        let generation_rate = sample_below(rng, ranges.generation_max);
        let price_per_unit = if ranges.price_min >= ranges.price_max {
            ranges.price_min
        } else {
            rng.gen_range(ranges.price_min..=ranges.price_max)
        };
        let supply = sample_supply(rng, ranges.supply_max);
        Self::supplier(generation_rate, price_per_unit, supply)
    }

    pub fn remaining_budget(&self) -> u64 {
        self.budget.saturating_sub(self.expenditure)
    }

    /// Add the cost of a confirmed order to the expenditure. Returns the cost.
    pub fn record_expenditure(&mut self, order: &ExchangeOrder) -> u64 {
        let cost = order.cost();
        self.expenditure = self.expenditure.saturating_add(cost);
        cost
    }

    pub fn reset_expenditure(&mut self) {
        self.expenditure = 0;
    }

    pub fn adjust_supply(&mut self, delta: i64) {
        self.supply = self.supply.saturating_add(delta);
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "budget={} expenditure={} generation={} usage={} supply={} price={}",
            self.budget,
            self.expenditure,
            self.generation_rate,
            self.usage_rate,
            self.supply,
            self.price_per_unit
        )
    }
}

fn sample_below<R: Rng>(rng: &mut R, max: u64) -> u64 {
    if max == 0 {
        0
    } else {
        rng.gen_range(0..max)
    }
}

/// Initial supply is drawn from the non-negative half of `i64`.
fn sample_supply<R: Rng>(rng: &mut R, max: u64) -> i64 {
    let max = max.min(i64::MAX.unsigned_abs());
    i64::try_from(sample_below(rng, max)).unwrap_or(i64::MAX)
}

/// Ranges for randomized initial state. Upper bounds are exclusive except
/// `price_max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialRanges {
    #[serde(default = "default_budget_max")]
    pub budget_max: u64,
    #[serde(default = "default_generation_max")]
    pub generation_max: u64,
    #[serde(default = "default_usage_max")]
    pub usage_max: u64,
    #[serde(default = "default_supply_max")]
    pub supply_max: u64,
    #[serde(default = "default_price_min")]
    pub price_min: u64,
    #[serde(default = "default_price_max")]
    pub price_max: u64,
}

fn default_budget_max() -> u64 {
    100
}
fn default_generation_max() -> u64 {
    10
}
fn default_usage_max() -> u64 {
    100
}
fn default_supply_max() -> u64 {
    2000
}
fn default_price_min() -> u64 {
    1
}
fn default_price_max() -> u64 {
    5
}

impl Default for InitialRanges {
    fn default() -> Self {
        Self {
            budget_max: default_budget_max(),
            generation_max: default_generation_max(),
            usage_max: default_usage_max(),
            supply_max: default_supply_max(),
            price_min: default_price_min(),
            price_max: default_price_max(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Buy,
    /// Reserved for supplier-side selling, which no agent initiates yet.
    Sell,
}

/// One purchase attempt. Built once, never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub kind: ExchangeKind,
    pub price_per_unit: u64,
    pub units: u64,
}

impl ExchangeOrder {
    pub fn buy(price_per_unit: u64, units: u64) -> Self {
        Self {
            kind: ExchangeKind::Buy,
            price_per_unit,
            units,
        }
    }

    pub fn cost(&self) -> u64 {
        self.price_per_unit.saturating_mul(self.units)
    }
}

/// Action content of a purchase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeAction {
    pub initiator: AgentId,
    pub order: ExchangeOrder,
}

impl ExchangeAction {
    pub fn encode(&self) -> Result<String, MarketError> {
        serde_json::to_string(self).map_err(|e| MarketError::PayloadEncoding(e.to_string()))
    }

    pub fn decode(content: &str) -> Result<Self, MarketError> {
        serde_json::from_str(content).map_err(|e| MarketError::PayloadEncoding(e.to_string()))
    }
}
