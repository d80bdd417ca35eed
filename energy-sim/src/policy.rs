//! Purchase policy
//!
//! Decides how many units a home buys at a quoted price:
//! 1. Running low on supply: buy a small capped amount, as far as budget allows
//! 2. Price is cheap: spend the whole remaining budget
//! 3. Otherwise: buy nothing
//!
//! Eligibility for the purchase phase is a separate, coarser check
//! ([`is_purchase_eligible`]) that compares the price against the whole
//! remaining budget. A home can therefore pass eligibility and still get a
//! zero-unit order from [`PurchasePolicy::decide`]; that order is sent as is.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ExchangeOrder;

pub const LOW_SUPPLY_THRESHOLD: i64 = 50;
pub const CHEAP_PRICE_THRESHOLD: u64 = 5;
pub const LOW_SUPPLY_MAX_UNITS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("quoted price is zero, affordable units are undefined")]
    ZeroPrice,
}

/// Enter the purchase phase iff the quote is strictly below the remaining budget.
pub fn is_purchase_eligible(best_price: u64, remaining_budget: u64) -> bool {
    best_price < remaining_budget
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePolicy {
    #[serde(default = "default_low_supply_threshold")]
    pub low_supply_threshold: i64,
    #[serde(default = "default_cheap_price_threshold")]
    pub cheap_price_threshold: u64,
    #[serde(default = "default_low_supply_max_units")]
    pub low_supply_max_units: u64,
}

fn default_low_supply_threshold() -> i64 {
    LOW_SUPPLY_THRESHOLD
}

fn default_cheap_price_threshold() -> u64 {
    CHEAP_PRICE_THRESHOLD
}

fn default_low_supply_max_units() -> u64 {
    LOW_SUPPLY_MAX_UNITS
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            low_supply_threshold: LOW_SUPPLY_THRESHOLD,
            cheap_price_threshold: CHEAP_PRICE_THRESHOLD,
            low_supply_max_units: LOW_SUPPLY_MAX_UNITS,
        }
    }
}

impl PurchasePolicy {
    /// Units to buy at `price` given the remaining budget and current supply.
    pub fn decide(&self, remaining_budget: u64, price: u64, supply: i64) -> Result<u64, PolicyError> {
        if price == 0 {
            return Err(PolicyError::ZeroPrice);
        }
        let max_affordable = remaining_budget / price;

        let units = if supply < self.low_supply_threshold {
            max_affordable.min(self.low_supply_max_units)
        } else if price <= self.cheap_price_threshold {
            max_affordable
        } else {
            0
        };
        Ok(units)
    }

    /// Build the buy order for this purchase attempt.
    pub fn build_order(&self, remaining_budget: u64, price: u64, supply: i64) -> Result<ExchangeOrder, PolicyError> {
        let units = self.decide(remaining_budget, price, supply)?;
        Ok(ExchangeOrder::buy(price, units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExchangeKind;
    use test_case::test_case;

    #[test_case(4, 50 => true ; "cheaper than budget")]
    #[test_case(25, 20 => false ; "dearer than budget")]
    #[test_case(20, 20 => false ; "equal to budget skips")]
    #[test_case(0, 0 => false ; "zero price zero budget")]
    #[test_case(0, 1 => true ; "zero price is eligible")]
    fn eligibility_is_strict(price: u64, remaining: u64) -> bool {
        is_purchase_eligible(price, remaining)
    }

    // (remaining, price, supply) -> units
    #[test_case(50, 4, 30 => 10 ; "low supply capped at ten")]
    #[test_case(20, 4, 30 => 5 ; "low supply limited by budget")]
    #[test_case(50, 9, 49 => 5 ; "low supply ignores price threshold")]
    #[test_case(30, 3, 80 => 10 ; "cheap price buys all affordable")]
    #[test_case(50, 5, 50 => 10 ; "cheap threshold is inclusive")]
    #[test_case(50, 6, 50 => 0 ; "expensive and enough supply")]
    #[test_case(50, 10, 2000 => 0 ; "expensive with large supply")]
    #[test_case(3, 4, 10 => 0 ; "cannot afford one unit")]
    #[test_case(100, 1, -20 => 10 ; "shortage counts as low supply")]
    fn decide_units(remaining: u64, price: u64, supply: i64) -> u64 {
        PurchasePolicy::default().decide(remaining, price, supply).unwrap()
    }

    #[test]
    fn zero_price_is_a_policy_error() {
        let policy = PurchasePolicy::default();
        assert_eq!(policy.decide(50, 0, 30), Err(PolicyError::ZeroPrice));
        assert_eq!(policy.build_order(50, 0, 80), Err(PolicyError::ZeroPrice));
    }

    #[test]
    fn scenario_a_order() {
        let order = PurchasePolicy::default().build_order(50, 4, 30).unwrap();
        assert_eq!(order.kind, ExchangeKind::Buy);
        assert_eq!(order.price_per_unit, 4);
        assert_eq!(order.units, 10);
        assert_eq!(order.cost(), 40);
    }

    #[test]
    fn eligible_purchase_can_still_size_to_zero() {
        let policy = PurchasePolicy::default();
        assert!(is_purchase_eligible(10, 50));
        assert_eq!(policy.decide(50, 10, 80), Ok(0));
    }

    #[test]
    fn thresholds_are_configurable() {
        let policy = PurchasePolicy {
            low_supply_threshold: 100,
            cheap_price_threshold: 2,
            low_supply_max_units: 3,
        };
        assert_eq!(policy.decide(50, 4, 80), Ok(3));
        assert_eq!(policy.decide(50, 4, 100), Ok(0));
        assert_eq!(policy.decide(50, 2, 100), Ok(25));
    }

    #[test]
    fn policy_json_defaults() {
        let policy: PurchasePolicy = serde_json::from_str(r#"{"cheap_price_threshold": 7}"#).unwrap();
        assert_eq!(policy.low_supply_threshold, 50);
        assert_eq!(policy.cheap_price_threshold, 7);
        assert_eq!(policy.low_supply_max_units, 10);
    }
}
