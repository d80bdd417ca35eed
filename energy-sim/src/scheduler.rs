// src/scheduler.rs
// Periodic self-rescheduling tasks that mutate an agent's state out-of-band
// from its negotiation cycle.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::messages::{AgentId, SimulatorApi, Timer, TimerId};
use crate::state::ParticipantState;

pub const NS_PER_MS: u64 = 1_000_000;
pub const DEFAULT_SUPPLY_TICK_MAX_NS: u64 = 5 * 60 * 1_000 * NS_PER_MS;
pub const DEFAULT_BUDGET_INTERVAL_NS: u64 = 60 * 1_000 * NS_PER_MS;

/// How one resource-task firing moves `supply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyDrift {
    /// `supply -= generation + usage`. Generation drains supply here, which
    /// looks like a sign error but is kept as the consumer default.
    #[default]
    SubtractBoth,
    /// `supply += generation - usage`
    NetGeneration,
    /// `supply += generation`
    GenerationOnly,
}

impl SupplyDrift {
    pub fn delta(self, state: &ParticipantState) -> i64 {
        let generation = to_signed(state.generation_rate);
        let usage = to_signed(state.usage_rate);
        match self {
            SupplyDrift::SubtractBoth => generation.saturating_add(usage).saturating_neg(),
            SupplyDrift::NetGeneration => generation.saturating_sub(usage),
            SupplyDrift::GenerationOnly => generation,
        }
    }
}

fn to_signed(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Apply one drift step. Returns the signed change.
pub fn apply_supply_drift(state: &mut ParticipantState, drift: SupplyDrift) -> i64 {
    let change = drift.delta(state);
    state.adjust_supply(change);
    change
}

/// Start a new budget period.
pub fn renew_budget(state: &mut ParticipantState) {
    state.reset_expenditure();
}

/// Schedule `timer` for `owner` at `now + delay_ns`.
pub fn schedule_after(sim: &mut dyn SimulatorApi, owner: AgentId, delay_ns: u64, timer: Timer) -> TimerId {
    let at = sim.now_ns().saturating_add(delay_ns);
    sim.schedule(owner, at, timer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Fixed(u64),
    /// Uniform in `[1, max]` nanoseconds, resampled on every firing.
    UpTo(u64),
}

impl Period {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        match *self {
            Period::Fixed(ns) => ns.max(1),
            Period::UpTo(max) if max <= 1 => 1,
            Period::UpTo(max) => rng.gen_range(1..=max),
        }
    }
}

/// A timer that reschedules itself after every firing until cancelled.
#[derive(Debug)]
pub struct PeriodicTask {
    timer: Timer,
    period: Period,
    pending: Option<TimerId>,
    firings: u64,
}

impl PeriodicTask {
    pub fn new(timer: Timer, period: Period) -> Self {
        Self {
            timer,
            period,
            pending: None,
            firings: 0,
        }
    }

    pub fn start<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, owner: AgentId, rng: &mut R) {
        let delay = self.period.sample(rng);
        self.pending = Some(schedule_after(sim, owner, delay, self.timer));
    }

    /// Count a firing and schedule the next one.
    pub fn on_fired<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, owner: AgentId, rng: &mut R) {
        self.firings += 1;
        self.start(sim, owner, rng);
    }

    pub fn cancel(&mut self, sim: &mut dyn SimulatorApi) {
        if let Some(id) = self.pending.take() {
            sim.cancel(id);
        }
    }

    #[cfg(test)]
    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    pub fn firings(&self) -> u64 {
        self.firings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSim;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use test_case::test_case;

    // (generation, usage, supply) after one firing
    #[test_case(SupplyDrift::SubtractBoth, 3, 20, 100 => 77 ; "subtract both")]
    #[test_case(SupplyDrift::NetGeneration, 3, 20, 100 => 83 ; "net generation")]
    #[test_case(SupplyDrift::GenerationOnly, 3, 20, 100 => 103 ; "generation only")]
    #[test_case(SupplyDrift::SubtractBoth, 9, 99, 10 => -98 ; "drifts into shortage")]
    fn drift_step(drift: SupplyDrift, generation: u64, usage: u64, supply: i64) -> i64 {
        let mut state = ParticipantState::consumer(0, generation, usage, supply);
        apply_supply_drift(&mut state, drift);
        state.supply
    }

    #[test]
    fn drift_names_in_json() {
        let drift: SupplyDrift = serde_json::from_str(r#""net_generation""#).unwrap();
        assert_eq!(drift, SupplyDrift::NetGeneration);
        assert_eq!(SupplyDrift::default(), SupplyDrift::SubtractBoth);
    }

    #[test]
    fn random_period_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let ns = Period::UpTo(1_000).sample(&mut rng);
            assert!((1..=1_000).contains(&ns));
        }
        assert_eq!(Period::UpTo(0).sample(&mut rng), 1);
        assert_eq!(Period::Fixed(0).sample(&mut rng), 1);
        assert_eq!(Period::Fixed(60).sample(&mut rng), 60);
    }

    #[test]
    fn budget_is_whole_again_after_every_period() {
        let mut sim = RecordingSim::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut state = ParticipantState::consumer(80, 0, 0, 500);
        let mut task = PeriodicTask::new(Timer::BudgetTick, Period::Fixed(DEFAULT_BUDGET_INTERVAL_NS));
        task.start(&mut sim, 10, &mut rng);

        for n in 1..=5u64 {
            state.expenditure = 13 * n;
            let fired = sim.live_timer(|t| *t == Timer::BudgetTick).unwrap();
            assert_eq!(fired.at, n * DEFAULT_BUDGET_INTERVAL_NS);
            sim.fire(fired.id);

            renew_budget(&mut state);
            task.on_fired(&mut sim, 10, &mut rng);
            assert_eq!(state.remaining_budget(), state.budget);
        }
        assert_eq!(task.firings(), 5);
    }

    #[test]
    fn cancel_leaves_nothing_pending() {
        let mut sim = RecordingSim::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut task = PeriodicTask::new(Timer::SupplyTick, Period::UpTo(DEFAULT_SUPPLY_TICK_MAX_NS));
        task.start(&mut sim, 4, &mut rng);
        assert!(task.is_scheduled());

        task.cancel(&mut sim);
        task.cancel(&mut sim);

        assert!(!task.is_scheduled());
        assert!(sim.live_timers().is_empty());
    }
}
