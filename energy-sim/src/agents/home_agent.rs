// src/agents/home_agent.rs
// Consumer agent: runs the negotiation cycle while its supply and budget
// tasks mutate the same state between handler calls.

use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::agents::Agent;
use crate::events::SimEvent;
use crate::messages::{AgentId, Message, SimulatorApi, Timer};
use crate::negotiation::{NegotiationCycle, NegotiationSettings};
use crate::policy::PurchasePolicy;
use crate::scheduler::{
    apply_supply_drift, renew_budget, Period, PeriodicTask, SupplyDrift, DEFAULT_BUDGET_INTERVAL_NS,
    DEFAULT_SUPPLY_TICK_MAX_NS,
};
use crate::state::ParticipantState;

#[derive(Debug, Clone)]
pub struct HomeConfig {
    pub negotiation: NegotiationSettings,
    pub policy: PurchasePolicy,
    pub supply_tick_max_ns: u64,
    pub budget_interval_ns: u64,
    pub drift: SupplyDrift,
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            negotiation: NegotiationSettings::default(),
            policy: PurchasePolicy::default(),
            supply_tick_max_ns: DEFAULT_SUPPLY_TICK_MAX_NS,
            budget_interval_ns: DEFAULT_BUDGET_INTERVAL_NS,
            drift: SupplyDrift::default(),
        }
    }
}

pub struct HomeAgent {
    id: AgentId,
    name: String,
    state: ParticipantState,
    rng: StdRng,
    cycle: NegotiationCycle,
    supply_task: PeriodicTask,
    budget_task: PeriodicTask,
    drift: SupplyDrift,
}

impl HomeAgent {
    pub fn new(id: AgentId, name: impl Into<String>, state: ParticipantState, config: HomeConfig, rng: StdRng) -> Self {
        Self {
            id,
            name: name.into(),
            state,
            rng,
            cycle: NegotiationCycle::new(id, config.negotiation, config.policy),
            supply_task: PeriodicTask::new(Timer::SupplyTick, Period::UpTo(config.supply_tick_max_ns)),
            budget_task: PeriodicTask::new(Timer::BudgetTick, Period::Fixed(config.budget_interval_ns)),
            drift: config.drift,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &ParticipantState {
        &self.state
    }

    #[cfg(test)]
    pub fn cycle(&self) -> &NegotiationCycle {
        &self.cycle
    }

    fn on_supply_tick(&mut self, sim: &mut dyn SimulatorApi) {
        let change = apply_supply_drift(&mut self.state, self.drift);
        info!(agent = self.id, change, supply = self.state.supply, "supply drift");

        let ts = sim.now_ns();
        sim.emit(SimEvent::SupplyChanged {
            ts,
            agent: self.id,
            change,
            supply: self.state.supply,
        });
        self.supply_task.on_fired(sim, self.id, &mut self.rng);
    }

    fn on_budget_tick(&mut self, sim: &mut dyn SimulatorApi) {
        info!(agent = self.id, spent = self.state.expenditure, budget = self.state.budget, "budget renewed");
        renew_budget(&mut self.state);

        let ts = sim.now_ns();
        sim.emit(SimEvent::BudgetReset { ts, agent: self.id });
        self.budget_task.on_fired(sim, self.id, &mut self.rng);
    }
}

impl Agent for HomeAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        info!(agent = self.id, name = %self.name, state = %self.state, "home started");
        self.supply_task.start(sim, self.id, &mut self.rng);
        self.budget_task.start(sim, self.id, &mut self.rng);
        self.cycle.start_cycle(sim, &mut self.rng);
    }

    fn on_stop(&mut self, sim: &mut dyn SimulatorApi) {
        self.supply_task.cancel(sim);
        self.budget_task.cancel(sim);
        self.cycle.abandon(sim);

        let stats = self.cycle.stats();
        info!(
            agent = self.id,
            name = %self.name,
            cycles = stats.cycles,
            purchases = stats.purchases,
            timeouts = stats.timeouts,
            supply_ticks = self.supply_task.firings(),
            budget_resets = self.budget_task.firings(),
            state = %self.state,
            "home stopped"
        );
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, _now_ns: u64, timer: Timer) {
        match timer {
            Timer::Cooldown => self.cycle.on_cooldown_elapsed(sim, &mut self.rng),
            Timer::ReplyDeadline(conversation) => {
                self.cycle.on_deadline(sim, &self.state, &mut self.rng, conversation)
            }
            Timer::SupplyTick => self.on_supply_tick(sim),
            Timer::BudgetTick => self.on_budget_tick(sim),
        }
    }

    fn on_message(&mut self, sim: &mut dyn SimulatorApi, msg: &Message) {
        if msg.msg_type.is_reply() {
            self.cycle.on_reply(sim, &mut self.state, &mut self.rng, msg);
        } else {
            debug!(agent = self.id, from = msg.from, msg_type = ?msg.msg_type, "home ignores requests");
        }
    }
}
