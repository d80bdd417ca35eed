// src/agents/retailer_agent.rs
// Supplier agent: advertises itself in the directory and answers quote and
// purchase requests through its response policy.

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::directory::{AgentDescriptor, RETAILER_CAPABILITY};
use crate::events::SimEvent;
use crate::messages::{AgentId, Message, SimulatorApi, Timer};
use crate::responder::{AlwaysAgree, ResponderProtocol, ResponsePolicy};
use crate::scheduler::{apply_supply_drift, Period, PeriodicTask, SupplyDrift, DEFAULT_SUPPLY_TICK_MAX_NS};
use crate::state::ParticipantState;

#[derive(Debug, Clone)]
pub struct RetailerConfig {
    pub capability: String,
    pub supply_tick_max_ns: u64,
    pub drift: SupplyDrift,
}

impl Default for RetailerConfig {
    fn default() -> Self {
        Self {
            capability: RETAILER_CAPABILITY.to_string(),
            supply_tick_max_ns: DEFAULT_SUPPLY_TICK_MAX_NS,
            drift: SupplyDrift::GenerationOnly,
        }
    }
}

pub struct RetailerAgent {
    id: AgentId,
    name: String,
    state: ParticipantState,
    rng: StdRng,
    capability: String,
    responder: ResponderProtocol,
    supply_task: PeriodicTask,
    drift: SupplyDrift,
}

impl RetailerAgent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        state: ParticipantState,
        config: RetailerConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            state,
            rng,
            capability: config.capability,
            responder: ResponderProtocol::new(id, Box::new(AlwaysAgree)),
            supply_task: PeriodicTask::new(Timer::SupplyTick, Period::UpTo(config.supply_tick_max_ns)),
            drift: config.drift,
        }
    }

    /// Replace the default always-agree policy.
    #[allow(dead_code)]
    pub fn with_policy(mut self, policy: Box<dyn ResponsePolicy>) -> Self {
        self.responder = ResponderProtocol::new(self.id, policy);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &ParticipantState {
        &self.state
    }
}

impl Agent for RetailerAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        let descriptor = AgentDescriptor::new(self.id, self.name.clone());
        match sim.directory().register(descriptor, &self.capability) {
            Ok(()) => info!(agent = self.id, name = %self.name, price = self.state.price_per_unit, "retailer registered"),
            Err(err) => warn!(agent = self.id, error = %err, "retailer registration failed"),
        }
        self.supply_task.start(sim, self.id, &mut self.rng);
    }

    fn on_stop(&mut self, sim: &mut dyn SimulatorApi) {
        self.supply_task.cancel(sim);
        sim.directory().deregister(self.id);
        let remaining = sim.directory().lookup(&self.capability).map(|found| found.len()).unwrap_or(0);

        let stats = self.responder.stats();
        info!(
            agent = self.id,
            name = %self.name,
            quotes = stats.quotes,
            purchases = stats.purchases,
            supply_ticks = self.supply_task.firings(),
            remaining,
            "retailer stopped"
        );
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, _now_ns: u64, timer: Timer) {
        if timer != Timer::SupplyTick {
            return;
        }
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

    fn on_message(&mut self, sim: &mut dyn SimulatorApi, msg: &Message) {
        if !self.responder.respond(sim, &mut self.state, msg) {
            debug!(agent = self.id, from = msg.from, msg_type = ?msg.msg_type, "unmatched message ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryService;
    use crate::messages::{ConversationId, MessagePayload, MessageType};
    use crate::responder::{ResponseDecision, ResultNotification};
    use crate::testing::RecordingSim;
    use rand::SeedableRng;

    fn retailer(id: AgentId, price: u64) -> RetailerAgent {
        RetailerAgent::new(
            id,
            format!("retailer-{id}"),
            ParticipantState::supplier(4, price, 100),
            RetailerConfig::default(),
            StdRng::seed_from_u64(id as u64),
        )
    }

    fn query(to: AgentId) -> Message {
        Message::request(
            10,
            to,
            MessageType::QueryRef,
            ConversationId { initiator: 10, seq: 0 },
            1_000,
            MessagePayload::Empty,
        )
    }

    #[test]
    fn registers_on_start_and_leaves_on_stop() {
        let mut sim = RecordingSim::new();
        let mut first = retailer(1, 3);
        let mut second = retailer(2, 5);
        first.on_start(&mut sim);
        second.on_start(&mut sim);
        assert_eq!(sim.directory.lookup(RETAILER_CAPABILITY).unwrap().len(), 2);

        first.on_stop(&mut sim);
        let left = sim.directory.lookup(RETAILER_CAPABILITY).unwrap();
        assert_eq!(left, vec![AgentDescriptor::new(2, "retailer-2")]);
        assert!(sim.live_timer(|t| *t == Timer::SupplyTick).is_some());
    }

    #[test]
    fn quotes_its_price() {
        let mut sim = RecordingSim::new();
        let mut agent = retailer(1, 3);
        agent.on_message(&mut sim, &query(1));

        assert_eq!(sim.sent.len(), 2);
        assert_eq!(sim.sent[1].payload.text(), Some("3"));
    }

    #[test]
    fn supply_grows_with_generation() {
        let mut sim = RecordingSim::new();
        let mut agent = retailer(1, 3);
        agent.on_start(&mut sim);

        let t = sim.live_timer(|t| *t == Timer::SupplyTick).unwrap();
        sim.fire(t.id);
        agent.on_wakeup(&mut sim, t.at, Timer::SupplyTick);

        assert_eq!(agent.state().supply, 104);
    }

    struct Refuser;

    impl ResponsePolicy for Refuser {
        fn handle_request(&mut self, _request: &Message, _state: &ParticipantState) -> ResponseDecision {
            ResponseDecision::Refuse("sold out".to_string())
        }

        fn prepare_result(&mut self, _request: &Message, _state: &mut ParticipantState) -> ResultNotification {
            ResultNotification::Failure("sold out".to_string())
        }
    }

    #[test]
    fn injected_policy_is_used() {
        let mut sim = RecordingSim::new();
        let mut agent = retailer(1, 3).with_policy(Box::new(Refuser));
        agent.on_message(&mut sim, &query(1));

        assert_eq!(sim.sent.len(), 1);
        assert_eq!(sim.sent[0].msg_type, MessageType::Refuse);
    }
}
