// src/kernel.rs
// Core simulation kernel: virtual time, priority queue for messages and
// timers, and serial delivery into agents.
//
// Exactly one handler runs at a time and it runs to completion before the
// next delivery. Agents rely on this to mutate their own state without locks.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, info};

use crate::agents::Agent;
use crate::directory::{DirectoryService, InMemoryDirectory};
use crate::events::{EventBus, SimEvent};
use crate::latency::LatencyModel;
use crate::messages::{AgentId, Message, MessagePayload, Protocol, SimulatorApi, Timer, TimerId};

/// Queue entry. Min-heap by `at`, FIFO among equal `at` (by `seq`), so an
/// AGREE sent before an INFORM is also delivered before it.
struct ScheduledMessage {
    seq: u64,
    msg: Message,
}

impl Eq for ScheduledMessage {}

impl PartialEq for ScheduledMessage {
    fn eq(&self, other: &Self) -> bool {
        self.msg.at == other.msg.at && self.seq == other.seq
    }
}

impl Ord for ScheduledMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering: smaller `at` = "greater" priority
        other
            .msg
            .at
            .cmp(&self.msg.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Simulation kernel.
/// Owns the agents, virtual time, the message queue, the directory and the EventBus.
pub struct Kernel {
    time_ns: u64,
    tick_ns: u64,
    latency: Box<dyn LatencyModel>,
    queue: BinaryHeap<ScheduledMessage>,
    next_seq: u64,
    next_timer: u64,
    /// Timers not yet fired or cancelled, with their owner.
    pending_timers: HashMap<TimerId, AgentId>,
    agents: Vec<Box<dyn Agent>>,
    directory: Box<dyn DirectoryService>,
    event_bus: EventBus,
}

impl Kernel {
    /// Create a kernel with an empty in-memory directory.
    /// Virtual time starts at the current Unix time.
    pub fn new(latency: Box<dyn LatencyModel>, tick_ns: u64) -> Self {
        Self::with_directory(latency, tick_ns, Box::new(InMemoryDirectory::new()))
    }

    pub fn with_directory(
        latency: Box<dyn LatencyModel>,
        tick_ns: u64,
        directory: Box<dyn DirectoryService>,
    ) -> Self {
        let time_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        Self {
            time_ns,
            tick_ns,
            latency,
            queue: BinaryHeap::new(),
            next_seq: 0,
            next_timer: 0,
            pending_timers: HashMap::new(),
            agents: Vec::new(),
            directory,
            event_bus: EventBus::new(),
        }
    }

    /// Access to the event bus (for SimEngine to subscribe loggers).
    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.event_bus
    }

    pub fn time_ns(&self) -> u64 {
        self.time_ns
    }

    #[cfg(test)]
    pub fn tick_ns(&self) -> u64 {
        self.tick_ns
    }

    #[cfg(test)]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Messages and timers still waiting for delivery.
    #[cfg(test)]
    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    /// Add a new agent into the simulation.
    pub fn add_agent(&mut self, mut agent: Box<dyn Agent>) {
        info!(agent = agent.name(), id = agent.id(), "registering agent");
        // Let the agent initialize itself using the simulator API.
        agent.on_start(self);
        self.agents.push(agent);
    }

    /// Stop one agent: run its `on_stop`, drop its queued timers and inbound
    /// messages. Later messages addressed to it are dropped on delivery.
    pub fn remove_agent(&mut self, id: AgentId) -> bool {
        let Some(idx) = self.agents.iter().position(|a| a.id() == id) else {
            return false;
        };
        let mut agent = self.agents.remove(idx);
        agent.on_stop(self);

        self.queue.retain(|sm| sm.msg.to != id);
        self.pending_timers.retain(|_, owner| *owner != id);
        info!(agent = agent.name(), id, "agent stopped");
        true
    }

    /// Advance virtual time by one tick and deliver everything due.
    /// Returns false once the queue is empty.
    pub fn step(&mut self) -> bool {
        self.time_ns = self.time_ns.saturating_add(self.tick_ns);

        // Deliver all messages whose delivery time is <= now.
        while let Some(next_at) = self.queue.peek().map(|sm| sm.msg.at) {
            if next_at > self.time_ns {
                break;
            }
            let Some(sm) = self.queue.pop() else {
                break;
            };
            self.deliver(sm.msg);
        }

        !self.queue.is_empty()
    }

    /// Step up to `max_steps` ticks without stopping the agents.
    /// Returns the number of ticks taken.
    pub fn advance(&mut self, max_steps: usize) -> usize {
        for step in 0..max_steps {
            if !self.step() {
                debug!(ticks = step + 1, "queue is empty");
                return step + 1;
            }
        }
        max_steps
    }

    /// Run the simulation for `max_steps` ticks, or until the queue is empty,
    /// then shut every agent down.
    pub fn run(&mut self, max_steps: usize) {
        info!(
            agents = self.agents.len(),
            tick_ns = self.tick_ns,
            start_ns = self.time_ns,
            "starting simulation"
        );

        let ticks = self.advance(max_steps);
        if ticks < max_steps {
            info!(ticks, "queue is empty, stopping early");
        }

        self.shutdown();
        info!(time_ns = self.time_ns, "simulation finished");
    }

    /// Stop all agents in registration order and cancel everything pending.
    pub fn shutdown(&mut self) {
        let ids: Vec<AgentId> = self.agents.iter().map(|a| a.id()).collect();
        for id in ids {
            self.remove_agent(id);
        }
        self.queue.clear();
        self.pending_timers.clear();
    }

    fn push(&mut self, msg: Message) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledMessage { seq, msg });
    }

    fn deliver(&mut self, msg: Message) {
        if let MessagePayload::Timer(timer_id, _) = msg.payload {
            if self.pending_timers.remove(&timer_id).is_none() {
                // cancelled
                return;
            }
        }

        let Some(idx) = self.agents.iter().position(|a| a.id() == msg.to) else {
            debug!(to = msg.to, msg_type = ?msg.msg_type, "message for unknown agent dropped");
            return;
        };

        // Temporarily move agent out of the vector to avoid
        // aliasing &mut self and &mut agent at the same time.
        let mut agent = self.agents.remove(idx);
        {
            let sim: &mut dyn SimulatorApi = self;
            match &msg.payload {
                MessagePayload::Timer(_, timer) => agent.on_wakeup(sim, msg.at, *timer),
                _ => agent.on_message(sim, &msg),
            }
        }
        self.agents.insert(idx, agent);
    }
}

impl SimulatorApi for Kernel {
    fn now_ns(&self) -> u64 {
        self.time_ns
    }

    fn send(&mut self, mut msg: Message) {
        let network = self.latency.delay_ns(msg.from, msg.to);
        let compute = self.latency.compute_ns(msg.to);
        msg.at = self.time_ns.saturating_add(network).saturating_add(compute);

        if msg.protocol == Protocol::Request {
            self.event_bus.emit(SimEvent::MessageLog {
                ts: self.time_ns,
                from: msg.from,
                to: msg.to,
                msg_type: msg.msg_type,
                conversation: msg.conversation_id,
            });
        }

        self.push(msg);
    }

    fn schedule(&mut self, agent_id: AgentId, at_ns: u64, timer: Timer) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending_timers.insert(id, agent_id);
        self.push(Message::wakeup(agent_id, at_ns, id, timer));
        id
    }

    fn cancel(&mut self, timer_id: TimerId) {
        self.pending_timers.remove(&timer_id);
    }

    fn directory(&mut self) -> &mut dyn DirectoryService {
        self.directory.as_mut()
    }

    fn emit(&mut self, event: SimEvent) {
        self.event_bus.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latency::FixedLatency;
    use crate::messages::{ConversationId, MessageType};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Hook = Box<dyn FnMut(&mut dyn SimulatorApi)>;
    type Log = Rc<RefCell<Vec<(AgentId, String)>>>;

    struct Stub {
        id: AgentId,
        log: Log,
        start: Option<Hook>,
    }

    impl Stub {
        fn boxed(id: AgentId, log: &Log, start: Option<Hook>) -> Box<dyn Agent> {
            Box::new(Self {
                id,
                log: log.clone(),
                start,
            })
        }
    }

    impl Agent for Stub {
        fn id(&self) -> AgentId {
            self.id
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
            if let Some(mut hook) = self.start.take() {
                hook(sim);
            }
        }

        fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
            self.log.borrow_mut().push((self.id, "stop".into()));
        }

        fn on_wakeup(&mut self, _sim: &mut dyn SimulatorApi, _now_ns: u64, timer: Timer) {
            self.log.borrow_mut().push((self.id, format!("{timer:?}")));
        }

        fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
            self.log.borrow_mut().push((self.id, format!("{:?}", msg.msg_type)));
        }
    }

    fn kernel() -> Kernel {
        Kernel::new(Box::new(FixedLatency::new(1_000, 0)), 10_000)
    }

    fn conv() -> ConversationId {
        ConversationId { initiator: 2, seq: 0 }
    }

    #[test]
    fn equal_delivery_times_keep_send_order() {
        let log: Log = Rc::default();
        let mut k = kernel();
        k.add_agent(Stub::boxed(1, &log, None));
        k.add_agent(Stub::boxed(
            2,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let query = Message::request(1, 2, MessageType::QueryRef, conv(), u64::MAX, MessagePayload::Empty);
                sim.send(query.create_reply(MessageType::Agree, MessagePayload::Empty));
                sim.send(query.create_reply(MessageType::Inform, MessagePayload::Text("4".into())));
            })),
        ));

        k.advance(3);

        let seen: Vec<_> = log.borrow().iter().map(|(_, s)| s.clone()).collect();
        assert_eq!(seen, vec!["Agree", "Inform"]);
    }

    #[test]
    fn timers_fire_in_time_order_and_cancelled_ones_never_fire() {
        let log: Log = Rc::default();
        let mut k = kernel();
        k.add_agent(Stub::boxed(
            1,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let now = sim.now_ns();
                sim.schedule(1, now + 30_000, Timer::BudgetTick);
                let doomed = sim.schedule(1, now + 20_000, Timer::Cooldown);
                sim.schedule(1, now + 10_000, Timer::SupplyTick);
                sim.cancel(doomed);
            })),
        ));

        k.advance(5);

        let seen: Vec<_> = log.borrow().iter().map(|(_, s)| s.clone()).collect();
        assert_eq!(seen, vec!["SupplyTick", "BudgetTick"]);
        assert_eq!(k.pending_messages(), 0);
    }

    #[test]
    fn removed_agent_gets_nothing_further() {
        let log: Log = Rc::default();
        let mut k = kernel();
        k.add_agent(Stub::boxed(
            1,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let now = sim.now_ns();
                sim.schedule(1, now + 50_000, Timer::SupplyTick);
            })),
        ));
        k.add_agent(Stub::boxed(
            2,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let query = Message::request(1, 2, MessageType::QueryRef, conv(), u64::MAX, MessagePayload::Empty);
                sim.send(query.create_reply(MessageType::Inform, MessagePayload::Empty));
            })),
        ));

        assert!(k.remove_agent(1));
        assert!(!k.remove_agent(1));
        assert_eq!(k.pending_messages(), 0);

        k.advance(10);
        assert_eq!(*log.borrow(), vec![(1, "stop".to_string())]);
        assert_eq!(k.agent_count(), 1);
    }

    #[test]
    fn message_to_unknown_agent_is_dropped() {
        let log: Log = Rc::default();
        let mut k = kernel();
        k.add_agent(Stub::boxed(
            1,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let query = Message::request(1, 99, MessageType::QueryRef, conv(), u64::MAX, MessagePayload::Empty);
                sim.send(query);
            })),
        ));

        k.advance(3);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn run_stops_early_and_shuts_agents_down() {
        let log: Log = Rc::default();
        let mut k = kernel();
        k.add_agent(Stub::boxed(
            1,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let now = sim.now_ns();
                sim.schedule(1, now + 10_000, Timer::SupplyTick);
            })),
        ));
        k.add_agent(Stub::boxed(2, &log, None));
        let start = k.time_ns();

        k.run(1_000);

        assert!(k.time_ns() - start < 1_000 * 10_000);
        assert_eq!(k.agent_count(), 0);
        let seen = log.borrow();
        assert_eq!(seen[0], (1, "SupplyTick".to_string()));
        assert!(seen.contains(&(1, "stop".to_string())));
        assert!(seen.contains(&(2, "stop".to_string())));
    }

    #[test]
    fn request_traffic_is_published_on_the_bus() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut k = kernel();
        {
            let events = events.clone();
            k.event_bus_mut()
                .subscribe(Box::new(crate::events::ClosureListener::new(move |ev: &SimEvent| {
                    events.borrow_mut().push(ev.clone());
                })));
        }
        let log: Log = Rc::default();
        k.add_agent(Stub::boxed(
            2,
            &log,
            Some(Box::new(|sim: &mut dyn SimulatorApi| {
                let now = sim.now_ns();
                sim.schedule(2, now, Timer::Cooldown);
                sim.send(Message::request(2, 1, MessageType::QueryRef, conv(), u64::MAX, MessagePayload::Empty));
            })),
        ));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SimEvent::MessageLog { from: 2, to: 1, msg_type: MessageType::QueryRef, .. }
        ));
    }
}
