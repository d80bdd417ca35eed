// Test double for `SimulatorApi`: records traffic instead of delivering it,
// and lets a test fire timers by hand in any order.

use crate::directory::{AgentDescriptor, DirectoryService, InMemoryDirectory, RETAILER_CAPABILITY};
use crate::events::SimEvent;
use crate::messages::{AgentId, Message, MessageType, SimulatorApi, Timer, TimerId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTimer {
    pub id: TimerId,
    pub owner: AgentId,
    pub at: u64,
    pub timer: Timer,
    live: bool,
}

#[derive(Debug, Default)]
pub struct RecordingSim {
    pub now: u64,
    pub sent: Vec<Message>,
    pub events: Vec<SimEvent>,
    pub directory: InMemoryDirectory,
    timers: Vec<ScheduledTimer>,
    next_timer: u64,
}

impl RecordingSim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retailer(id: AgentId) -> Self {
        let mut sim = Self::new();
        sim.directory
            .register(AgentDescriptor::new(id, format!("retailer-{id}")), RETAILER_CAPABILITY)
            .unwrap();
        sim
    }

    /// Most recent live timer matching `pred`.
    pub fn live_timer(&self, pred: impl Fn(&Timer) -> bool) -> Option<ScheduledTimer> {
        self.timers.iter().rev().find(|t| t.live && pred(&t.timer)).copied()
    }

    pub fn live_timers(&self) -> Vec<ScheduledTimer> {
        self.timers.iter().filter(|t| t.live).copied().collect()
    }

    /// Consume a timer as the kernel would on delivery and move the clock to
    /// its due time. Returns None if it was cancelled or already fired.
    pub fn fire(&mut self, id: TimerId) -> Option<Timer> {
        let entry = self.timers.iter_mut().find(|t| t.id == id && t.live)?;
        entry.live = false;
        self.now = self.now.max(entry.at);
        Some(entry.timer)
    }

    pub fn sent_of(&self, msg_type: MessageType) -> Vec<&Message> {
        self.sent.iter().filter(|m| m.msg_type == msg_type).collect()
    }

    pub fn last_sent(&self) -> Option<&Message> {
        self.sent.last()
    }
}

impl SimulatorApi for RecordingSim {
    fn now_ns(&self) -> u64 {
        self.now
    }

    fn send(&mut self, mut msg: Message) {
        msg.at = self.now;
        self.sent.push(msg);
    }

    fn schedule(&mut self, agent_id: AgentId, at_ns: u64, timer: Timer) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.timers.push(ScheduledTimer {
            id,
            owner: agent_id,
            at: at_ns,
            timer,
            live: true,
        });
        id
    }

    fn cancel(&mut self, timer_id: TimerId) {
        if let Some(entry) = self.timers.iter_mut().find(|t| t.id == timer_id) {
            entry.live = false;
        }
    }

    fn directory(&mut self) -> &mut dyn DirectoryService {
        &mut self.directory
    }

    fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }
}
