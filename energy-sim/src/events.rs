use crate::messages::{AgentId, ConversationId, MessageType};

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Any conversation message put on the wire.
    MessageLog {
        ts: u64,
        from: AgentId,
        to: AgentId,
        msg_type: MessageType,
        conversation: Option<ConversationId>,
    },

    /// A purchase was confirmed and booked against the home's budget.
    Exchange {
        ts: u64,
        home: AgentId,
        retailer: AgentId,
        price: u64,
        units: u64,
        cost: u64,
        expenditure: u64,
    },

    SupplyChanged {
        ts: u64,
        agent: AgentId,
        change: i64,
        supply: i64,
    },

    BudgetReset {
        ts: u64,
        agent: AgentId,
    },

    ReplyTimeout {
        ts: u64,
        agent: AgentId,
        conversation: ConversationId,
    },
}

pub trait EventListener {
    fn on_event(&mut self, event: &SimEvent);
}

/// Adapts any closure into a listener.
pub struct ClosureListener<F: FnMut(&SimEvent)> {
    closure: F,
}

impl<F: FnMut(&SimEvent)> ClosureListener<F> {
    pub fn new(closure: F) -> Self {
        Self { closure }
    }
}

impl<F: FnMut(&SimEvent)> EventListener for ClosureListener<F> {
    fn on_event(&mut self, event: &SimEvent) {
        (self.closure)(event);
    }
}

pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    /// Subscribe a new listener.
    pub fn subscribe(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Emit an event to all listeners.
    pub fn emit(&mut self, event: SimEvent) {
        for listener in self.listeners.iter_mut() {
            listener.on_event(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn every_listener_sees_every_event() {
        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(0usize));

        let mut bus = EventBus::new();
        {
            let seen_a = seen_a.clone();
            bus.subscribe(Box::new(ClosureListener::new(move |ev: &SimEvent| {
                seen_a.borrow_mut().push(ev.clone());
            })));
        }
        {
            let seen_b = seen_b.clone();
            bus.subscribe(Box::new(ClosureListener::new(move |_: &SimEvent| {
                *seen_b.borrow_mut() += 1;
            })));
        }

        bus.emit(SimEvent::BudgetReset { ts: 1, agent: 10 });
        bus.emit(SimEvent::SupplyChanged { ts: 2, agent: 10, change: -5, supply: 95 });

        assert_eq!(seen_a.borrow().len(), 2);
        assert_eq!(seen_a.borrow()[0], SimEvent::BudgetReset { ts: 1, agent: 10 });
        assert_eq!(*seen_b.borrow(), 2);
    }
}
