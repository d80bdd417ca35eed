// src/responder.rs
// Supplier side of the request protocol: every QUERY_REF / REQUEST gets an
// AGREE, REFUSE or NOT_UNDERSTOOD, and after AGREE an INFORM or FAILURE.

use tracing::{debug, info};

use crate::messages::{AgentId, Message, MessagePayload, MessageType, Protocol, SimulatorApi};
use crate::state::{ExchangeAction, ParticipantState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseDecision {
    Agree,
    #[allow(dead_code)]
    Refuse(String),
    NotUnderstood(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultNotification {
    Inform(MessagePayload),
    Failure(String),
}

/// Decides how a supplier answers. Swappable per retailer.
pub trait ResponsePolicy {
    fn handle_request(&mut self, request: &Message, state: &ParticipantState) -> ResponseDecision;

    /// Called only after `handle_request` agreed.
    fn prepare_result(&mut self, request: &Message, state: &mut ParticipantState) -> ResultNotification;
}

/// Agrees to every well-formed request. Quotes the current unit price and
/// acknowledges purchases without touching supplier state.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAgree;

impl ResponsePolicy for AlwaysAgree {
    fn handle_request(&mut self, request: &Message, _state: &ParticipantState) -> ResponseDecision {
        if request.msg_type != MessageType::Request {
            return ResponseDecision::Agree;
        }
        let Some(content) = request.payload.text() else {
            return ResponseDecision::NotUnderstood("missing action content".to_string());
        };
        match ExchangeAction::decode(content) {
            Ok(_) => ResponseDecision::Agree,
            Err(err) => ResponseDecision::NotUnderstood(err.to_string()),
        }
    }

    fn prepare_result(&mut self, request: &Message, state: &mut ParticipantState) -> ResultNotification {
        match request.msg_type {
            MessageType::QueryRef => ResultNotification::Inform(MessagePayload::Text(state.price_per_unit.to_string())),
            // Selling out of supply is not modelled yet, the purchase is only acknowledged.
            MessageType::Request => ResultNotification::Inform(MessagePayload::Empty),
            other => ResultNotification::Failure(format!("unsupported request {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
    pub quotes: u64,
    pub purchases: u64,
    pub refused: u64,
    pub not_understood: u64,
    pub failures: u64,
    pub expired: u64,
}

pub struct ResponderProtocol {
    owner: AgentId,
    policy: Box<dyn ResponsePolicy>,
    stats: ResponderStats,
}

impl ResponderProtocol {
    pub fn new(owner: AgentId, policy: Box<dyn ResponsePolicy>) -> Self {
        Self {
            owner,
            policy,
            stats: ResponderStats::default(),
        }
    }

    pub fn stats(&self) -> ResponderStats {
        self.stats
    }

    pub fn matches(msg: &Message) -> bool {
        msg.protocol == Protocol::Request && matches!(msg.msg_type, MessageType::QueryRef | MessageType::Request)
    }

    /// Answer one inbound request. Returns false if `msg` is not a request
    /// this protocol handles.
    pub fn respond(&mut self, sim: &mut dyn SimulatorApi, state: &mut ParticipantState, msg: &Message) -> bool {
        if !Self::matches(msg) {
            return false;
        }

        let now = sim.now_ns();
        if msg.reply_by_ns.is_some_and(|reply_by| reply_by < now) {
            self.stats.expired += 1;
            debug!(agent = self.owner, from = msg.from, msg_type = ?msg.msg_type, "request past its deadline dropped");
            return true;
        }

        match self.policy.handle_request(msg, state) {
            ResponseDecision::Agree => {
                sim.send(msg.create_reply(MessageType::Agree, MessagePayload::Empty));
                match self.policy.prepare_result(msg, state) {
                    ResultNotification::Inform(payload) => {
                        if msg.msg_type == MessageType::QueryRef {
                            self.stats.quotes += 1;
                        } else {
                            self.stats.purchases += 1;
                            info!(agent = self.owner, home = msg.from, "purchase acknowledged");
                        }
                        sim.send(msg.create_reply(MessageType::Inform, payload));
                    }
                    ResultNotification::Failure(reason) => {
                        self.stats.failures += 1;
                        sim.send(msg.create_reply(MessageType::Failure, MessagePayload::Text(reason)));
                    }
                }
            }
            ResponseDecision::Refuse(reason) => {
                self.stats.refused += 1;
                debug!(agent = self.owner, from = msg.from, %reason, "request refused");
                sim.send(msg.create_reply(MessageType::Refuse, MessagePayload::Text(reason)));
            }
            ResponseDecision::NotUnderstood(reason) => {
                self.stats.not_understood += 1;
                debug!(agent = self.owner, from = msg.from, %reason, "request not understood");
                sim.send(msg.create_reply(MessageType::NotUnderstood, MessagePayload::Text(reason)));
            }
        }
        true
    }
}
