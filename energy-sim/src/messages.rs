use std::fmt;

use serde::{Deserialize, Serialize};

use crate::directory::DirectoryService;
use crate::events::SimEvent;

pub type AgentId = u32;

/// Handle returned by [`SimulatorApi::schedule`], used to cancel a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Identifies one request/reply conversation. Unique per initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId {
    pub initiator: AgentId,
    pub seq: u64,
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.initiator, self.seq)
    }
}

/// Message kind. Everything except `Wakeup` is a performative of the
/// request interaction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Wakeup,
    QueryRef,
    Request,
    Agree,
    Refuse,
    Inform,
    Failure,
    NotUnderstood,
}

impl MessageType {
    /// True for performatives a responder sends back to an initiator.
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            MessageType::Agree
                | MessageType::Refuse
                | MessageType::Inform
                | MessageType::Failure
                | MessageType::NotUnderstood
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Kernel-internal traffic (timer wakeups).
    Internal,
    /// Request/agree/inform conversation with a reply-by deadline.
    Request,
}

/// Timers an agent can schedule on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// End of the randomized pause between two negotiation cycles.
    Cooldown,
    /// Reply-by deadline of an open conversation.
    ReplyDeadline(ConversationId),
    /// Resource task: supply drift.
    SupplyTick,
    /// Budget task: expenditure reset.
    BudgetTick,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Empty,
    /// Textual content (quotes, encoded actions, refusal reasons).
    Text(String),
    Timer(TimerId, Timer),
}

impl MessagePayload {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Core message type that flows through the Kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub to: AgentId,
    pub from: AgentId,
    pub msg_type: MessageType,
    pub protocol: Protocol,
    pub conversation_id: Option<ConversationId>,
    /// Absolute simulation time after which replies are no longer awaited.
    pub reply_by_ns: Option<u64>,
    /// Simulation time in nanoseconds when this message should be delivered.
    /// Filled in by the kernel on send.
    pub at: u64,
    pub payload: MessagePayload,
}

impl Message {
    /// Opening message of a conversation (`QueryRef` or `Request`).
    pub fn request(
        from: AgentId,
        to: AgentId,
        msg_type: MessageType,
        conversation_id: ConversationId,
        reply_by_ns: u64,
        payload: MessagePayload,
    ) -> Self {
        Self {
            to,
            from,
            msg_type,
            protocol: Protocol::Request,
            conversation_id: Some(conversation_id),
            reply_by_ns: Some(reply_by_ns),
            at: 0,
            payload,
        }
    }

    /// Reply addressed back to the sender, in the same conversation.
    pub fn create_reply(&self, msg_type: MessageType, payload: MessagePayload) -> Self {
        Self {
            to: self.from,
            from: self.to,
            msg_type,
            protocol: self.protocol,
            conversation_id: self.conversation_id,
            reply_by_ns: self.reply_by_ns,
            at: 0,
            payload,
        }
    }

    /// Timer wakeup an agent sends to itself.
    pub fn wakeup(agent_id: AgentId, at: u64, timer_id: TimerId, timer: Timer) -> Self {
        Self {
            to: agent_id,
            from: agent_id,
            msg_type: MessageType::Wakeup,
            protocol: Protocol::Internal,
            conversation_id: None,
            reply_by_ns: None,
            at,
            payload: MessagePayload::Timer(timer_id, timer),
        }
    }
}

/// Minimal interface that the kernel exposes to agents.
pub trait SimulatorApi {
    /// Return current simulation time in nanoseconds.
    fn now_ns(&self) -> u64;

    /// Deliver a message after the latency model's delay.
    fn send(&mut self, msg: Message);

    /// Schedule `timer` for `agent_id` at the given simulation time.
    fn schedule(&mut self, agent_id: AgentId, at_ns: u64, timer: Timer) -> TimerId;

    /// Cancel a pending timer. Unknown or already fired ids are ignored.
    fn cancel(&mut self, timer_id: TimerId);

    /// Injected directory service.
    fn directory(&mut self) -> &mut dyn DirectoryService;

    /// Publish a domain event to the event bus.
    fn emit(&mut self, event: SimEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_swaps_endpoints_and_keeps_conversation() {
        let conv = ConversationId { initiator: 7, seq: 3 };
        let query = Message::request(7, 1, MessageType::QueryRef, conv, 5_000, MessagePayload::Empty);

        let reply = query.create_reply(MessageType::Inform, MessagePayload::Text("4".into()));

        assert_eq!(reply.from, 1);
        assert_eq!(reply.to, 7);
        assert_eq!(reply.conversation_id, Some(conv));
        assert_eq!(reply.reply_by_ns, Some(5_000));
        assert_eq!(reply.payload.text(), Some("4"));
    }

    #[test]
    fn only_responder_performatives_are_replies() {
        assert!(MessageType::Agree.is_reply());
        assert!(MessageType::NotUnderstood.is_reply());
        assert!(!MessageType::QueryRef.is_reply());
        assert!(!MessageType::Request.is_reply());
        assert!(!MessageType::Wakeup.is_reply());
    }

    #[test]
    fn conversation_id_display() {
        let conv = ConversationId { initiator: 12, seq: 0 };
        assert_eq!(conv.to_string(), "12-0");
    }
}
