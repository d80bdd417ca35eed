//! Error types for the energy market simulation.
//!
//! None of these are fatal to a running simulation: each one is contained to
//! the phase that raised it, logged, and the owning agent carries on.

use thiserror::Error;

use crate::messages::{AgentId, ConversationId};
use crate::policy::PolicyError;

#[derive(Debug, Error)]
pub enum MarketError {
    /// Directory unreachable or no agent offers the capability.
    #[error("no agent registered for capability '{capability}'")]
    LookupFailure { capability: String },

    /// No result arrived before the reply-by deadline.
    #[error("no reply in conversation {conversation} before the deadline")]
    ReplyTimeout { conversation: ConversationId },

    /// The purchase action could not be encoded or decoded.
    #[error("exchange action encoding failed: {0}")]
    PayloadEncoding(String),

    /// Purchase policy could not size an order.
    #[error("purchase policy: {0}")]
    Policy(#[from] PolicyError),

    /// Responder refused the request.
    #[error("agent {agent} refused: {reason}")]
    Refused { agent: AgentId, reason: String },

    /// Responder could not interpret the request.
    #[error("agent {agent} did not understand: {reason}")]
    NotUnderstood { agent: AgentId, reason: String },

    /// Responder agreed but failed to produce a result.
    #[error("agent {agent} failed: {reason}")]
    Failure { agent: AgentId, reason: String },

    /// Scenario file could not be read or parsed.
    #[error("invalid scenario config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
