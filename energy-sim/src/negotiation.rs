//! Consumer-side negotiation cycle
//!
//! One cycle per home, repeated forever:
//!
//! ```text
//! Idle -> QuerySent -> QueryCollecting -> QueryComplete
//!      -> PurchaseSent -> PurchaseCollecting -> PurchaseComplete -> Cooldown
//!      -> SkipPurchase -------------------------------------------> Cooldown
//! Cooldown -> Idle (next cycle)
//! ```
//!
//! Each conversation has a reply-by deadline timer. The response window
//! closes on the first result (INFORM, REFUSE, FAILURE, NOT_UNDERSTOOD) or on
//! the deadline, whichever comes first. Every path ends in Cooldown, so a
//! silent or missing supplier never stalls the home.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::directory::{AgentDescriptor, RETAILER_CAPABILITY};
use crate::error::MarketError;
use crate::events::SimEvent;
use crate::messages::{AgentId, ConversationId, Message, MessagePayload, MessageType, SimulatorApi, Timer, TimerId};
use crate::policy::{is_purchase_eligible, PurchasePolicy};
use crate::scheduler::{schedule_after, NS_PER_MS};
use crate::state::{ExchangeAction, ExchangeOrder, ParticipantState};

pub const DEFAULT_REPLY_TIMEOUT_NS: u64 = 5_000 * NS_PER_MS;
pub const DEFAULT_COOLDOWN_MAX_NS: u64 = 60_000 * NS_PER_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    QuerySent,
    QueryCollecting,
    QueryComplete,
    PurchaseSent,
    PurchaseCollecting,
    PurchaseComplete,
    SkipPurchase,
    Cooldown,
}

/// Per-cycle flags. Reset when a new cycle opens its quote conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub query_finished: bool,
    pub purchase_finished: bool,
    /// None until a quote arrives in this cycle.
    pub best_price: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSettings {
    pub reply_timeout_ns: u64,
    pub cooldown_max_ns: u64,
    pub capability: String,
    /// Supplier to use when the directory lists it. Otherwise the first
    /// listed supplier is taken.
    pub preferred: Option<AgentId>,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            reply_timeout_ns: DEFAULT_REPLY_TIMEOUT_NS,
            cooldown_max_ns: DEFAULT_COOLDOWN_MAX_NS,
            capability: RETAILER_CAPABILITY.to_string(),
            preferred: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub purchases: u64,
    pub timeouts: u64,
    pub lookup_failures: u64,
    pub rejections: u64,
}

/// The conversation currently awaiting replies.
#[derive(Debug, Clone, Copy)]
struct OpenConversation {
    id: ConversationId,
    kind: MessageType,
    counterparty: AgentId,
    deadline: TimerId,
    order: Option<ExchangeOrder>,
}

pub struct NegotiationCycle {
    owner: AgentId,
    settings: NegotiationSettings,
    policy: PurchasePolicy,
    phase: CyclePhase,
    conversation: ConversationState,
    counterparty: Option<AgentDescriptor>,
    open: Option<OpenConversation>,
    cooldown: Option<TimerId>,
    next_seq: u64,
    stats: CycleStats,
}

impl NegotiationCycle {
    pub fn new(owner: AgentId, settings: NegotiationSettings, policy: PurchasePolicy) -> Self {
        Self {
            owner,
            settings,
            policy,
            phase: CyclePhase::Idle,
            conversation: ConversationState::default(),
            counterparty: None,
            open: None,
            cooldown: None,
            next_seq: 0,
            stats: CycleStats::default(),
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    #[cfg(test)]
    pub fn conversation(&self) -> ConversationState {
        self.conversation
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    #[cfg(test)]
    pub fn counterparty(&self) -> Option<&AgentDescriptor> {
        self.counterparty.as_ref()
    }

    /// Id of the conversation awaiting replies, if any.
    #[cfg(test)]
    pub fn open_conversation(&self) -> Option<ConversationId> {
        self.open.map(|o| o.id)
    }

    /// Begin a cycle: resolve a supplier and ask it for a quote.
    pub fn start_cycle<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, rng: &mut R) {
        if let Some(open) = self.open {
            debug!(agent = self.owner, conversation = %open.id, "cycle already running");
            return;
        }
        self.cooldown = None;

        let counterparty = match self.resolve_counterparty(sim) {
            Ok(id) => id,
            Err(err) => {
                self.stats.lookup_failures += 1;
                warn!(agent = self.owner, error = %err, "no supplier found, retrying after cooldown");
                self.enter_cooldown(sim, rng);
                return;
            }
        };

        self.conversation = ConversationState::default();
        self.transition(CyclePhase::QuerySent);
        self.open_conversation_with(sim, counterparty, MessageType::QueryRef, MessagePayload::Empty, None);
    }

    /// Handle a reply from a supplier.
    pub fn on_reply<R: Rng>(
        &mut self,
        sim: &mut dyn SimulatorApi,
        state: &mut ParticipantState,
        rng: &mut R,
        msg: &Message,
    ) {
        let Some(open) = self.open else {
            debug!(agent = self.owner, from = msg.from, msg_type = ?msg.msg_type, "reply outside any conversation ignored");
            return;
        };
        if msg.conversation_id != Some(open.id) {
            debug!(
                agent = self.owner,
                from = msg.from,
                expected = %open.id,
                "reply for a closed conversation ignored"
            );
            return;
        }

        match open.kind {
            MessageType::QueryRef => self.transition(CyclePhase::QueryCollecting),
            _ => self.transition(CyclePhase::PurchaseCollecting),
        }

        let reason = || msg.payload.text().unwrap_or_default().to_string();
        match msg.msg_type {
            MessageType::Agree => {
                debug!(agent = self.owner, from = msg.from, conversation = %open.id, "request agreed");
            }
            MessageType::Inform if open.kind == MessageType::QueryRef => {
                match msg.payload.text().map(|t| t.trim().parse::<u64>()) {
                    Some(Ok(price)) => {
                        info!(agent = self.owner, retailer = msg.from, price, "quote received");
                        self.conversation.best_price = Some(price);
                    }
                    _ => {
                        let err = MarketError::PayloadEncoding(format!("unreadable quote {:?}", msg.payload));
                        warn!(agent = self.owner, retailer = msg.from, error = %err, "quote dropped");
                    }
                }
                self.close_window(sim, state, rng);
            }
            MessageType::Inform => {
                if let Some(order) = open.order {
                    self.book_purchase(sim, state, open.counterparty, &order);
                }
                self.close_window(sim, state, rng);
            }
            MessageType::Refuse => {
                self.reject(MarketError::Refused {
                    agent: msg.from,
                    reason: reason(),
                });
                self.close_window(sim, state, rng);
            }
            MessageType::NotUnderstood => {
                self.reject(MarketError::NotUnderstood {
                    agent: msg.from,
                    reason: reason(),
                });
                self.close_window(sim, state, rng);
            }
            MessageType::Failure => {
                self.reject(MarketError::Failure {
                    agent: msg.from,
                    reason: reason(),
                });
                self.close_window(sim, state, rng);
            }
            other => {
                debug!(agent = self.owner, msg_type = ?other, "unexpected message in conversation ignored");
            }
        }
    }

    /// Reply-by deadline fired for `conversation`.
    pub fn on_deadline<R: Rng>(
        &mut self,
        sim: &mut dyn SimulatorApi,
        state: &ParticipantState,
        rng: &mut R,
        conversation: ConversationId,
    ) {
        match self.open {
            Some(open) if open.id == conversation => {}
            _ => {
                debug!(agent = self.owner, conversation = %conversation, "deadline of a closed conversation ignored");
                return;
            }
        }

        self.stats.timeouts += 1;
        let err = MarketError::ReplyTimeout { conversation };
        warn!(agent = self.owner, error = %err, "response window closed without a result");
        let ts = sim.now_ns();
        sim.emit(SimEvent::ReplyTimeout {
            ts,
            agent: self.owner,
            conversation,
        });

        // The supplier may have left, look it up again next cycle.
        self.counterparty = None;
        self.close_window(sim, state, rng);
    }

    pub fn on_cooldown_elapsed<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, rng: &mut R) {
        if self.phase != CyclePhase::Cooldown {
            debug!(agent = self.owner, phase = ?self.phase, "cooldown fired outside cooldown ignored");
            return;
        }
        self.cooldown = None;
        self.transition(CyclePhase::Idle);
        self.start_cycle(sim, rng);
    }

    /// Drop the in-flight conversation and pending timers on shutdown.
    /// Agent state is left as is.
    pub fn abandon(&mut self, sim: &mut dyn SimulatorApi) {
        if let Some(open) = self.open.take() {
            sim.cancel(open.deadline);
            debug!(agent = self.owner, conversation = %open.id, "conversation abandoned");
        }
        if let Some(id) = self.cooldown.take() {
            sim.cancel(id);
        }
        self.transition(CyclePhase::Idle);
    }

    fn resolve_counterparty(&mut self, sim: &mut dyn SimulatorApi) -> Result<AgentId, MarketError> {
        if let Some(known) = &self.counterparty {
            return Ok(known.id);
        }

        let mut found = sim.directory().lookup(&self.settings.capability)?;
        if found.is_empty() {
            return Err(MarketError::LookupFailure {
                capability: self.settings.capability.clone(),
            });
        }
        let pick = self
            .settings
            .preferred
            .and_then(|preferred| found.iter().position(|d| d.id == preferred))
            .unwrap_or(0);
        let chosen = found.swap_remove(pick);

        info!(agent = self.owner, retailer = chosen.id, name = %chosen.name, "supplier resolved");
        let id = chosen.id;
        self.counterparty = Some(chosen);
        Ok(id)
    }

    fn open_conversation_with(
        &mut self,
        sim: &mut dyn SimulatorApi,
        counterparty: AgentId,
        kind: MessageType,
        payload: MessagePayload,
        order: Option<ExchangeOrder>,
    ) {
        let id = ConversationId {
            initiator: self.owner,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        let reply_by = sim.now_ns().saturating_add(self.settings.reply_timeout_ns);
        let deadline = sim.schedule(self.owner, reply_by, Timer::ReplyDeadline(id));
        sim.send(Message::request(self.owner, counterparty, kind, id, reply_by, payload));

        debug!(agent = self.owner, to = counterparty, conversation = %id, msg_type = ?kind, "conversation opened");
        self.open = Some(OpenConversation {
            id,
            kind,
            counterparty,
            deadline,
            order,
        });
    }

    fn close_window<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, state: &ParticipantState, rng: &mut R) {
        let Some(open) = self.open.take() else {
            return;
        };
        sim.cancel(open.deadline);

        if open.kind == MessageType::QueryRef {
            self.conversation.query_finished = true;
            self.transition(CyclePhase::QueryComplete);
            self.evaluate_purchase(sim, state, rng, open.counterparty);
        } else {
            self.conversation.purchase_finished = true;
            self.transition(CyclePhase::PurchaseComplete);
            self.enter_cooldown(sim, rng);
        }
    }

    fn evaluate_purchase<R: Rng>(
        &mut self,
        sim: &mut dyn SimulatorApi,
        state: &ParticipantState,
        rng: &mut R,
        counterparty: AgentId,
    ) {
        let remaining = state.remaining_budget();
        let Some(price) = self.conversation.best_price else {
            debug!(agent = self.owner, "no quote this cycle");
            return self.skip_purchase(sim, rng);
        };
        if !is_purchase_eligible(price, remaining) {
            debug!(agent = self.owner, price, remaining, "quote not below remaining budget");
            return self.skip_purchase(sim, rng);
        }

        let order = match self.policy.build_order(remaining, price, state.supply) {
            Ok(order) => order,
            Err(err) => {
                let err = MarketError::from(err);
                warn!(agent = self.owner, error = %err, "purchase skipped");
                return self.skip_purchase(sim, rng);
            }
        };
        let action = ExchangeAction {
            initiator: self.owner,
            order,
        };
        let content = match action.encode() {
            Ok(content) => content,
            Err(err) => {
                warn!(agent = self.owner, error = %err, "purchase skipped");
                return self.skip_purchase(sim, rng);
            }
        };

        info!(
            agent = self.owner,
            retailer = counterparty,
            price,
            units = order.units,
            supply = state.supply,
            "purchase requested"
        );
        self.transition(CyclePhase::PurchaseSent);
        self.open_conversation_with(sim, counterparty, MessageType::Request, MessagePayload::Text(content), Some(order));
    }

    fn book_purchase(
        &mut self,
        sim: &mut dyn SimulatorApi,
        state: &mut ParticipantState,
        retailer: AgentId,
        order: &ExchangeOrder,
    ) {
        let cost = state.record_expenditure(order);
        self.stats.purchases += 1;
        info!(
            agent = self.owner,
            retailer,
            cost,
            expenditure = state.expenditure,
            "purchase confirmed"
        );

        let ts = sim.now_ns();
        sim.emit(SimEvent::Exchange {
            ts,
            home: self.owner,
            retailer,
            price: order.price_per_unit,
            units: order.units,
            cost,
            expenditure: state.expenditure,
        });
    }

    fn skip_purchase<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, rng: &mut R) {
        self.transition(CyclePhase::SkipPurchase);
        self.enter_cooldown(sim, rng);
    }

    fn reject(&mut self, err: MarketError) {
        self.stats.rejections += 1;
        warn!(agent = self.owner, error = %err, "conversation ended without a result");
    }

    fn enter_cooldown<R: Rng>(&mut self, sim: &mut dyn SimulatorApi, rng: &mut R) {
        self.stats.cycles += 1;
        self.transition(CyclePhase::Cooldown);
        let delay = rng.gen_range(0..=self.settings.cooldown_max_ns);
        self.cooldown = Some(schedule_after(sim, self.owner, delay, Timer::Cooldown));
    }

    fn transition(&mut self, next: CyclePhase) {
        if self.phase != next {
            debug!(agent = self.owner, from = ?self.phase, to = ?next, "cycle phase");
            self.phase = next;
        }
    }
}
