use crate::messages::{AgentId, Message, SimulatorApi, Timer};

pub mod home_agent;
pub mod retailer_agent;

pub use home_agent::{HomeAgent, HomeConfig};
pub use retailer_agent::{RetailerAgent, RetailerConfig};

/// An independent participant. The kernel calls at most one of these
/// handlers at a time and each runs to completion.
pub trait Agent {
    fn id(&self) -> AgentId;
    fn name(&self) -> &str;

    fn on_start(&mut self, _sim: &mut dyn SimulatorApi) {}
    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {}
    fn on_wakeup(&mut self, _sim: &mut dyn SimulatorApi, _now_ns: u64, _timer: Timer) {}
    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, _msg: &Message) {}
}
