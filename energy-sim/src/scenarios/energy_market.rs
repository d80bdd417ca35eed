// src/scenarios/energy_market.rs
// Builds a market of retailers and homes from a ScenarioConfig and runs it.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::agents::{HomeAgent, RetailerAgent};
use crate::events::{ClosureListener, SimEvent};
use crate::messages::AgentId;
use crate::scenarios::config::{find_config_file, ScenarioConfig};
use crate::sim_engine::SimEngine;

/// Per-agent generator, so adding an agent does not reshuffle the others.
pub fn agent_rng(seed: u64, id: AgentId) -> StdRng {
    StdRng::seed_from_u64(seed ^ u64::from(id).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Create the engine and register every agent. Retailers go first so they
/// are in the directory before the first home looks for one.
pub fn build_engine(config: &ScenarioConfig, with_logs: bool) -> SimEngine {
    let logs_dir = with_logs.then(|| Path::new(&config.logs_dir));
    let mut engine = SimEngine::new(config.latency.build(), config.tick_ns(), logs_dir);

    for spec in &config.retailers {
        let mut rng = agent_rng(config.seed, spec.id);
        let state = spec.initial_state(&mut rng, &config.ranges);
        let agent = RetailerAgent::new(spec.id, spec.name.clone(), state, config.retailer_config(), rng);
        engine.kernel.add_agent(Box::new(agent));
    }

    for spec in &config.homes {
        let mut rng = agent_rng(config.seed, spec.id);
        let state = spec.initial_state(&mut rng, &config.ranges);
        let agent = HomeAgent::new(spec.id, spec.name.clone(), state, config.home_config(spec), rng);
        engine.kernel.add_agent(Box::new(agent));
    }

    info!(
        scenario = %config.scenario_name,
        retailers = config.retailers.len(),
        homes = config.homes.len(),
        seed = config.seed,
        "market built"
    );
    engine
}

/// Load `<name>.json`, falling back to the built-in market.
pub fn load_config(scenario_name: &str) -> ScenarioConfig {
    let Some(path) = find_config_file(scenario_name) else {
        warn!(scenario = scenario_name, "config file not found, using default configuration");
        return ScenarioConfig::default();
    };
    info!(%path, "found config");
    ScenarioConfig::from_file(&path).unwrap_or_else(|e| {
        warn!(error = %e, "using default configuration");
        ScenarioConfig::default()
    })
}

/// Fast-forward run over the configured duration.
pub fn run_scenario(config: &ScenarioConfig) {
    let max_ticks = config.max_ticks();
    let mut engine = build_engine(config, true);

    let (trades, timeouts) = tally(&mut engine);

    info!(scenario = %config.scenario_name, max_ticks, "starting");
    engine.run(max_ticks);
    info!(
        scenario = %config.scenario_name,
        trades = trades.get(),
        timeouts = timeouts.get(),
        "finished"
    );
}

/// Wall-clock paced run at `config.tick_ms`; stops at the configured
/// duration or on Ctrl-C.
pub fn run_realtime(config: &ScenarioConfig) -> std::io::Result<()> {
    let mut engine = build_engine(config, true);
    let (trades, timeouts) = tally(&mut engine);

    info!(scenario = %config.scenario_name, tick_ms = config.tick_ms, "starting (realtime)");
    engine.run_realtime(config.max_ticks(), config.tick_ms)?;
    info!(
        scenario = %config.scenario_name,
        trades = trades.get(),
        timeouts = timeouts.get(),
        "finished"
    );
    Ok(())
}

/// Count confirmed exchanges and reply timeouts for the end-of-run summary.
fn tally(engine: &mut SimEngine) -> (Rc<Cell<u64>>, Rc<Cell<u64>>) {
    let trades = Rc::new(Cell::new(0));
    let timeouts = Rc::new(Cell::new(0));
    let (t, o) = (trades.clone(), timeouts.clone());
    engine
        .kernel
        .event_bus_mut()
        .subscribe(Box::new(ClosureListener::new(move |ev: &SimEvent| match ev {
            SimEvent::Exchange { .. } => t.set(t.get() + 1),
            SimEvent::ReplyTimeout { .. } => o.set(o.get() + 1),
            _ => {}
        })));
    (trades, timeouts)
}
