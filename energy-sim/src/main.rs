mod agents;
mod directory;
mod error;
mod events;
mod kernel;
mod latency;
mod logging;
mod messages;
mod negotiation;
mod policy;
mod responder;
mod scenarios;
mod scheduler;
mod sim_engine;
mod state;
#[cfg(test)]
mod testing;

use clap::Parser;
use tracing::{error, info};

use scenarios::config::ScenarioConfig;
use scenarios::energy_market;

#[derive(Parser, Debug)]
#[command(name = "energy-sim")]
#[command(about = "Decentralized energy-trading market simulation")]
struct Args {
    /// Scenario name (without .json extension)
    #[arg(short, long, default_value = "energy_market")]
    scenario: String,

    /// Pace the simulation against the wall clock
    #[arg(short, long, default_value = "false")]
    realtime: bool,

    /// Override the scenario tick interval in milliseconds
    #[arg(short = 't', long)]
    tick_ms: Option<u64>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the scenario duration in seconds
    #[arg(short, long)]
    duration_sec: Option<u64>,
}

impl Args {
    /// Command-line values win over the scenario file.
    fn apply_overrides(&self, config: &mut ScenarioConfig) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(duration) = self.duration_sec {
            config.duration_sec = duration;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_ms = tick_ms;
        }
    }
}

fn main() {
    logging::init_tracing();
    let args = Args::parse();

    let mut config = energy_market::load_config(&args.scenario);
    args.apply_overrides(&mut config);

    if args.realtime {
        info!(scenario = %config.scenario_name, tick_ms = config.tick_ms, "mode: realtime");
        if let Err(e) = energy_market::run_realtime(&config) {
            error!(error = %e, "realtime runtime failed");
            std::process::exit(1);
        }
    } else {
        info!(scenario = %config.scenario_name, "mode: fast-forward");
        energy_market::run_scenario(&config);
    }
}
