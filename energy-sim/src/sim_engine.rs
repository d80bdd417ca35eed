// src/sim_engine.rs
// High-level simulation engine wrapper around the Kernel.
// Scenarios create a SimEngine, register agents, and run it either
// fast-forward or paced against the wall clock.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::events::EventListener;
use crate::kernel::Kernel;
use crate::latency::LatencyModel;
use crate::logging::{CsvExchangeLogger, CsvSupplyLogger};

pub struct SimEngine {
    pub kernel: Kernel,
}

impl SimEngine {
    /// Create a new engine with a custom latency model and tick size.
    /// CSV loggers are attached when `logs_dir` is given.
    pub fn new(latency: Box<dyn LatencyModel>, tick_ns: u64, logs_dir: Option<&Path>) -> Self {
        let mut kernel = Kernel::new(latency, tick_ns);

        if let Some(dir) = logs_dir {
            // Logging is optional, a failure here must not stop the run.
            match CsvExchangeLogger::new(dir) {
                Ok(logger) => {
                    kernel
                        .event_bus_mut()
                        .subscribe(Box::new(logger) as Box<dyn EventListener>);
                    info!(dir = %dir.display(), "exchange logger attached");
                }
                Err(e) => warn!(error = %e, "failed to init exchange logger"),
            }

            match CsvSupplyLogger::new(dir) {
                Ok(logger) => {
                    kernel
                        .event_bus_mut()
                        .subscribe(Box::new(logger) as Box<dyn EventListener>);
                    info!(dir = %dir.display(), "supply logger attached");
                }
                Err(e) => warn!(error = %e, "failed to init supply logger"),
            }
        }

        Self { kernel }
    }

    /// Run the underlying kernel for a number of ticks as fast as possible.
    pub fn run(&mut self, max_steps: usize) {
        self.kernel.run(max_steps);
    }

    /// Advance one tick per `tick_ms` of wall-clock time until `max_steps`
    /// ticks have passed or Ctrl-C arrives, then shut every agent down.
    pub fn run_realtime(&mut self, max_steps: usize, tick_ms: u64) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        runtime.block_on(async {
            let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            info!(tick_ms, "realtime loop started");
            let mut steps = 0usize;
            while steps < max_steps {
                tokio::select! {
                    _ = interval.tick() => {
                        self.kernel.step();
                        steps += 1;
                    }
                    _ = &mut ctrl_c => {
                        info!(steps, "interrupted");
                        break;
                    }
                }
            }
        });

        self.kernel.shutdown();
        info!(time_ns = self.kernel.time_ns(), "realtime loop finished");
        Ok(())
    }
}
