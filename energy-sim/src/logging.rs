// src/logging.rs
// Tracing setup plus CSV loggers on top of EventBus.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::events::{EventListener, SimEvent};

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

fn open_csv_with_header(dir: &Path, filename: &str, header: &str) -> std::io::Result<File> {
    create_dir_all(dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(filename))?;

    file.write_all(header.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(file)
}

/// Confirmed purchases: logs/exchanges.csv
pub struct CsvExchangeLogger {
    file: File,
}

impl CsvExchangeLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let header = "ts,home,retailer,price,units,cost,expenditure";
        let file = open_csv_with_header(dir.as_ref(), "exchanges.csv", header)?;
        Ok(Self { file })
    }
}

impl EventListener for CsvExchangeLogger {
    fn on_event(&mut self, event: &SimEvent) {
        if let SimEvent::Exchange {
            ts,
            home,
            retailer,
            price,
            units,
            cost,
            expenditure,
        } = event
        {
            let line = format!("{ts},{home},{retailer},{price},{units},{cost},{expenditure}\n");
            if let Err(e) = self.file.write_all(line.as_bytes()) {
                warn!(error = %e, "exchanges.csv write failed");
            }
        }
    }
}

/// Supply drift of every agent: logs/supply.csv
pub struct CsvSupplyLogger {
    file: File,
}

impl CsvSupplyLogger {
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let file = open_csv_with_header(dir.as_ref(), "supply.csv", "ts,agent,change,supply")?;
        Ok(Self { file })
    }
}

impl EventListener for CsvSupplyLogger {
    fn on_event(&mut self, event: &SimEvent) {
        if let SimEvent::SupplyChanged {
            ts,
            agent,
            change,
            supply,
        } = event
        {
            let line = format!("{ts},{agent},{change},{supply}\n");
            if let Err(e) = self.file.write_all(line.as_bytes()) {
                warn!(error = %e, "supply.csv write failed");
            }
        }
    }
}
