pub mod config;
pub mod energy_market;
