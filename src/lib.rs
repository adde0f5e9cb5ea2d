//! # Kinetia
//!
//! Command-line front end of the kinetia reaction-diffusion engine. The engine
//! itself lives in `kinetia_core`; this crate loads a TOML configuration, applies
//! command-line overrides and streams observable records as JSON lines.

pub mod runner;

pub use kinetia_core::config::SimConfig;
pub use runner::{load_config, run, RunOverrides, RunSummary};
