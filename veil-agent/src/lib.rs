//! # veil-agent: Privacy Mode Agent
//!
//! Console agent that engages privacy mode for one remote session:
//! the local display is darkened and the backlight forced down while
//! the remote view stays readable. Runs against a simulated host whose
//! capabilities and compositor behaviour come from the configuration,
//! which makes every fallback path reproducible from the command line.

pub mod config;
pub mod service;
