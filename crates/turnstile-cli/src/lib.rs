//! Turnstile CLI - configuration, logging and the contention simulation
//! behind the `turnstile` binary

pub mod config;
pub mod logging;
pub mod simulation;
