//! DarkWatch Runtime
//!
//! Scan orchestration for monitored targets:
//! - **Scanner**: per-target state machine with manual, deep and scheduled scans
//! - **Scheduler**: ticker-driven full-fleet cycles with a shutdown channel
//! - **Config**: TOML monitor configuration

pub mod scanner;
pub mod scheduler;
pub mod config;

#[cfg(test)]
mod testing;

pub use scanner::*;
pub use scheduler::*;
pub use config::*;
