//! Full-fleet scan scheduler
//!
//! Runs one cycle after an initial delay, then one per interval, until the
//! shutdown channel flips to `true` or its sender is dropped. A cycle in
//! progress always completes; shutdown is observed between cycles.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::info;

use crate::{CycleSummary, Scanner};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first cycle
    pub initial_delay: Duration,
    /// Time between cycle starts
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(120),
            interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

pub struct Scheduler {
    scanner: Scanner,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(scanner: Scanner, config: SchedulerConfig) -> Self {
        Self { scanner, config }
    }

    /// Run a single full-fleet cycle
    pub async fn run_cycle(&self) -> CycleSummary {
        info!("Starting scheduled scan cycle");
        self.scanner.scan_all().await
    }

    /// Run cycles until shutdown. Returns the number of completed cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        if *shutdown.borrow() {
            return 0;
        }

        info!(
            "Scheduler started: first cycle in {}s, then every {}s",
            self.config.initial_delay.as_secs(),
            self.config.interval.as_secs()
        );

        tokio::select! {
            _ = sleep(self.config.initial_delay) => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Scheduler stopped before first cycle");
                return 0;
            }
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    cycles += 1;
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("Scheduler stopped after {} cycles", cycles);
        cycles
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
