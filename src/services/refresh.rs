//! Subscription refresh service
//!
//! Runs a selection cycle at startup and then on a fixed schedule. A failed
//! cycle is retried after the shorter retry interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::proxy::controller::{Controller, CycleOutcome, Trigger};

/// Refresh service configuration
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Delay after a successful (or skipped) cycle
    pub refresh_interval: Duration,
    /// Delay after a failed cycle
    pub retry_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(86400),
            retry_interval: Duration::from_secs(60),
        }
    }
}

pub struct RefreshService {
    controller: Arc<Controller>,
    config: RefreshConfig,
}

impl RefreshService {
    pub fn new(controller: Arc<Controller>, config: RefreshConfig) -> Self {
        Self { controller, config }
    }

    /// Run the refresh service (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting refresh service (every {}s, retry after {}s)",
            self.config.refresh_interval.as_secs(),
            self.config.retry_interval.as_secs()
        );

        let mut outcome = self.controller.trigger(Trigger::Startup).await;

        loop {
            let delay = self.next_delay(&outcome);
            debug!("Next scheduled cycle in {}s", delay.as_secs());

            tokio::select! {
                _ = sleep(delay) => {
                    outcome = self.controller.trigger(Trigger::Scheduled).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Refresh service shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn next_delay(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Failed(e) => {
                warn!(
                    "Cycle failed ({}), retrying in {}s",
                    e,
                    self.config.retry_interval.as_secs()
                );
                self.config.retry_interval
            }
            CycleOutcome::Activated(_) | CycleOutcome::Skipped => self.config.refresh_interval,
        }
    }
}

/// Handle for managing the refresh service
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RefreshHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for RefreshHandle {
    fn default() -> Self {
        Self::new().0
    }
}
