//! Periodic health monitoring of the active server
//!
//! Each tick asks the controller to re-probe the active server; the
//! controller handles retries and failover.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::controller::{Controller, CycleOutcome, HealthOutcome};

/// Health monitor configuration
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Interval between health checks
    pub check_interval: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1800),
        }
    }
}

pub struct HealthMonitor {
    controller: Arc<Controller>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new(controller: Arc<Controller>, config: HealthMonitorConfig) -> Self {
        Self { controller, config }
    }

    /// Run the monitor (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting health monitor with {}s interval",
            self.config.check_interval.as_secs()
        );

        let mut check_interval = interval(self.config.check_interval);
        check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        check_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = check_interval.tick() => {
                    self.check().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn check(&self) {
        match self.controller.health_check().await {
            HealthOutcome::NoActiveServer => debug!("No active server to monitor"),
            HealthOutcome::Skipped => debug!("Health check skipped, cycle in progress"),
            HealthOutcome::Healthy { attempts } => {
                debug!("Active server healthy after {} attempt(s)", attempts)
            }
            HealthOutcome::FailedOver(CycleOutcome::Activated(server)) => {
                info!("Failed over to {}", server)
            }
            HealthOutcome::FailedOver(CycleOutcome::Failed(e)) => {
                warn!("Failover found no replacement: {}", e)
            }
            HealthOutcome::FailedOver(CycleOutcome::Skipped) => {}
        }
    }
}

/// Guard for managing health monitor lifecycle
pub struct HealthMonitorHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl HealthMonitorHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for HealthMonitorHandle {
    fn default() -> Self {
        Self::new().0
    }
}
