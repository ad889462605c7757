//! Selection-and-failover controller
//!
//! Owns the active server slot, the blacklist and the single-flight flag.
//! Every trigger (startup, schedule, health monitor, HTTP) enters through
//! [`Controller::trigger`], [`Controller::spawn_trigger`] or
//! [`Controller::health_check`]; a trigger that finds a cycle in progress is
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::blacklist::BlacklistStore;
use super::probe::Prober;
use super::selection;
use crate::engine::EngineAdapter;
use crate::error::{Result, SubswitchError};
use crate::models::{ActiveServer, CycleState, ServerDescriptor};
use crate::subscription::{parse_payload, SubscriptionSource};

/// Failover tunables
#[derive(Debug, Clone)]
pub struct ControllerPolicy {
    /// How long a failed server is excluded from selection
    pub blacklist_ttl: Duration,
    /// Consecutive failed health probes before the active server is declared dead
    pub monitor_attempts: u32,
    /// Pause between health probe attempts
    pub monitor_retry_delay: Duration,
}

impl Default for ControllerPolicy {
    fn default() -> Self {
        Self {
            blacklist_ttl: Duration::from_secs(3600),
            monitor_attempts: 3,
            monitor_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Why a cycle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Scheduled,
    External,
    HealthCheck,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Scheduled => "scheduled",
            Trigger::External => "external",
            Trigger::HealthCheck => "health_check",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a trigger
#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was running; nothing happened
    Skipped,
    /// A server was activated and verified
    Activated(Arc<ServerDescriptor>),
    /// The cycle ran and failed
    Failed(SubswitchError),
}

impl CycleOutcome {
    pub fn is_activated(&self) -> bool {
        matches!(self, CycleOutcome::Activated(_))
    }
}

/// Result of a health check
#[derive(Debug)]
pub enum HealthOutcome {
    NoActiveServer,
    /// A cycle was running; the check was dropped
    Skipped,
    /// The active server passed on the given attempt
    Healthy { attempts: u32 },
    /// The active server was declared dead and a new cycle ran
    FailedOver(CycleOutcome),
}

/// Held for the duration of one cycle; releases the flag on drop
pub struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Controller {
    source: Arc<dyn SubscriptionSource>,
    prober: Arc<dyn Prober>,
    engine: Arc<dyn EngineAdapter>,
    blacklist: BlacklistStore,
    active: ArcSwapOption<ActiveServer>,
    running: Arc<AtomicBool>,
    state: watch::Sender<CycleState>,
    check_url: String,
    policy: ControllerPolicy,
}

impl Controller {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        prober: Arc<dyn Prober>,
        engine: Arc<dyn EngineAdapter>,
        check_url: impl Into<String>,
        policy: ControllerPolicy,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);

        Self {
            source,
            prober,
            engine,
            blacklist: BlacklistStore::new(),
            active: ArcSwapOption::empty(),
            running: Arc::new(AtomicBool::new(false)),
            state,
            check_url: check_url.into(),
            policy,
        }
    }

    pub fn blacklist(&self) -> &BlacklistStore {
        &self.blacklist
    }

    pub fn active_server(&self) -> Option<Arc<ActiveServer>> {
        self.active.load_full()
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<FlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: Arc::clone(&self.running),
            })
    }

    fn set_state(&self, state: CycleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Cycle state: {} -> {}", previous, state);
        }
    }

    /// Run a cycle now and wait for it, unless one is already running
    pub async fn trigger(&self, reason: Trigger) -> CycleOutcome {
        let Some(guard) = self.try_begin() else {
            info!("Cycle already running, dropping {} trigger", reason);
            return CycleOutcome::Skipped;
        };

        self.execute(&guard, reason).await
    }

    /// Start a cycle in the background; returns whether one was started
    pub fn spawn_trigger(self: &Arc<Self>, reason: Trigger) -> bool {
        let Some(guard) = self.try_begin() else {
            info!("Cycle already running, dropping {} trigger", reason);
            return false;
        };

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.execute(&guard, reason).await;
        });
        true
    }

    /// Re-probe the active server, failing over after repeated failures
    pub async fn health_check(&self) -> HealthOutcome {
        // Unguarded pre-check; a stale answer only delays or skips one check.
        if self.active.load().is_none() {
            debug!("No active server, skipping health check");
            return HealthOutcome::NoActiveServer;
        }

        let Some(guard) = self.try_begin() else {
            debug!("Cycle in progress, skipping health check");
            return HealthOutcome::Skipped;
        };

        let Some(active) = self.active.load_full() else {
            return HealthOutcome::NoActiveServer;
        };
        let server = Arc::clone(&active.server);
        let attempts = self.policy.monitor_attempts.max(1);

        info!("Health checking {}", server);

        for attempt in 1..=attempts {
            if self.probe_server(&server).await {
                info!("{} is healthy (attempt {}/{})", server, attempt, attempts);
                return HealthOutcome::Healthy { attempts: attempt };
            }

            warn!(
                "Health check attempt {}/{} failed for {}",
                attempt, attempts, server
            );
            if attempt < attempts {
                tokio::time::sleep(self.policy.monitor_retry_delay).await;
            }
        }

        error!("{} died after {} attempts, failing over", server, attempts);
        self.reject(&server);
        self.active.store(None);

        HealthOutcome::FailedOver(self.execute(&guard, Trigger::HealthCheck).await)
    }

    async fn probe_server(&self, server: &ServerDescriptor) -> bool {
        self.prober
            .probe_endpoint(server.host(), server.port())
            .await
            && self
                .prober
                .probe_through_active_proxy(&self.check_url)
                .await
    }

    /// Cycle body; the guard proves the caller holds the single-flight flag
    async fn execute(&self, _guard: &FlightGuard, reason: Trigger) -> CycleOutcome {
        let span = info_span!("cycle", id = %Uuid::new_v4(), trigger = %reason);

        async move {
            info!("Starting selection cycle");

            match self.run_cycle().await {
                Ok(server) => {
                    info!(
                        "Cycle complete, active server {} ({})",
                        server,
                        server.fingerprint()
                    );
                    CycleOutcome::Activated(server)
                }
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    let resting = if self.active.load().is_some() {
                        CycleState::Monitoring
                    } else {
                        CycleState::Idle
                    };
                    self.set_state(resting);
                    CycleOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_cycle(&self) -> Result<Arc<ServerDescriptor>> {
        self.set_state(CycleState::Fetching);
        let payload = self.source.fetch().await?;

        self.set_state(CycleState::Parsing);
        let servers: Vec<Arc<ServerDescriptor>> =
            parse_payload(&payload).into_iter().map(Arc::new).collect();
        if servers.is_empty() {
            return Err(SubswitchError::EmptySubscription);
        }
        info!(
            "Parsed {} servers ({} priority)",
            servers.len(),
            servers.iter().filter(|s| s.is_priority()).count()
        );

        loop {
            self.set_state(CycleState::Selecting);
            let server =
                selection::select(&servers, &self.blacklist, self.prober.as_ref()).await?;
            info!("Chose server {} ({})", server, server.fingerprint());

            self.set_state(CycleState::Activating);
            // From here on the engine no longer serves the previous server.
            self.active.store(None);
            if let Err(e) = self.engine.activate(&server).await {
                if !e.blames_candidate() {
                    return Err(e);
                }
                warn!("Activating {} failed: {}", server, e);
                self.reject(&server);
                continue;
            }

            self.set_state(CycleState::Verifying);
            if self.prober.probe_through_active_proxy(&self.check_url).await {
                self.active.store(Some(Arc::new(ActiveServer {
                    server: Arc::clone(&server),
                    activated_at: Utc::now(),
                })));
                self.set_state(CycleState::Monitoring);
                return Ok(server);
            }

            warn!("Verification through {} failed", server);
            self.reject(&server);
        }
    }

    fn reject(&self, server: &ServerDescriptor) {
        let key = server.key();
        self.blacklist.blacklist(&key, self.policy.blacklist_ttl);
        info!(
            "Blacklisted {} for {}s",
            key,
            self.policy.blacklist_ttl.as_secs()
        );
    }
}
