//! Scripted collaborators for controller, monitor and API tests

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;

use crate::engine::EngineAdapter;
use crate::error::{Result, SubswitchError};
use crate::models::ServerDescriptor;
use crate::proxy::controller::{Controller, ControllerPolicy};
use crate::proxy::probe::Prober;
use crate::subscription::SubscriptionSource;

/// An `ss://` line for `host:8388`, labelled as priority when asked
pub fn ss_line(host: &str, priority: bool) -> String {
    let label = if priority { "[Premium] test" } else { "test" };
    format!(
        "ss://{}@{}:8388#{}",
        URL_SAFE_NO_PAD.encode(format!("aes-128-gcm:pw-{}", host)),
        host,
        urlencoding::encode(label)
    )
}

/// Serves a fixed payload and counts fetches
pub struct ScriptedSource {
    payload: String,
    fetches: AtomicUsize,
    failing: AtomicBool,
}

impl ScriptedSource {
    pub fn new(lines: &[String]) -> Self {
        Self {
            payload: URL_SAFE_NO_PAD.encode(lines.join("\n")),
            fetches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionSource for ScriptedSource {
    async fn fetch(&self) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SubswitchError::SubscriptionFetch("scripted failure".into()));
        }
        Ok(self.payload.clone())
    }
}

/// Prober whose answers come from sets of keys.
///
/// The tunnel answer depends on which server the paired engine last
/// activated; one-shot scripted answers take precedence.
pub struct ScriptedProber {
    reachable: Mutex<HashSet<String>>,
    broken_tunnels: Mutex<HashSet<String>>,
    tunnel_script: Mutex<VecDeque<bool>>,
    activated: Arc<Mutex<Option<String>>>,
}

impl ScriptedProber {
    pub fn reachable(keys: &[&str]) -> Self {
        Self::with_activation_slot(keys, Arc::new(Mutex::new(None)))
    }

    fn with_activation_slot(keys: &[&str], activated: Arc<Mutex<Option<String>>>) -> Self {
        Self {
            reachable: Mutex::new(keys.iter().map(|k| k.to_string()).collect()),
            broken_tunnels: Mutex::new(HashSet::new()),
            tunnel_script: Mutex::new(VecDeque::new()),
            activated,
        }
    }

    pub fn set_unreachable(&self, key: &str) {
        self.reachable.lock().remove(key);
    }

    pub fn break_tunnel(&self, key: &str) {
        self.broken_tunnels.lock().insert(key.to_string());
    }

    pub fn script_tunnel(&self, answers: &[bool]) {
        self.tunnel_script.lock().extend(answers.iter().copied());
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe_endpoint(&self, host: &str, port: &str) -> bool {
        self.reachable.lock().contains(&format!("{}:{}", host, port))
    }

    async fn probe_through_active_proxy(&self, _target_url: &str) -> bool {
        if let Some(answer) = self.tunnel_script.lock().pop_front() {
            return answer;
        }

        let activated = self.activated.lock().clone();
        match activated {
            Some(key) => !self.broken_tunnels.lock().contains(&key),
            None => false,
        }
    }
}

/// Records activations and optionally fails them
pub struct RecordingEngine {
    activated: Arc<Mutex<Option<String>>>,
    activations: Mutex<Vec<String>>,
    rejected: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    delay: Mutex<Duration>,
}

impl RecordingEngine {
    pub fn activations(&self) -> Vec<String> {
        self.activations.lock().clone()
    }

    pub fn reject_activation(&self, key: &str) {
        self.rejected.lock().insert(key.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl EngineAdapter for RecordingEngine {
    async fn activate(&self, server: &ServerDescriptor) -> Result<()> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SubswitchError::EngineUnavailable("scripted".into()));
        }

        let key = server.key();
        self.activations.lock().push(key.clone());
        if self.rejected.lock().contains(&key) {
            return Err(SubswitchError::EngineControl {
                status: 400,
                body: "scripted rejection".into(),
            });
        }

        *self.activated.lock() = Some(key);
        Ok(())
    }
}

/// A controller wired to scripted collaborators
pub struct Harness {
    pub controller: Arc<Controller>,
    pub source: Arc<ScriptedSource>,
    pub prober: Arc<ScriptedProber>,
    pub engine: Arc<RecordingEngine>,
}

impl Harness {
    pub fn new(lines: &[String], reachable: &[&str]) -> Self {
        let activated = Arc::new(Mutex::new(None));

        let source = Arc::new(ScriptedSource::new(lines));
        let prober = Arc::new(ScriptedProber::with_activation_slot(
            reachable,
            Arc::clone(&activated),
        ));
        let engine = Arc::new(RecordingEngine {
            activated,
            activations: Mutex::new(Vec::new()),
            rejected: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        });

        let policy = ControllerPolicy {
            blacklist_ttl: Duration::from_secs(60),
            monitor_attempts: 3,
            monitor_retry_delay: Duration::from_millis(1),
        };

        let controller = Arc::new(Controller::new(
            source.clone(),
            prober.clone(),
            engine.clone(),
            "http://check.example/",
            policy,
        ));

        Self {
            controller,
            source,
            prober,
            engine,
        }
    }
}
