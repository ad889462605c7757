use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::ServerDescriptor;

/// Phase of the selection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    #[default]
    Idle,
    Fetching,
    Parsing,
    Selecting,
    Activating,
    Verifying,
    Monitoring,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Fetching => "fetching",
            CycleState::Parsing => "parsing",
            CycleState::Selecting => "selecting",
            CycleState::Activating => "activating",
            CycleState::Verifying => "verifying",
            CycleState::Monitoring => "monitoring",
        }
    }
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The server currently routed through the engine
#[derive(Debug, Clone, Serialize)]
pub struct ActiveServer {
    #[serde(flatten)]
    pub server: Arc<ServerDescriptor>,
    pub activated_at: DateTime<Utc>,
}

/// A live blacklist entry as reported by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlacklistEntryView {
    pub key: String,
    pub expires_in_secs: u64,
}

/// Response body of `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: CycleState,
    pub cycle_running: bool,
    pub active_server: Option<ActiveServer>,
    pub blacklist: Vec<BlacklistEntryView>,
    pub uptime_secs: u64,
}
