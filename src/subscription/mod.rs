//! Subscription payload handling
//!
//! Fetching, whole-payload decoding and per-line descriptor parsing.

pub mod fetcher;
pub mod parser;
pub mod payload;

pub use fetcher::HttpSubscription;
pub use parser::{parse_server, PRIORITY_MARKER};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::models::ServerDescriptor;

/// Source of the raw subscription payload
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Fetch the current payload text
    async fn fetch(&self) -> Result<String>;
}

/// Decode a payload and parse every line, dropping lines that do not parse
pub fn parse_payload(raw: &str) -> Vec<ServerDescriptor> {
    let text = payload::decode_payload(raw);
    let lines = payload::split_lines(&text);

    let servers: Vec<ServerDescriptor> = lines.iter().filter_map(|l| parse_server(l)).collect();

    if servers.len() < lines.len() {
        debug!(
            "Skipped {} of {} subscription lines",
            lines.len() - servers.len(),
            lines.len()
        );
    }

    servers
}
