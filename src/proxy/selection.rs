//! Candidate selection policy
//!
//! Priority servers first, uniform shuffle within each group, then the first
//! candidate that is neither blacklisted nor unreachable wins.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::blacklist::BlacklistStore;
use super::probe::Prober;
use crate::error::{Result, SubswitchError};
use crate::models::ServerDescriptor;

/// Order candidates: every priority server before every other, each group shuffled
pub fn order_candidates<R: Rng + ?Sized>(
    servers: &[Arc<ServerDescriptor>],
    rng: &mut R,
) -> Vec<Arc<ServerDescriptor>> {
    let (mut priority, mut regular): (Vec<_>, Vec<_>) =
        servers.iter().cloned().partition(|s| s.is_priority());

    priority.shuffle(rng);
    regular.shuffle(rng);
    priority.extend(regular);
    priority
}

/// Pick the first usable candidate, or `NoUsableServer`
pub async fn select(
    servers: &[Arc<ServerDescriptor>],
    blacklist: &BlacklistStore,
    prober: &dyn Prober,
) -> Result<Arc<ServerDescriptor>> {
    let ordered = order_candidates(servers, &mut rand::thread_rng());

    for server in ordered {
        let key = server.key();
        if blacklist.is_blacklisted(&key) {
            debug!("Skipping blacklisted server {}", key);
            continue;
        }

        if prober.probe_endpoint(server.host(), server.port()).await {
            return Ok(server);
        }
        debug!("Skipping unreachable server {}", key);
    }

    Err(SubswitchError::NoUsableServer {
        candidates: servers.len(),
    })
}
