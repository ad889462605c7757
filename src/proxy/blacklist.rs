//! Time-bounded exclusion of recently failed servers

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::models::BlacklistEntryView;

/// Longest lifetime an entry can have; longer TTLs are clamped
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Keyed blacklist with per-entry expiry.
///
/// Entries are never removed explicitly; an expired entry is dropped the next
/// time it is looked at.
#[derive(Debug, Default)]
pub struct BlacklistStore {
    entries: DashMap<String, Instant>,
}

impl BlacklistStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn is_blacklisted(&self, key: &str) -> bool {
        self.is_blacklisted_at(key, Instant::now())
    }

    pub fn is_blacklisted_at(&self, key: &str, now: Instant) -> bool {
        let expires_at = match self.entries.get(key) {
            Some(entry) => *entry,
            None => return false,
        };

        if now < expires_at {
            return true;
        }

        self.entries.remove_if(key, |_, expires_at| *expires_at <= now);
        false
    }

    /// Insert or overwrite the entry for `key`, expiring `ttl` from now
    pub fn blacklist(&self, key: &str, ttl: Duration) {
        self.blacklist_at(key, ttl, Instant::now());
    }

    pub fn blacklist_at(&self, key: &str, ttl: Duration, now: Instant) {
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .or_else(|| now.checked_add(Duration::from_secs(u32::MAX as u64)))
            .unwrap_or(now);
        self.entries.insert(key.to_string(), expires_at);
    }

    /// Live entries, soonest expiry first
    pub fn snapshot(&self) -> Vec<BlacklistEntryView> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Vec<BlacklistEntryView> {
        let mut entries: Vec<BlacklistEntryView> = self
            .entries
            .iter()
            .filter(|entry| now < *entry.value())
            .map(|entry| BlacklistEntryView {
                key: entry.key().clone(),
                expires_in_secs: entry.value().duration_since(now).as_secs(),
            })
            .collect();
        entries.sort_by_key(|e| e.expires_in_secs);
        entries
    }
}
