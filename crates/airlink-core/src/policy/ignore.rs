//! BSSID ignore list.
//!
//! Every connection failure adds the BSSID (or bumps its count). Entries expire
//! on a schedule that grows with the count; expiry is checked lazily whenever
//! the list is consulted.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use airlink_proto::MacAddr;

/// How long an entry with `count` hits stays on the list.
pub const fn ignore_duration(count: u32) -> Duration {
    Duration::from_secs(match count {
        0..=2 => 10,
        3 => 60,
        4 => 120,
        5 => 600,
        _ => 1800,
    })
}

/// One ignored BSSID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreEntry {
    /// Failures recorded for the BSSID
    pub count: u32,
    /// When the entry stops applying
    pub expires: Instant,
}

/// Short-lived list of BSSIDs that recently failed.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    entries: BTreeMap<MacAddr, IgnoreEntry>,
}

impl IgnoreList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires > now);
    }

    /// Record a failure for `bssid`, returning its new count.
    pub fn add(&mut self, bssid: MacAddr, now: Instant) -> u32 {
        self.prune(now);
        let entry = self
            .entries
            .entry(bssid)
            .or_insert(IgnoreEntry { count: 0, expires: now });
        entry.count = entry.count.saturating_add(1);
        entry.expires = now + ignore_duration(entry.count);
        tracing::debug!(
            bssid = %bssid,
            count = entry.count,
            expires_in_s = ignore_duration(entry.count).as_secs(),
            "bssid ignored"
        );
        entry.count
    }

    /// True if `bssid` is ignored at `now`
    pub fn contains(&self, bssid: MacAddr, now: Instant) -> bool {
        self.get(bssid, now).is_some()
    }

    /// Live entry for `bssid`
    pub fn get(&self, bssid: MacAddr, now: Instant) -> Option<IgnoreEntry> {
        self.entries.get(&bssid).filter(|entry| entry.expires > now).copied()
    }

    /// Forget `bssid`
    pub fn remove(&mut self, bssid: MacAddr) -> bool {
        self.entries.remove(&bssid).is_some()
    }

    /// Forget everything, returning how many live entries were dropped.
    pub fn clear(&mut self, now: Instant) -> usize {
        self.prune(now);
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Number of live entries
    pub fn len(&self, now: Instant) -> usize {
        self.entries.values().filter(|entry| entry.expires > now).count()
    }

    /// True when no entry is live
    pub fn is_empty(&self, now: Instant) -> bool {
        self.len(now) == 0
    }
}
