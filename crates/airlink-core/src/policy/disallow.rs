//! Temporary BSS disallow list.
//!
//! An AP can ask us to stay away for a while (association retry delay), and
//! the station disallows a BSS on its own after repeated link loss. An entry
//! may carry a signal threshold: once the BSS is heard at or above it, the
//! entry is lifted early. The threshold is evaluated lazily, when the entry is
//! consulted during selection, not on every signal report.

use std::time::{Duration, Instant};

use airlink_proto::MacAddr;

/// One disallowed BSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporaryDisallow {
    /// Disallowed BSS
    pub bssid: MacAddr,
    /// End of the disallow period
    pub until: Instant,
    /// Signal level (dBm) at or above which the disallow is lifted
    pub rssi_threshold: Option<i32>,
}

/// Disallowed BSSes of one interface.
///
/// Mutations set a changed flag; the owner pushes [`DisallowList::active`] to
/// the driver after [`DisallowList::take_changed`] reports a change.
#[derive(Debug, Clone, Default)]
pub struct DisallowList {
    entries: Vec<TemporaryDisallow>,
    changed: bool,
}

impl DisallowList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Disallow `bssid` for `duration`, replacing an existing entry.
    pub fn disallow(
        &mut self,
        bssid: MacAddr,
        duration: Duration,
        rssi_threshold: Option<i32>,
        now: Instant,
    ) {
        self.entries.retain(|entry| entry.bssid != bssid);
        self.entries.push(TemporaryDisallow { bssid, until: now + duration, rssi_threshold });
        self.changed = true;
        tracing::debug!(
            bssid = %bssid,
            duration_s = duration.as_secs(),
            rssi_threshold = ?rssi_threshold,
            "bss temporarily disallowed"
        );
    }

    /// True if `bssid`, currently heard at `signal`, may not be used.
    ///
    /// Expired entries and entries whose signal threshold is met are removed.
    pub fn is_disallowed(&mut self, bssid: MacAddr, signal: i32, now: Instant) -> bool {
        let Some(idx) = self.entries.iter().position(|entry| entry.bssid == bssid) else {
            return false;
        };
        let entry = self.entries[idx];
        let lifted = entry.until <= now || entry.rssi_threshold.is_some_and(|rssi| signal >= rssi);
        if lifted {
            self.entries.remove(idx);
            self.changed = true;
            tracing::debug!(bssid = %bssid, signal, "bss disallow lifted");
        }
        !lifted
    }

    /// Drop expired entries.
    pub fn prune(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.until > now);
        if self.entries.len() != before {
            self.changed = true;
        }
    }

    /// BSSIDs currently disallowed
    pub fn active(&self, now: Instant) -> Vec<MacAddr> {
        self.entries.iter().filter(|entry| entry.until > now).map(|entry| entry.bssid).collect()
    }

    /// Earliest expiry, for deadline scheduling
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.until).min()
    }

    /// Report and reset the changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}
