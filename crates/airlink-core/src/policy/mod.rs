//! Failure and temporary-disallow policy.
//!
//! Keeps a station from hammering an AP that keeps rejecting it, without
//! giving up on the network for good:
//!
//! ```text
//!   auth failure ─────────▶ profile disabled for 10/20/30/60/90/120/300 s
//!                                 ▲
//!   connection failure ─▶ ignore list ─▶ consecutive > 3 ─┘
//!                          │
//!                          └─▶ reconnect after 100 ms / 500 ms / 1 s / 5 s / 10 s
//!
//!   success ─▶ counters reset, BSSID leaves the ignore list
//! ```
//!
//! The policy is pure bookkeeping: it mutates the profile's failure state and
//! its own lists and tells the caller what to announce and when to retry.
//! Randomness (jitter) is supplied by the caller.

mod disallow;
mod ignore;

use std::{
    fmt,
    time::{Duration, Instant},
};

pub use disallow::{DisallowList, TemporaryDisallow};
pub use ignore::{ignore_duration, IgnoreEntry, IgnoreList};

use airlink_proto::MacAddr;

use crate::{config::PolicyConfig, control::Notification, profile::NetworkProfile};

/// Consecutive connection failures above this count disable the network.
pub const CONN_FAILED_ESCALATION: u32 = 3;

/// Why a network was temporarily disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisableReason {
    /// Key handshake failed with a pre-shared key; password likely wrong
    WrongKey,
    /// EAP or SAE authentication failed
    AuthFailed,
    /// Too many consecutive connection failures
    ConnFailed,
}

impl DisableReason {
    /// Control-interface reason string
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WrongKey => "WRONG_KEY",
            Self::AuthFailed => "AUTH_FAILED",
            Self::ConnFailed => "CONN_FAILED",
        }
    }
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporary disable duration after `count` authentication failures.
pub const fn auth_failure_duration(count: u32) -> Duration {
    Duration::from_secs(match count {
        0..=1 => 10,
        2 => 20,
        3 => 30,
        4 => 60,
        5..=9 => 90,
        10..=49 => 120,
        _ => 300,
    })
}

/// Delay before reconnecting after `consecutive` connection failures.
pub const fn reconnect_delay(consecutive: u32) -> Duration {
    Duration::from_millis(match consecutive {
        0..=1 => 100,
        2 => 500,
        3 => 1000,
        4 => 5000,
        _ => 10_000,
    })
}

/// What to do after a connection failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPlan {
    /// Consecutive failures including carried ones
    pub consecutive: u32,
    /// Wait this long before scanning again
    pub delay: Duration,
    /// Scan only these channels (empty = all)
    pub freqs: Vec<u32>,
    /// Set when the failure streak disabled the network
    pub temp_disabled: Option<Notification>,
}

/// Per-station failure policy.
#[derive(Debug, Clone, Default)]
pub struct FailurePolicy {
    config: PolicyConfig,
    ignore: IgnoreList,
    disallow: DisallowList,
    carried_failures: u32,
}

impl FailurePolicy {
    /// Create a policy with `config`
    pub fn new(config: PolicyConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// BSSID ignore list
    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignore
    }

    /// Temporary disallow list
    pub fn disallow_list(&self) -> &DisallowList {
        &self.disallow
    }

    /// Mutable temporary disallow list
    pub fn disallow_list_mut(&mut self) -> &mut DisallowList {
        &mut self.disallow
    }

    /// Failures carried over ignore-list clears
    pub fn carried_failures(&self) -> u32 {
        self.carried_failures
    }

    /// True if `bssid` is on the ignore list.
    pub fn is_ignored(&self, bssid: MacAddr, now: Instant) -> bool {
        self.config.ignore_list && self.ignore.contains(bssid, now)
    }

    /// Every usable BSS is ignored: clear the list so selection can retry,
    /// carrying one failure into the next streak count.
    pub fn clear_ignore_list(&mut self, now: Instant) {
        let dropped = self.ignore.clear(now);
        if dropped > 0 {
            self.carried_failures = self.carried_failures.saturating_add(1);
            tracing::debug!(
                dropped,
                carried = self.carried_failures,
                "ignore list exhausted, cleared"
            );
        }
    }

    /// Record an authentication failure.
    ///
    /// `jitter(bound)` must return a value in `0..bound`; it is only consulted
    /// for password-based 802.1X networks past their first failure. Returns the
    /// temp-disable notification, or `None` when the disable was not extended.
    pub fn on_auth_failed(
        &mut self,
        profile: &mut NetworkProfile,
        bssid: Option<MacAddr>,
        reason: DisableReason,
        now: Instant,
        jitter: impl FnOnce(u64) -> u64,
    ) -> Option<Notification> {
        let failures = &mut profile.failures;
        failures.auth_failures = failures.auth_failures.saturating_add(1);
        let count = failures.auth_failures;
        if bssid.is_some() {
            failures.disabled_by = bssid;
        }

        let mut duration = auth_failure_duration(count);
        if count > 1 && self.config.auth_failure_jitter && profile.is_password_eap() {
            duration += Duration::from_secs(jitter(u64::from(count) * 10));
        }

        let until = now + duration;
        let failures = &mut profile.failures;
        if failures.disabled_until.is_some_and(|current| current >= until) {
            tracing::debug!(
                network = %profile.id,
                auth_failures = count,
                "temporary disable not extended"
            );
            return None;
        }
        failures.disabled_until = Some(until);

        tracing::info!(
            network = %profile.id,
            ssid = %profile.ssid,
            auth_failures = count,
            duration_s = duration.as_secs(),
            reason = %reason,
            "network temporarily disabled"
        );
        Some(Notification::SsidTempDisabled {
            id: profile.id,
            ssid: profile.ssid.clone(),
            auth_failures: count,
            duration,
            reason,
        })
    }

    /// Record a connection failure against `bssid`.
    ///
    /// `alternative_freqs` lists the channels of other BSSes of the same
    /// network; when present the failing BSS is ignored twice as hard and the
    /// rescan is limited to those channels.
    pub fn on_connection_failed(
        &mut self,
        profile: &mut NetworkProfile,
        bssid: Option<MacAddr>,
        alternative_freqs: &[u32],
        now: Instant,
        jitter: impl FnOnce(u64) -> u64,
    ) -> ReconnectPlan {
        let has_alternative = !alternative_freqs.is_empty();
        let hits = match bssid {
            Some(bssid) if self.config.ignore_list => {
                let mut hits = self.ignore.add(bssid, now);
                if hits == 1 && has_alternative {
                    hits = self.ignore.add(bssid, now);
                }
                hits
            },
            _ => {
                self.carried_failures = self.carried_failures.saturating_add(1);
                0
            },
        };
        let consecutive = hits.saturating_add(self.carried_failures).max(1);

        let temp_disabled = if consecutive > CONN_FAILED_ESCALATION {
            self.on_auth_failed(profile, bssid, DisableReason::ConnFailed, now, jitter)
        } else {
            None
        };

        let mut freqs = alternative_freqs.to_vec();
        freqs.sort_unstable();
        freqs.dedup();

        let delay = reconnect_delay(consecutive);
        tracing::debug!(
            network = %profile.id,
            bssid = ?bssid,
            consecutive,
            delay_ms = delay.as_millis() as u64,
            "connection failed"
        );
        ReconnectPlan { consecutive, delay, freqs, temp_disabled }
    }

    /// Record a completed connection.
    pub fn on_success(&mut self, profile: &mut NetworkProfile, bssid: Option<MacAddr>) {
        profile.clear_failures();
        if let Some(bssid) = bssid {
            self.ignore.remove(bssid);
        }
        self.carried_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileId;

    const BSSID: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 1]);

    fn secs(duration: Duration) -> u64 {
        duration.as_secs()
    }

    #[test]
    fn auth_failure_step_table() {
        let counts = [1, 2, 3, 4, 5, 9, 10, 49, 50, 1000];
        let expected = [10, 20, 30, 60, 90, 90, 120, 120, 300, 300];
        for (count, want) in counts.into_iter().zip(expected) {
            assert_eq!(secs(auth_failure_duration(count)), want, "count {count}");
        }
    }

    #[test]
    fn five_auth_failures_follow_table() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        let mut durations = Vec::new();
        for _ in 0..5 {
            let notification = policy.on_auth_failed(
                &mut profile,
                Some(BSSID),
                DisableReason::WrongKey,
                t0,
                |_| 0,
            );
            let Some(Notification::SsidTempDisabled { duration, reason, .. }) = notification else {
                panic!("disable not extended");
            };
            assert_eq!(reason, DisableReason::WrongKey);
            durations.push(secs(duration));
        }

        assert_eq!(durations, vec![10, 20, 30, 60, 90]);
        assert_eq!(profile.auth_failures(), 5);
        assert_eq!(profile.disabled_by(), Some(BSSID));
    }

    #[test]
    fn disable_never_moves_backwards() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        for _ in 0..4 {
            policy.on_auth_failed(&mut profile, None, DisableReason::WrongKey, t0, |_| 0);
        }
        let until = profile.disabled_until().unwrap();

        // a later failure computing an earlier deadline leaves it alone
        profile.failures.auth_failures = 0;
        let notification =
            policy.on_auth_failed(&mut profile, None, DisableReason::WrongKey, t0, |_| 0);
        assert!(notification.is_none());
        assert_eq!(profile.disabled_until(), Some(until));
    }

    #[test]
    fn jitter_only_for_password_eap() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut eap = NetworkProfile::eap_password(ProfileId(0), "corp", "alice", "pw");

        policy.on_auth_failed(&mut eap, None, DisableReason::AuthFailed, t0, |_| {
            panic!("no jitter on the first failure")
        });
        let mut bound_seen = 0;
        policy.on_auth_failed(&mut eap, None, DisableReason::AuthFailed, t0, |bound| {
            bound_seen = bound;
            bound - 1
        });
        assert_eq!(bound_seen, 20);
        assert_eq!(eap.disabled_until(), Some(t0 + Duration::from_secs(20 + 19)));

        let mut psk = NetworkProfile::psk(ProfileId(1), "home", "pw");
        for _ in 0..3 {
            policy.on_auth_failed(&mut psk, None, DisableReason::WrongKey, t0, |_| {
                panic!("psk networks get no jitter")
            });
        }
    }

    #[test]
    fn reconnect_delays_follow_table() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        let delays: Vec<u128> = (0..6)
            .map(|_| {
                policy
                    .on_connection_failed(&mut profile, Some(BSSID), &[], t0, |_| 0)
                    .delay
                    .as_millis()
            })
            .collect();
        assert_eq!(delays, vec![100, 500, 1000, 5000, 10_000, 10_000]);
    }

    #[test]
    fn alternative_doubles_ignore_and_biases_rescan() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        let freqs = [5180, 2412, 5180];
        let plan = policy.on_connection_failed(&mut profile, Some(BSSID), &freqs, t0, |_| 0);
        assert_eq!(plan.consecutive, 2);
        assert_eq!(plan.delay, Duration::from_millis(500));
        assert_eq!(plan.freqs, vec![2412, 5180]);
        assert!(policy.is_ignored(BSSID, t0));
    }

    #[test]
    fn consecutive_failures_escalate_to_temp_disable() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        for _ in 0..3 {
            let plan = policy.on_connection_failed(&mut profile, Some(BSSID), &[], t0, |_| 0);
            assert!(plan.temp_disabled.is_none());
        }
        let plan = policy.on_connection_failed(&mut profile, Some(BSSID), &[], t0, |_| 0);
        assert!(matches!(
            plan.temp_disabled,
            Some(Notification::SsidTempDisabled { reason: DisableReason::ConnFailed, .. })
        ));
        assert!(profile.is_temp_disabled(t0));
    }

    #[test]
    fn cleared_ignore_list_carries_failures() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        policy.on_connection_failed(&mut profile, Some(BSSID), &[], t0, |_| 0);
        policy.clear_ignore_list(t0);
        assert!(!policy.is_ignored(BSSID, t0));
        assert_eq!(policy.carried_failures(), 1);

        let plan = policy.on_connection_failed(&mut profile, Some(BSSID), &[], t0, |_| 0);
        assert_eq!(plan.consecutive, 2);
    }

    #[test]
    fn success_resets_everything() {
        let t0 = Instant::now();
        let mut policy = FailurePolicy::default();
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        for _ in 0..5 {
            policy.on_connection_failed(&mut profile, Some(BSSID), &[], t0, |_| 0);
        }
        assert!(profile.disabled_until().is_some());

        policy.on_success(&mut profile, Some(BSSID));
        assert_eq!(profile.auth_failures(), 0);
        assert_eq!(profile.disabled_until(), None);
        assert!(!policy.is_ignored(BSSID, t0));
        assert_eq!(policy.carried_failures(), 0);
    }
}
