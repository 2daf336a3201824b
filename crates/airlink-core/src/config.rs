//! Configuration and the process-wide context.
//!
//! Configuration structs follow the same pattern everywhere: plain data with a
//! `Default` that matches the daemon's stock behaviour, deserializable with
//! `#[serde(default)]` so a config file only has to name what it changes.
//!
//! [`GlobalContext`] holds what would otherwise be process-global mutable
//! state. The supplicant owns exactly one and lends it to the stations.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Per-interface station configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Authentication/association timeout for a fresh attempt
    pub assoc_timeout: Duration,
    /// Shorter timeout used right after a failed attempt
    pub assoc_retry_timeout: Duration,
    /// Timeout used when the station iterates over scan results itself
    pub scan_iterate_timeout: Duration,
    /// Station-driven network selection (short timeouts, move on quickly)
    pub scan_iterate: bool,
    /// Time allowed from association to a completed key handshake
    pub handshake_timeout: Duration,
    /// Grace delay before cached BSS data is flushed on interface disable
    pub bss_flush_grace: Duration,
    /// Delay before rescanning when a scan found nothing usable
    pub rescan_interval: Duration,
    /// A disconnect this soon after completion counts as a link loss
    pub link_loss_window: Duration,
    /// Link losses in a row on one BSS before it is temporarily disallowed
    pub link_loss_threshold: u32,
    /// How long a BSS with repeated link loss stays disallowed
    pub link_loss_disallow: Duration,
    /// Failure policy settings
    pub policy: PolicyConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            assoc_timeout: Duration::from_secs(60),
            assoc_retry_timeout: Duration::from_secs(5),
            scan_iterate_timeout: Duration::from_secs(10),
            scan_iterate: false,
            handshake_timeout: Duration::from_secs(10),
            bss_flush_grace: Duration::from_secs(10),
            rescan_interval: Duration::from_secs(5),
            link_loss_window: Duration::from_secs(10),
            link_loss_threshold: 2,
            link_loss_disallow: Duration::from_secs(30),
            policy: PolicyConfig::default(),
        }
    }
}

/// Failure policy switches. The backoff tables themselves are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Track failing BSSIDs in the ignore list
    pub ignore_list: bool,
    /// Add random jitter to temporary disables of password-based 802.1X
    pub auth_failure_jitter: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { ignore_list: true, auth_failure_jitter: true }
    }
}

/// Daemon-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Maximum queued works per radio
    pub max_queued_works: usize,
    /// Two Michael MIC failures within this window start countermeasures
    pub countermeasure_window: Duration,
    /// How long associations stay blocked once countermeasures start
    pub countermeasure_duration: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_queued_works: 32,
            countermeasure_window: Duration::from_secs(60),
            countermeasure_duration: Duration::from_secs(60),
        }
    }
}

/// Process-wide mutable context, lifecycle tied to the supplicant.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    config: GlobalConfig,
    last_mic_failure: Option<Instant>,
    countermeasures_until: Option<Instant>,
}

impl GlobalContext {
    /// Create a context from configuration
    pub fn new(config: GlobalConfig) -> Self {
        Self { config, last_mic_failure: None, countermeasures_until: None }
    }

    /// Daemon-wide configuration
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Record a TKIP Michael MIC failure.
    ///
    /// Returns `true` when this failure starts countermeasures (a second
    /// failure within the window).
    pub fn record_mic_failure(&mut self, now: Instant) -> bool {
        let within_window = self
            .last_mic_failure
            .is_some_and(|last| now.duration_since(last) <= self.config.countermeasure_window);
        self.last_mic_failure = Some(now);

        if within_window {
            self.countermeasures_until = Some(now + self.config.countermeasure_duration);
        }
        within_window
    }

    /// True while TKIP countermeasures block associations
    pub fn countermeasures_active(&self, now: Instant) -> bool {
        self.countermeasures_until.is_some_and(|until| now < until)
    }

    /// End of the current countermeasure period, if any
    pub fn countermeasures_until(&self) -> Option<Instant> {
        self.countermeasures_until
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new(GlobalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: StationConfig = serde_json::from_str(
            r#"{ "scan_iterate": true, "policy": { "auth_failure_jitter": false } }"#,
        )
        .unwrap();

        assert!(config.scan_iterate);
        assert!(!config.policy.auth_failure_jitter);
        assert!(config.policy.ignore_list);
        assert_eq!(config.assoc_timeout, Duration::from_secs(60));
    }

    #[test]
    fn single_mic_failure_does_not_start_countermeasures() {
        let t0 = Instant::now();
        let mut ctx = GlobalContext::default();

        assert!(!ctx.record_mic_failure(t0));
        assert!(!ctx.countermeasures_active(t0));

        // Second failure outside the window resets the pairing
        assert!(!ctx.record_mic_failure(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn second_mic_failure_starts_countermeasures() {
        let t0 = Instant::now();
        let mut ctx = GlobalContext::default();

        ctx.record_mic_failure(t0);
        assert!(ctx.record_mic_failure(t0 + Duration::from_secs(30)));

        assert!(ctx.countermeasures_active(t0 + Duration::from_secs(31)));
        assert!(!ctx.countermeasures_active(t0 + Duration::from_secs(90)));
    }
}
