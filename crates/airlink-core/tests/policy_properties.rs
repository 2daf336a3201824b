//! Property-based tests for the failure policy.
//!
//! - Backoff tables never shrink as failures accumulate
//! - A temporary disable never moves backwards, whatever the jitter
//! - A success wipes every trace of earlier failures
//! - Jitter drawn from a seeded environment stays within its bound

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use airlink_core::{
    Environment, Notification, PolicyConfig,
    policy::{
        DisableReason, FailurePolicy, IgnoreList, auth_failure_duration, ignore_duration,
        reconnect_delay,
    },
    profile::{NetworkProfile, ProfileId},
};
use airlink_proto::MacAddr;
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Fixed clock with a seeded ChaCha RNG.
#[derive(Clone)]
struct SeededEnv {
    now: Instant,
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self { now: Instant::now(), rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Environment for SeededEnv {
    fn now(&self) -> Instant {
        self.now
    }

    fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("rng lock").fill_bytes(buffer);
    }
}

fn bssid(last: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 0, last])
}

#[derive(Debug, Clone)]
enum Failure {
    Auth { advance_ms: u64 },
    Connection { advance_ms: u64, bss: u8, alternatives: bool },
}

fn failure() -> impl Strategy<Value = Failure> {
    prop_oneof![
        (0u64..120_000).prop_map(|advance_ms| Failure::Auth { advance_ms }),
        (0u64..120_000, 1u8..4, any::<bool>()).prop_map(|(advance_ms, bss, alternatives)| {
            Failure::Connection { advance_ms, bss, alternatives }
        }),
    ]
}

#[test]
fn prop_backoff_tables_are_monotonic() {
    proptest!(|(count in 0u32..200)| {
        prop_assert!(auth_failure_duration(count) <= auth_failure_duration(count + 1));
        prop_assert!(ignore_duration(count) <= ignore_duration(count + 1));
        prop_assert!(reconnect_delay(count) <= reconnect_delay(count + 1));
        prop_assert!(auth_failure_duration(count) <= Duration::from_secs(300));
        prop_assert!(reconnect_delay(count) <= Duration::from_secs(10));
    });
}

#[test]
fn prop_temp_disable_never_moves_backwards() {
    proptest!(|(seed in any::<u64>(), failures in proptest::collection::vec(failure(), 1..40))| {
        let env = SeededEnv::new(seed);
        let mut now = env.now();
        let mut policy = FailurePolicy::new(PolicyConfig::default());
        let mut profile = NetworkProfile::eap_password(ProfileId(0), "corp", "alice", "secret");
        let mut latest: Option<Instant> = None;
        let mut auth_failures = 0u32;

        for failure in failures {
            match failure {
                Failure::Auth { advance_ms } => {
                    now += Duration::from_millis(advance_ms);
                    policy.on_auth_failed(
                        &mut profile,
                        Some(bssid(1)),
                        DisableReason::AuthFailed,
                        now,
                        |bound| env.random_below(bound),
                    );
                    auth_failures += 1;
                },
                Failure::Connection { advance_ms, bss, alternatives } => {
                    now += Duration::from_millis(advance_ms);
                    let freqs: &[u32] = if alternatives { &[2437, 5180] } else { &[] };
                    let plan = policy.on_connection_failed(
                        &mut profile,
                        Some(bssid(bss)),
                        freqs,
                        now,
                        |_| 0,
                    );
                    prop_assert!(plan.consecutive >= 1);
                    prop_assert_eq!(plan.delay, reconnect_delay(plan.consecutive));
                    if plan.temp_disabled.is_some() {
                        auth_failures += 1;
                    }
                },
            }

            let until = profile.disabled_until();
            prop_assert!(until >= latest, "disable moved from {:?} to {:?}", latest, until);
            latest = until;
            prop_assert!(profile.auth_failures() >= auth_failures);
        }
    });
}

#[test]
fn prop_success_clears_failures() {
    proptest!(|(failures in proptest::collection::vec(failure(), 1..20))| {
        let mut now = Instant::now();
        let mut policy = FailurePolicy::new(PolicyConfig::default());
        let mut profile = NetworkProfile::psk(ProfileId(0), "home", "password");

        for failure in failures {
            match failure {
                Failure::Auth { advance_ms } => {
                    now += Duration::from_millis(advance_ms);
                    policy.on_auth_failed(
                        &mut profile,
                        Some(bssid(1)),
                        DisableReason::WrongKey,
                        now,
                        |_| 0,
                    );
                },
                Failure::Connection { advance_ms, bss, alternatives } => {
                    now += Duration::from_millis(advance_ms);
                    let freqs: &[u32] = if alternatives { &[2437] } else { &[] };
                    policy.on_connection_failed(&mut profile, Some(bssid(bss)), freqs, now, |_| 0);
                },
            }
        }

        policy.on_success(&mut profile, Some(bssid(1)));
        prop_assert_eq!(profile.auth_failures(), 0);
        prop_assert_eq!(profile.disabled_until(), None);
        prop_assert!(!profile.is_temp_disabled(now));
        prop_assert!(!policy.is_ignored(bssid(1), now));
        prop_assert_eq!(policy.carried_failures(), 0);
    });
}

#[test]
fn prop_seeded_eap_jitter_is_bounded() {
    proptest!(|(seed in any::<u64>(), rounds in 1u32..12)| {
        let env = SeededEnv::new(seed);
        let mut now = env.now();
        let mut policy = FailurePolicy::new(PolicyConfig::default());
        let mut profile = NetworkProfile::eap_password(ProfileId(0), "corp", "alice", "secret");

        for count in 1..=rounds {
            // Past any earlier disable, so every failure is announced
            now += Duration::from_secs(600);
            let notification = policy.on_auth_failed(
                &mut profile,
                Some(bssid(1)),
                DisableReason::AuthFailed,
                now,
                |bound| env.random_below(bound),
            );
            let Some(Notification::SsidTempDisabled { duration, .. }) = notification else {
                return Err(TestCaseError::fail("failure not announced"));
            };

            let extra = duration - auth_failure_duration(count);
            if count == 1 {
                prop_assert_eq!(extra, Duration::ZERO);
            } else {
                prop_assert!(extra < Duration::from_secs(u64::from(count) * 10));
            }
        }
    });
}

#[test]
fn prop_ignore_count_grows_while_entry_lives() {
    proptest!(|(gaps in proptest::collection::vec(0u64..9_000, 1..10))| {
        let mut now = Instant::now();
        let mut list = IgnoreList::new();
        let mut expected = 0u32;

        for gap in gaps {
            now += Duration::from_millis(gap);
            expected += 1;
            prop_assert_eq!(list.add(bssid(1), now), expected);
            prop_assert!(list.contains(bssid(1), now));
        }
    });
}
