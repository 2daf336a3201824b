//! Same seed and same script must produce the same notification log,
//! timestamps included.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use airlink_core::{CandidateBss, IfaceId, NetworkProfile, Notification, ProfileId, StationConfig};
use airlink_harness::{
    SimAp,
    scenario::{Record, Scenario},
};
use airlink_proto::{KeyMgmt, MacAddr, ReasonCode, RsnCapabilities, SecurityIe};
use proptest::prelude::*;

const AP: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 1]);
const STA: IfaceId = IfaceId(0);

/// Password-based 802.1X with a wrong password: every backoff after the first
/// draws jitter from the seeded RNG.
fn run_eap_backoff(seed: u64) -> Vec<Record> {
    let captured: Arc<Mutex<Option<Vec<Record>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);

    let bss = CandidateBss::new(AP, "corp", 5180)
        .with_rsn(SecurityIe::rsn(KeyMgmt::IEEE8021X, RsnCapabilities::empty()));
    Scenario::new()
        .with_seed(seed)
        .with_ap(SimAp::new(bss, "hunter2"))
        .with_interface(STA, "phy0", StationConfig::default())
        .with_network(STA, NetworkProfile::eap_password(ProfileId(0), "corp", "alice", "guess"))
        .connect(STA)
        .advance(Duration::from_secs(300))
        .oracle(Box::new(move |world| {
            *sink.lock().map_err(|e| e.to_string())? = Some(world.records().to_vec());
            Ok(())
        }))
        .run()
        .expect("scenario failed");

    let records = captured.lock().expect("lock").take();
    records.expect("oracle did not run")
}

#[test]
fn same_seed_same_log() {
    let baseline = run_eap_backoff(7);
    assert!(!baseline.is_empty());

    for _ in 0..10 {
        assert_eq!(run_eap_backoff(7), baseline);
    }
}

#[test]
fn reconnect_storm_is_reproducible() {
    let run = || {
        let captured: Arc<Mutex<Vec<Record>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let bss = CandidateBss::new(AP, "corp", 2412)
            .with_rsn(SecurityIe::rsn(KeyMgmt::PSK, RsnCapabilities::empty()));

        let mut scenario = Scenario::new()
            .with_ap(SimAp::new(bss, "secret"))
            .with_interface(STA, "phy0", StationConfig::default())
            .with_network(STA, NetworkProfile::psk(ProfileId(0), "corp", "secret"))
            .connect(STA);
        for _ in 0..5 {
            scenario = scenario
                .kick(STA, ReasonCode::DISASSOC_AP_BUSY)
                .advance(Duration::from_secs(12));
        }

        scenario
            .oracle(Box::new(move |world| {
                sink.lock().map_err(|e| e.to_string())?.extend_from_slice(world.records());
                Ok(())
            }))
            .run()
            .expect("scenario failed");

        let records = captured.lock().expect("lock").clone();
        records
    };

    assert_eq!(run(), run());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_seed_keeps_jitter_in_bounds(seed in any::<u64>()) {
        let durations: Vec<Duration> = run_eap_backoff(seed)
            .into_iter()
            .filter_map(|record| match record.notification {
                Notification::SsidTempDisabled { duration, .. } => Some(duration),
                _ => None,
            })
            .collect();

        prop_assert!(durations.len() >= 4);
        prop_assert_eq!(durations[0], Duration::from_secs(10));
        for (at, base) in [(1usize, 20u64), (2, 30), (3, 60)] {
            let count = at as u64 + 1;
            let secs = durations[at].as_secs();
            prop_assert!(secs >= base && secs < base + count * 10, "failure {}: {}s", count, secs);
        }
    }
}
