//! Property-based tests for security negotiation.
//!
//! Whatever the AP advertises and whatever the profile allows, a successful
//! negotiation must:
//! - pick exactly one AKM and one pairwise cipher both sides support
//! - enable PMF only against a PMF-capable AP, and always when the AP, the
//!   profile or the band requires it
//! - only use the SAE extended key AKMs against an H2E-capable AP

use airlink_core::{
    CandidateBss, negotiate,
    profile::{Credential, NetworkProfile, ProfileId},
};
use airlink_proto::{
    Cipher, KeyMgmt, MacAddr, PmfMode, RsnCapabilities, RsnxCapabilities, SaePwe, SecurityIe,
    band::is_6ghz,
};
use proptest::prelude::*;

const AKM_POOL: KeyMgmt = KeyMgmt::PSK
    .union(KeyMgmt::SAE)
    .union(KeyMgmt::IEEE8021X)
    .union(KeyMgmt::PSK_SHA256)
    .union(KeyMgmt::FT_PSK)
    .union(KeyMgmt::SAE_EXT_KEY)
    .union(KeyMgmt::OWE)
    .union(KeyMgmt::IEEE8021X_SHA256);

const CIPHER_POOL: Cipher = Cipher::TKIP
    .union(Cipher::CCMP)
    .union(Cipher::GCMP)
    .union(Cipher::GCMP_256)
    .union(Cipher::CCMP_256);

fn akms() -> impl Strategy<Value = KeyMgmt> {
    any::<u32>().prop_map(|bits| KeyMgmt::from_bits_truncate(bits) & AKM_POOL)
}

fn ciphers() -> impl Strategy<Value = Cipher> {
    any::<u32>().prop_map(|bits| Cipher::from_bits_truncate(bits) & CIPHER_POOL)
}

fn group_cipher() -> impl Strategy<Value = Cipher> {
    prop_oneof![Just(Cipher::TKIP), Just(Cipher::CCMP), Just(Cipher::GCMP_256)]
}

fn rsn_caps() -> impl Strategy<Value = RsnCapabilities> {
    prop_oneof![
        Just(RsnCapabilities::empty()),
        Just(RsnCapabilities::MFPC),
        Just(RsnCapabilities::MFPC | RsnCapabilities::MFPR),
    ]
}

fn pmf_mode() -> impl Strategy<Value = PmfMode> {
    prop_oneof![Just(PmfMode::Disabled), Just(PmfMode::Optional), Just(PmfMode::Required)]
}

fn sae_pwe() -> impl Strategy<Value = SaePwe> {
    prop_oneof![Just(SaePwe::HuntAndPeck), Just(SaePwe::HashToElement), Just(SaePwe::Both)]
}

fn frequency() -> impl Strategy<Value = u32> {
    prop_oneof![Just(2412u32), Just(2437), Just(5180), Just(5745), Just(5955), Just(6115)]
}

#[derive(Debug, Clone)]
struct Case {
    ie: SecurityIe,
    bss: CandidateBss,
    profile: NetworkProfile,
    h2e: bool,
}

fn case() -> impl Strategy<Value = Case> {
    (
        (akms(), ciphers(), group_cipher(), rsn_caps(), frequency(), any::<bool>()),
        (akms(), ciphers(), ciphers(), pmf_mode(), sae_pwe()),
    )
        .prop_map(
            |(
                (ap_akms, ap_pairwise, ap_group, caps, freq, h2e),
                (akms, pairwise, group, pmf, pwe),
            )| {
                let ie = SecurityIe::rsn(ap_akms, caps)
                    .with_pairwise(ap_pairwise)
                    .with_group(ap_group);
                let mut bss = CandidateBss::new(MacAddr([0x02, 0, 0, 0, 0, 1]), "net", freq)
                    .with_rsn(ie.clone());
                if h2e {
                    bss = bss.with_rsnx(RsnxCapabilities::SAE_H2E);
                }
                let profile = NetworkProfile::new(
                    ProfileId(0),
                    "net",
                    Credential::Passphrase("password".to_string()),
                )
                .with_key_mgmt(akms)
                .with_pairwise(pairwise)
                .with_group(group)
                .with_pmf(pmf)
                .with_sae_pwe(pwe);
                Case { ie, bss, profile, h2e }
            },
        )
}

#[test]
fn prop_negotiated_suites_are_common_to_both_sides() {
    proptest!(|(case in case())| {
        if let Ok(params) = negotiate(Some(&case.bss), &case.profile) {
            prop_assert_eq!(params.key_mgmt.bits().count_ones(), 1);
            prop_assert!(case.profile.key_mgmt.contains(params.key_mgmt));
            prop_assert!(case.ie.key_mgmt.contains(params.key_mgmt));

            prop_assert_eq!(params.pairwise.bits().count_ones(), 1);
            prop_assert!(case.profile.pairwise.contains(params.pairwise));
            prop_assert!(case.ie.pairwise.contains(params.pairwise));

            prop_assert!(case.profile.group.contains(params.group));
            prop_assert_eq!(params.group, case.ie.group);
        }
    });
}

#[test]
fn prop_pmf_follows_ap_and_band() {
    proptest!(|(case in case())| {
        if let Ok(params) = negotiate(Some(&case.bss), &case.profile) {
            if params.pmf != PmfMode::Disabled {
                prop_assert!(case.ie.pmf_capable());
                prop_assert_ne!(params.group_mgmt, Cipher::NONE);
            } else {
                prop_assert_eq!(params.group_mgmt, Cipher::NONE);
            }
            if case.ie.pmf_required() {
                prop_assert_ne!(params.pmf, PmfMode::Disabled);
            }
            if is_6ghz(case.bss.freq) {
                prop_assert_eq!(params.pmf, PmfMode::Required);
            }
            if case.profile.pmf == PmfMode::Required {
                prop_assert_eq!(params.pmf, PmfMode::Required);
            }
        }
    });
}

#[test]
fn prop_sae_variants_respect_h2e() {
    proptest!(|(case in case())| {
        if let Ok(params) = negotiate(Some(&case.bss), &case.profile) {
            prop_assert_eq!(params.sae_pwe.is_some(), params.key_mgmt.is_sae());
            if params.key_mgmt.contains(KeyMgmt::SAE_EXT_KEY) {
                prop_assert!(case.h2e);
                prop_assert_ne!(case.profile.sae_pwe, SaePwe::HuntAndPeck);
            }
            if params.sae_pwe == Some(SaePwe::HashToElement) {
                prop_assert!(case.h2e);
            }
        }
    });
}

#[test]
fn prop_negotiation_is_deterministic() {
    proptest!(|(case in case())| {
        let first = negotiate(Some(&case.bss), &case.profile);
        let second = negotiate(Some(&case.bss), &case.profile);
        prop_assert_eq!(first, second);
    });
}
