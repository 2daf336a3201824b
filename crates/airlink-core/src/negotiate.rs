//! Security suite negotiation.
//!
//! Given a candidate BSS and a network profile, pick the one protocol, cipher
//! pair, AKM and PMF mode both sides (and the driver) support.
//!
//! ```text
//!   candidate offers         profile allows          driver supports
//!   RSN > WPA > OSEN    ∩    proto/ciphers/AKMs   ∩  ciphers/AKMs
//!          │
//!          ├─ pairwise  GCMP-256 > CCMP-256 > GCMP > CCMP > TKIP > NONE
//!          ├─ group     GCMP-256 > CCMP-256 > GCMP > CCMP > TKIP > GTK_NOT_USED
//!          ├─ AKM       fixed priority table (strongest first)
//!          ├─ PMF       Required / Optional / Disabled
//!          └─ mgmt      BIP-GMAC-256 > BIP-CMAC-256 > BIP-GMAC-128 > BIP-CMAC-128
//! ```
//!
//! Negotiation is a pure function of its inputs. Offers come from the air, so
//! every combination of bits must produce a result or an error, never a panic.

use airlink_proto::{
    band::is_6ghz, Cipher, IeOffer, KeyMgmt, PmfMode, ProtoFlags, SaePwe, SecurityIe,
    SecurityProto,
};
use serde::{Deserialize, Serialize};

use crate::{
    bss::{BssCapabilities, CandidateBss},
    driver::DriverCapabilities,
    error::NegotiationError,
    profile::NetworkProfile,
};

/// AKM selection order, strongest first.
pub const AKM_PRIORITY: [KeyMgmt; 22] = [
    KeyMgmt::FT_IEEE8021X_SHA384,
    KeyMgmt::IEEE8021X_SUITE_B_192,
    KeyMgmt::IEEE8021X_SUITE_B,
    KeyMgmt::IEEE8021X_SHA384,
    KeyMgmt::FT_FILS_SHA384,
    KeyMgmt::FILS_SHA384,
    KeyMgmt::FT_FILS_SHA256,
    KeyMgmt::FILS_SHA256,
    KeyMgmt::FT_IEEE8021X,
    KeyMgmt::DPP,
    KeyMgmt::FT_SAE_EXT_KEY,
    KeyMgmt::SAE_EXT_KEY,
    KeyMgmt::FT_SAE,
    KeyMgmt::SAE,
    KeyMgmt::FT_PSK,
    KeyMgmt::IEEE8021X_SHA256,
    KeyMgmt::PSK_SHA256,
    KeyMgmt::IEEE8021X,
    KeyMgmt::PSK,
    KeyMgmt::WPA_NONE,
    KeyMgmt::OSEN,
    KeyMgmt::OWE,
];

const PAIRWISE_PRIORITY: [Cipher; 6] =
    [Cipher::GCMP_256, Cipher::CCMP_256, Cipher::GCMP, Cipher::CCMP, Cipher::TKIP, Cipher::NONE];

const GROUP_PRIORITY: [Cipher; 6] = [
    Cipher::GCMP_256,
    Cipher::CCMP_256,
    Cipher::GCMP,
    Cipher::CCMP,
    Cipher::TKIP,
    Cipher::GTK_NOT_USED,
];

const GROUP_MGMT_PRIORITY: [Cipher; 4] =
    [Cipher::BIP_GMAC_256, Cipher::BIP_CMAC_256, Cipher::BIP_GMAC_128, Cipher::BIP_CMAC_128];

const SAE_EXT_KEY_FAMILY: KeyMgmt = KeyMgmt::SAE_EXT_KEY.union(KeyMgmt::FT_SAE_EXT_KEY);

/// Parameters agreed for one association attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NegotiatedParams {
    /// Security protocol
    pub proto: SecurityProto,
    /// Pairwise cipher
    pub pairwise: Cipher,
    /// Group cipher
    pub group: Cipher,
    /// Group-management cipher (`Cipher::NONE` without PMF)
    pub group_mgmt: Cipher,
    /// Key management
    pub key_mgmt: KeyMgmt,
    /// Management frame protection
    pub pmf: PmfMode,
    /// SAE password element method, for SAE-family AKMs only
    pub sae_pwe: Option<SaePwe>,
}

impl NegotiatedParams {
    /// Parameters of an unprotected association.
    pub fn open() -> Self {
        Self {
            proto: SecurityProto::Open,
            pairwise: Cipher::NONE,
            group: Cipher::NONE,
            group_mgmt: Cipher::NONE,
            key_mgmt: KeyMgmt::NONE,
            pmf: PmfMode::Disabled,
            sae_pwe: None,
        }
    }

    /// True when no key handshake follows association.
    pub fn is_open(&self) -> bool {
        self.proto == SecurityProto::Open
    }
}

/// Negotiator bound to what the driver can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiator {
    key_mgmt: KeyMgmt,
    ciphers: Cipher,
}

impl Negotiator {
    /// Negotiator limited to the driver's AKMs and ciphers.
    pub fn new(caps: &DriverCapabilities) -> Self {
        Self { key_mgmt: caps.key_mgmt, ciphers: caps.ciphers }
    }

    /// Negotiator that assumes the driver supports everything.
    pub fn permissive() -> Self {
        Self { key_mgmt: KeyMgmt::all(), ciphers: Cipher::all() }
    }

    /// Ciphers usable for data frames. NONE and GTK_NOT_USED are markers, not
    /// suites a driver has to implement.
    fn data_ciphers(&self) -> Cipher {
        self.ciphers | Cipher::NONE | Cipher::GTK_NOT_USED
    }

    /// Negotiate against `candidate`, or synthesize from the profile alone when
    /// no candidate is known yet.
    pub fn negotiate(
        &self,
        candidate: Option<&CandidateBss>,
        profile: &NetworkProfile,
    ) -> Result<NegotiatedParams, NegotiationError> {
        let Some(bss) = candidate else {
            return self.synthesize(profile);
        };

        let mut saw_malformed = false;
        let mut offer = None;
        for (flag, element) in [
            (ProtoFlags::RSN, &bss.rsn),
            (ProtoFlags::WPA, &bss.wpa),
            (ProtoFlags::OSEN, &bss.osen),
        ] {
            if !profile.proto.contains(flag) {
                continue;
            }
            match element {
                Some(IeOffer::Parsed(ie)) => {
                    offer = Some(ie);
                    break;
                },
                Some(IeOffer::Malformed { .. }) => saw_malformed = true,
                None => {},
            }
        }

        match offer {
            Some(ie) => self.negotiate_offer(bss, ie, profile),
            None if profile.key_mgmt.contains(KeyMgmt::NONE) && !bss.has_security_ie() => {
                // Static WEP is not supported
                if bss.caps.contains(BssCapabilities::PRIVACY) {
                    Err(NegotiationError::NoCommonCipher)
                } else {
                    Ok(NegotiatedParams::open())
                }
            },
            None if saw_malformed => Err(NegotiationError::MalformedIe),
            None => Err(NegotiationError::NoCommonAkm),
        }
    }

    fn negotiate_offer(
        &self,
        bss: &CandidateBss,
        ie: &SecurityIe,
        profile: &NetworkProfile,
    ) -> Result<NegotiatedParams, NegotiationError> {
        let data_ciphers = self.data_ciphers();
        let pairwise = pick(&PAIRWISE_PRIORITY, ie.pairwise & profile.pairwise & data_ciphers)
            .ok_or(NegotiationError::NoCommonCipher)?;
        let group = pick(&GROUP_PRIORITY, ie.group & profile.group & data_ciphers)
            .ok_or(NegotiationError::NoCommonCipher)?;

        let mut akms = ie.key_mgmt & profile.key_mgmt & self.key_mgmt;
        if akms.is_empty() {
            return Err(NegotiationError::NoCommonAkm);
        }

        let ap_pmf = ie.pmf_capable();
        let ap_h2e = bss.supports_h2e();
        let mut stripped_for_pmf = false;
        if !ap_pmf && akms.intersects(KeyMgmt::PMF_MANDATORY) {
            akms.remove(KeyMgmt::PMF_MANDATORY);
            stripped_for_pmf = true;
        }
        if !ap_h2e {
            akms.remove(SAE_EXT_KEY_FAMILY);
            if profile.sae_pwe == SaePwe::HashToElement {
                akms.remove(KeyMgmt::SAE | KeyMgmt::FT_SAE);
            }
        }
        if profile.sae_pwe == SaePwe::HuntAndPeck {
            akms.remove(SAE_EXT_KEY_FAMILY);
        }

        let key_mgmt = pick(&AKM_PRIORITY, akms).ok_or(if stripped_for_pmf {
            NegotiationError::PmfUnavailable
        } else {
            NegotiationError::NoCommonAkm
        })?;

        let required =
            profile.pmf == PmfMode::Required || is_6ghz(bss.freq) || key_mgmt.requires_pmf();
        if required && !ap_pmf {
            return Err(NegotiationError::PmfUnavailable);
        }
        let mut pmf = if required {
            PmfMode::Required
        } else if profile.pmf == PmfMode::Optional && ap_pmf {
            PmfMode::Optional
        } else {
            PmfMode::Disabled
        };

        let group_mgmt = if pmf == PmfMode::Disabled {
            Cipher::NONE
        } else {
            let offered = ie.group_mgmt.unwrap_or(Cipher::BIP_CMAC_128);
            match pick(&GROUP_MGMT_PRIORITY, offered & profile.group_mgmt & self.ciphers) {
                Some(cipher) => cipher,
                None if pmf == PmfMode::Optional => {
                    pmf = PmfMode::Disabled;
                    Cipher::NONE
                },
                None => return Err(NegotiationError::NoCommonCipher),
            }
        };

        if pmf == PmfMode::Disabled && ie.pmf_required() {
            return Err(NegotiationError::PmfUnavailable);
        }

        let sae_pwe = key_mgmt.is_sae().then(|| {
            if ap_h2e && profile.sae_pwe != SaePwe::HuntAndPeck {
                SaePwe::HashToElement
            } else {
                SaePwe::HuntAndPeck
            }
        });

        Ok(NegotiatedParams {
            proto: ie.proto,
            pairwise,
            group,
            group_mgmt,
            key_mgmt,
            pmf,
            sae_pwe,
        })
    }

    /// Parameters for a connect issued before any scan result is known.
    fn synthesize(&self, profile: &NetworkProfile) -> Result<NegotiatedParams, NegotiationError> {
        let akms = profile.key_mgmt & self.key_mgmt;
        let proto = if profile.proto.contains(ProtoFlags::OSEN) && akms.contains(KeyMgmt::OSEN) {
            SecurityProto::Osen
        } else if profile.proto.contains(ProtoFlags::RSN) {
            SecurityProto::Rsn
        } else if profile.proto.contains(ProtoFlags::WPA) {
            SecurityProto::Wpa
        } else {
            SecurityProto::Open
        };

        if akms.is_open() || (proto == SecurityProto::Open && akms.contains(KeyMgmt::NONE)) {
            return Ok(NegotiatedParams::open());
        }
        if proto == SecurityProto::Open {
            return Err(NegotiationError::NoCommonAkm);
        }

        let data_ciphers = self.data_ciphers();
        let pairwise = pick(&PAIRWISE_PRIORITY, profile.pairwise & data_ciphers)
            .ok_or(NegotiationError::NoCommonCipher)?;
        let group = pick(&GROUP_PRIORITY, profile.group & data_ciphers)
            .ok_or(NegotiationError::NoCommonCipher)?;
        let key_mgmt = pick(&AKM_PRIORITY, akms).ok_or(NegotiationError::NoCommonAkm)?;

        let pmf = if profile.pmf == PmfMode::Required || key_mgmt.requires_pmf() {
            PmfMode::Required
        } else {
            profile.pmf
        };
        let group_mgmt = match pmf {
            PmfMode::Disabled => Cipher::NONE,
            _ => pick(&GROUP_MGMT_PRIORITY, profile.group_mgmt & self.ciphers)
                .ok_or(NegotiationError::NoCommonCipher)?,
        };
        let sae_pwe = key_mgmt.is_sae().then(|| match profile.sae_pwe {
            SaePwe::HashToElement => SaePwe::HashToElement,
            SaePwe::HuntAndPeck | SaePwe::Both => SaePwe::HuntAndPeck,
        });

        Ok(NegotiatedParams { proto, pairwise, group, group_mgmt, key_mgmt, pmf, sae_pwe })
    }
}

/// Negotiate without driver capability filtering.
pub fn negotiate(
    candidate: Option<&CandidateBss>,
    profile: &NetworkProfile,
) -> Result<NegotiatedParams, NegotiationError> {
    Negotiator::permissive().negotiate(candidate, profile)
}

fn pick<T>(priority: &[T], set: T) -> Option<T>
where
    T: bitflags::Flags + Copy,
{
    priority.iter().copied().find(|suite| set.contains(*suite))
}
