//! Cipher, key-management and protocol suites.
//!
//! Bit assignments are local to airlink; they are not the OUI/type selectors
//! carried on the air.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Authentication and key-management suites (AKMs)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct KeyMgmt: u32 {
        /// WPA/WPA2-Enterprise (802.1X)
        const IEEE8021X = 1 << 0;
        /// WPA/WPA2-Personal
        const PSK = 1 << 1;
        /// Open or static WEP, no key management
        const NONE = 1 << 2;
        /// Legacy IBSS WPA-None
        const WPA_NONE = 1 << 4;
        /// FT over 802.1X
        const FT_IEEE8021X = 1 << 5;
        /// FT with PSK
        const FT_PSK = 1 << 6;
        /// 802.1X with SHA-256 key derivation
        const IEEE8021X_SHA256 = 1 << 7;
        /// PSK with SHA-256 key derivation
        const PSK_SHA256 = 1 << 8;
        /// Simultaneous Authentication of Equals (WPA3-Personal)
        const SAE = 1 << 10;
        /// FT with SAE
        const FT_SAE = 1 << 11;
        /// OSU Server-only authenticated layer 2 Encryption Network
        const OSEN = 1 << 15;
        /// Suite B (WPA3-Enterprise, SHA-256)
        const IEEE8021X_SUITE_B = 1 << 16;
        /// Suite B 192-bit (WPA3-Enterprise, SHA-384)
        const IEEE8021X_SUITE_B_192 = 1 << 17;
        /// FILS with SHA-256
        const FILS_SHA256 = 1 << 18;
        /// FILS with SHA-384
        const FILS_SHA384 = 1 << 19;
        /// FT with FILS SHA-256
        const FT_FILS_SHA256 = 1 << 20;
        /// FT with FILS SHA-384
        const FT_FILS_SHA384 = 1 << 21;
        /// Opportunistic Wireless Encryption
        const OWE = 1 << 22;
        /// Device Provisioning Protocol
        const DPP = 1 << 23;
        /// FT over 802.1X with SHA-384
        const FT_IEEE8021X_SHA384 = 1 << 24;
        /// SAE with group-dependent hash (extended key)
        const SAE_EXT_KEY = 1 << 26;
        /// FT with SAE extended key
        const FT_SAE_EXT_KEY = 1 << 27;
        /// 802.1X with SHA-384 key derivation
        const IEEE8021X_SHA384 = 1 << 28;
    }
}

impl KeyMgmt {
    /// Every AKM that authenticates through 802.1X/EAP (including FILS and OSEN).
    pub const IEEE8021X_FAMILY: Self = Self::IEEE8021X
        .union(Self::FT_IEEE8021X)
        .union(Self::FT_IEEE8021X_SHA384)
        .union(Self::IEEE8021X_SHA256)
        .union(Self::IEEE8021X_SUITE_B)
        .union(Self::IEEE8021X_SUITE_B_192)
        .union(Self::FILS_SHA256)
        .union(Self::FILS_SHA384)
        .union(Self::FT_FILS_SHA256)
        .union(Self::FT_FILS_SHA384)
        .union(Self::IEEE8021X_SHA384)
        .union(Self::OSEN);

    /// Pre-shared key AKMs.
    pub const PSK_FAMILY: Self = Self::PSK.union(Self::FT_PSK).union(Self::PSK_SHA256);

    /// SAE AKMs.
    pub const SAE_FAMILY: Self =
        Self::SAE.union(Self::FT_SAE).union(Self::SAE_EXT_KEY).union(Self::FT_SAE_EXT_KEY);

    /// AKMs that cannot be used without protected management frames.
    pub const PMF_MANDATORY: Self = Self::SAE_FAMILY.union(Self::OWE);

    /// True if any selected AKM is 802.1X based.
    #[must_use]
    pub const fn is_ieee8021x(self) -> bool {
        self.intersects(Self::IEEE8021X_FAMILY)
    }

    /// True if any selected AKM is PSK based.
    #[must_use]
    pub const fn is_psk(self) -> bool {
        self.intersects(Self::PSK_FAMILY)
    }

    /// True if any selected AKM is SAE based.
    #[must_use]
    pub const fn is_sae(self) -> bool {
        self.intersects(Self::SAE_FAMILY)
    }

    /// True if any selected AKM requires PMF.
    #[must_use]
    pub const fn requires_pmf(self) -> bool {
        self.intersects(Self::PMF_MANDATORY)
    }

    /// True if the AKM set carries no key management at all.
    #[must_use]
    pub const fn is_open(self) -> bool {
        self.bits() == Self::NONE.bits()
    }

    /// Control-interface name of a single suite (`"UNKNOWN"` for sets).
    #[must_use]
    pub fn name(self) -> &'static str {
        KEY_MGMT_NAMES
            .iter()
            .find(|(suite, _)| *suite == self)
            .map_or("UNKNOWN", |&(_, name)| name)
    }
}

const KEY_MGMT_NAMES: &[(KeyMgmt, &str)] = &[
    (KeyMgmt::IEEE8021X, "WPA-EAP"),
    (KeyMgmt::PSK, "WPA-PSK"),
    (KeyMgmt::NONE, "NONE"),
    (KeyMgmt::WPA_NONE, "WPA-NONE"),
    (KeyMgmt::FT_IEEE8021X, "FT-EAP"),
    (KeyMgmt::FT_PSK, "FT-PSK"),
    (KeyMgmt::IEEE8021X_SHA256, "WPA-EAP-SHA256"),
    (KeyMgmt::PSK_SHA256, "WPA-PSK-SHA256"),
    (KeyMgmt::SAE, "SAE"),
    (KeyMgmt::FT_SAE, "FT-SAE"),
    (KeyMgmt::OSEN, "OSEN"),
    (KeyMgmt::IEEE8021X_SUITE_B, "WPA-EAP-SUITE-B"),
    (KeyMgmt::IEEE8021X_SUITE_B_192, "WPA-EAP-SUITE-B-192"),
    (KeyMgmt::FILS_SHA256, "FILS-SHA256"),
    (KeyMgmt::FILS_SHA384, "FILS-SHA384"),
    (KeyMgmt::FT_FILS_SHA256, "FT-FILS-SHA256"),
    (KeyMgmt::FT_FILS_SHA384, "FT-FILS-SHA384"),
    (KeyMgmt::OWE, "OWE"),
    (KeyMgmt::DPP, "DPP"),
    (KeyMgmt::FT_IEEE8021X_SHA384, "FT-EAP-SHA384"),
    (KeyMgmt::SAE_EXT_KEY, "SAE-EXT-KEY"),
    (KeyMgmt::FT_SAE_EXT_KEY, "FT-SAE-EXT-KEY"),
    (KeyMgmt::IEEE8021X_SHA384, "WPA-EAP-SHA384"),
];

bitflags! {
    /// Pairwise, group and group-management cipher suites
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Cipher: u32 {
        /// No encryption
        const NONE = 1 << 0;
        /// WEP-40
        const WEP40 = 1 << 1;
        /// WEP-104
        const WEP104 = 1 << 2;
        /// TKIP
        const TKIP = 1 << 3;
        /// CCMP-128
        const CCMP = 1 << 4;
        /// BIP-CMAC-128 (group management)
        const BIP_CMAC_128 = 1 << 5;
        /// GCMP-128
        const GCMP = 1 << 6;
        /// GCMP-256
        const GCMP_256 = 1 << 8;
        /// CCMP-256
        const CCMP_256 = 1 << 9;
        /// BIP-GMAC-128 (group management)
        const BIP_GMAC_128 = 1 << 11;
        /// BIP-GMAC-256 (group management)
        const BIP_GMAC_256 = 1 << 12;
        /// BIP-CMAC-256 (group management)
        const BIP_CMAC_256 = 1 << 13;
        /// Group cipher not used (pairwise-only network)
        const GTK_NOT_USED = 1 << 14;
    }
}

impl Cipher {
    /// Ciphers usable for pairwise keys.
    pub const PAIRWISE_ALL: Self = Self::GCMP_256
        .union(Self::CCMP_256)
        .union(Self::GCMP)
        .union(Self::CCMP)
        .union(Self::TKIP)
        .union(Self::NONE);

    /// Ciphers usable for group keys.
    pub const GROUP_ALL: Self = Self::GCMP_256
        .union(Self::CCMP_256)
        .union(Self::GCMP)
        .union(Self::CCMP)
        .union(Self::TKIP)
        .union(Self::GTK_NOT_USED);

    /// Ciphers usable for the group-management (BIP) key.
    pub const GROUP_MGMT_ALL: Self = Self::BIP_GMAC_256
        .union(Self::BIP_CMAC_256)
        .union(Self::BIP_GMAC_128)
        .union(Self::BIP_CMAC_128);

    /// Control-interface name of a single suite (`"UNKNOWN"` for sets).
    #[must_use]
    pub fn name(self) -> &'static str {
        CIPHER_NAMES
            .iter()
            .find(|(suite, _)| *suite == self)
            .map_or("UNKNOWN", |&(_, name)| name)
    }
}

const CIPHER_NAMES: &[(Cipher, &str)] = &[
    (Cipher::NONE, "NONE"),
    (Cipher::WEP40, "WEP-40"),
    (Cipher::WEP104, "WEP-104"),
    (Cipher::TKIP, "TKIP"),
    (Cipher::CCMP, "CCMP"),
    (Cipher::BIP_CMAC_128, "BIP"),
    (Cipher::GCMP, "GCMP"),
    (Cipher::GCMP_256, "GCMP-256"),
    (Cipher::CCMP_256, "CCMP-256"),
    (Cipher::BIP_GMAC_128, "BIP-GMAC-128"),
    (Cipher::BIP_GMAC_256, "BIP-GMAC-256"),
    (Cipher::BIP_CMAC_256, "BIP-CMAC-256"),
    (Cipher::GTK_NOT_USED, "GTK_NOT_USED"),
];

bitflags! {
    /// Security protocols a network profile allows
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ProtoFlags: u8 {
        /// Legacy WPA (vendor element)
        const WPA = 0b001;
        /// RSN (WPA2/WPA3)
        const RSN = 0b010;
        /// OSEN (Hotspot 2.0 online sign-up)
        const OSEN = 0b100;
    }
}

bitflags! {
    /// RSN capabilities field
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RsnCapabilities: u16 {
        /// Pre-authentication supported
        const PREAUTH = 1 << 0;
        /// No pairwise key (WEP default key 0 with TKIP)
        const NO_PAIRWISE = 1 << 1;
        /// Management frame protection required
        const MFPR = 1 << 6;
        /// Management frame protection capable
        const MFPC = 1 << 7;
        /// SPP A-MSDU capable
        const SPP_A_MSDU_CAPABLE = 1 << 10;
        /// Operating channel validation capable
        const OCVC = 1 << 14;
    }
}

bitflags! {
    /// RSN extension (RSNXE) capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RsnxCapabilities: u16 {
        /// Protected TWT operations supported
        const PROTECTED_TWT = 1 << 4;
        /// SAE hash-to-element supported
        const SAE_H2E = 1 << 5;
        /// SAE public key supported
        const SAE_PK = 1 << 6;
    }
}

impl Default for RsnxCapabilities {
    fn default() -> Self {
        Self::empty()
    }
}

/// Security protocol selected for one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityProto {
    /// No RSN/WPA element; open or static WEP
    Open,
    /// Legacy WPA
    Wpa,
    /// RSN (WPA2/WPA3)
    Rsn,
    /// OSEN
    Osen,
}

impl SecurityProto {
    /// Profile flag matching this protocol (`None` for open).
    #[must_use]
    pub const fn flag(self) -> Option<ProtoFlags> {
        match self {
            Self::Open => None,
            Self::Wpa => Some(ProtoFlags::WPA),
            Self::Rsn => Some(ProtoFlags::RSN),
            Self::Osen => Some(ProtoFlags::OSEN),
        }
    }
}

impl fmt::Display for SecurityProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "OPEN",
            Self::Wpa => "WPA",
            Self::Rsn => "RSN",
            Self::Osen => "OSEN",
        })
    }
}

/// Management frame protection (802.11w) mode.
///
/// Used both as a profile policy and as the negotiated outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PmfMode {
    /// PMF not used
    #[default]
    Disabled,
    /// PMF used when the AP supports it
    Optional,
    /// PMF mandatory
    Required,
}

/// SAE password element derivation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SaePwe {
    /// Hunting-and-pecking only
    HuntAndPeck,
    /// Hash-to-element only
    HashToElement,
    /// Hash-to-element when the AP supports it, hunting-and-pecking otherwise
    #[default]
    Both,
}
