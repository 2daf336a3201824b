//! Security offers advertised by an access point.
//!
//! The scanning subsystem parses the RSN, WPA and OSEN elements out of beacons
//! and probe responses; the station core only ever sees the result. An element
//! that was present but failed to parse is kept as [`IeOffer::Malformed`] so the
//! negotiator can tell "nothing offered" apart from "garbage offered", while
//! treating both as no offer.

use serde::{Deserialize, Serialize};

use crate::suites::{Cipher, KeyMgmt, RsnCapabilities, SecurityProto};

/// Parsed contents of an RSN, WPA or OSEN element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIe {
    /// Which element this came from
    pub proto: SecurityProto,
    /// Advertised pairwise cipher suites
    pub pairwise: Cipher,
    /// Advertised group cipher
    pub group: Cipher,
    /// Advertised group-management cipher. `None` when the element ends before
    /// the field (BIP-CMAC-128 is implied when PMF is in use).
    pub group_mgmt: Option<Cipher>,
    /// Advertised AKMs
    pub key_mgmt: KeyMgmt,
    /// RSN capabilities
    pub capabilities: RsnCapabilities,
}

impl SecurityIe {
    /// A typical WPA2/WPA3 RSN element with CCMP pairwise and group ciphers.
    #[must_use]
    pub fn rsn(key_mgmt: KeyMgmt, capabilities: RsnCapabilities) -> Self {
        Self {
            proto: SecurityProto::Rsn,
            pairwise: Cipher::CCMP,
            group: Cipher::CCMP,
            group_mgmt: None,
            key_mgmt,
            capabilities,
        }
    }

    /// A legacy WPA element with TKIP ciphers.
    #[must_use]
    pub fn wpa(key_mgmt: KeyMgmt) -> Self {
        Self {
            proto: SecurityProto::Wpa,
            pairwise: Cipher::TKIP,
            group: Cipher::TKIP,
            group_mgmt: None,
            key_mgmt,
            capabilities: RsnCapabilities::empty(),
        }
    }

    /// Builder-style pairwise cipher override.
    #[must_use]
    pub fn with_pairwise(mut self, pairwise: Cipher) -> Self {
        self.pairwise = pairwise;
        self
    }

    /// Builder-style group cipher override.
    #[must_use]
    pub fn with_group(mut self, group: Cipher) -> Self {
        self.group = group;
        self
    }

    /// Builder-style group-management cipher override.
    #[must_use]
    pub fn with_group_mgmt(mut self, group_mgmt: Cipher) -> Self {
        self.group_mgmt = Some(group_mgmt);
        self
    }

    /// True when the AP is at least PMF capable.
    #[must_use]
    pub fn pmf_capable(&self) -> bool {
        self.capabilities.intersects(RsnCapabilities::MFPC | RsnCapabilities::MFPR)
    }

    /// True when the AP requires PMF.
    #[must_use]
    pub fn pmf_required(&self) -> bool {
        self.capabilities.contains(RsnCapabilities::MFPR)
    }
}

/// One security element as delivered by the scanning subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IeOffer {
    /// Element parsed successfully
    Parsed(SecurityIe),
    /// Element present but unparseable
    Malformed {
        /// Parser diagnostic
        reason: String,
    },
}

impl IeOffer {
    /// The parsed element, if any.
    #[must_use]
    pub fn parsed(&self) -> Option<&SecurityIe> {
        match self {
            Self::Parsed(ie) => Some(ie),
            Self::Malformed { .. } => None,
        }
    }

    /// True for a malformed element.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

impl From<SecurityIe> for IeOffer {
    fn from(ie: SecurityIe) -> Self {
        Self::Parsed(ie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmf_capability_bits() {
        let ie = SecurityIe::rsn(KeyMgmt::SAE, RsnCapabilities::MFPC);
        assert!(ie.pmf_capable());
        assert!(!ie.pmf_required());

        let ie = SecurityIe::rsn(KeyMgmt::SAE, RsnCapabilities::MFPC | RsnCapabilities::MFPR);
        assert!(ie.pmf_required());

        assert!(!SecurityIe::wpa(KeyMgmt::PSK).pmf_capable());
    }

    #[test]
    fn malformed_offer_has_no_contents() {
        let offer = IeOffer::Malformed { reason: "truncated suite list".to_string() };
        assert!(offer.is_malformed());
        assert!(offer.parsed().is_none());

        let offer = IeOffer::from(SecurityIe::wpa(KeyMgmt::PSK));
        assert_eq!(offer.parsed().map(|ie| ie.proto), Some(SecurityProto::Wpa));
    }
}
