//! Scan results as seen by the station.
//!
//! The BSS catalog itself (scan result storage, aging, merging of beacon and
//! probe response data) lives outside the core. The station only asks it for
//! an ordered candidate list.

use airlink_proto::{BandSet, IeOffer, MacAddr, RsnxCapabilities, SecurityIe};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::IfaceId;

bitflags! {
    /// Capability information field bits the station cares about
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BssCapabilities: u16 {
        /// Infrastructure BSS
        const ESS = 1 << 0;
        /// Independent BSS (ad-hoc)
        const IBSS = 1 << 1;
        /// Data confidentiality required
        const PRIVACY = 1 << 4;
    }
}

/// One observed access point, immutable for the duration of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateBss {
    /// BSSID
    pub bssid: MacAddr,
    /// Network name
    pub ssid: String,
    /// Operating frequency in MHz
    pub freq: u32,
    /// RSN element
    pub rsn: Option<IeOffer>,
    /// Legacy WPA vendor element
    pub wpa: Option<IeOffer>,
    /// OSEN element
    pub osen: Option<IeOffer>,
    /// RSN extension capabilities
    pub rsnx: RsnxCapabilities,
    /// Capability information
    pub caps: BssCapabilities,
    /// Signal level in dBm
    pub signal: i32,
}

impl CandidateBss {
    /// An open infrastructure BSS with no security elements.
    pub fn new(bssid: MacAddr, ssid: impl Into<String>, freq: u32) -> Self {
        Self {
            bssid,
            ssid: ssid.into(),
            freq,
            rsn: None,
            wpa: None,
            osen: None,
            rsnx: RsnxCapabilities::empty(),
            caps: BssCapabilities::ESS,
            signal: -50,
        }
    }

    /// Attach an RSN element (sets the privacy bit)
    #[must_use]
    pub fn with_rsn(mut self, ie: SecurityIe) -> Self {
        self.rsn = Some(IeOffer::Parsed(ie));
        self.caps |= BssCapabilities::PRIVACY;
        self
    }

    /// Attach a legacy WPA element (sets the privacy bit)
    #[must_use]
    pub fn with_wpa(mut self, ie: SecurityIe) -> Self {
        self.wpa = Some(IeOffer::Parsed(ie));
        self.caps |= BssCapabilities::PRIVACY;
        self
    }

    /// Attach an OSEN element
    #[must_use]
    pub fn with_osen(mut self, ie: SecurityIe) -> Self {
        self.osen = Some(IeOffer::Parsed(ie));
        self
    }

    /// Attach an RSN element that failed to parse
    #[must_use]
    pub fn with_malformed_rsn(mut self, reason: impl Into<String>) -> Self {
        self.rsn = Some(IeOffer::Malformed { reason: reason.into() });
        self.caps |= BssCapabilities::PRIVACY;
        self
    }

    /// Set RSNXE capabilities
    #[must_use]
    pub fn with_rsnx(mut self, rsnx: RsnxCapabilities) -> Self {
        self.rsnx = rsnx;
        self
    }

    /// Set the signal level
    #[must_use]
    pub fn with_signal(mut self, signal: i32) -> Self {
        self.signal = signal;
        self
    }

    /// Band of the operating frequency
    pub fn band(&self) -> BandSet {
        BandSet::from_freq(self.freq)
    }

    /// True when the BSS advertises SAE hash-to-element support
    pub fn supports_h2e(&self) -> bool {
        self.rsnx.contains(RsnxCapabilities::SAE_H2E)
    }

    /// True when the BSS advertises any security element, parsed or not
    pub fn has_security_ie(&self) -> bool {
        self.rsn.is_some() || self.wpa.is_some() || self.osen.is_some()
    }
}

/// Narrows what the catalog returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Only BSSes with this SSID
    pub ssid: Option<String>,
    /// Only this BSSID
    pub bssid: Option<MacAddr>,
}

impl CandidateFilter {
    /// Matches everything
    pub fn any() -> Self {
        Self::default()
    }

    /// Only BSSes of one network
    pub fn ssid(ssid: impl Into<String>) -> Self {
        Self { ssid: Some(ssid.into()), bssid: None }
    }

    /// True when `bss` passes the filter
    pub fn matches(&self, bss: &CandidateBss) -> bool {
        self.ssid.as_ref().map_or(true, |ssid| *ssid == bss.ssid)
            && self.bssid.map_or(true, |bssid| bssid == bss.bssid)
    }
}

/// Read-only access to the BSS catalog.
///
/// Candidates come back in the catalog's preference order; the station
/// keeps that order except where profile priority overrides it.
pub trait BssCatalog {
    /// Candidates visible on `iface` that pass `filter`
    fn candidates(&self, iface: IfaceId, filter: &CandidateFilter) -> Vec<CandidateBss>;
}

impl BssCatalog for Vec<CandidateBss> {
    fn candidates(&self, _iface: IfaceId, filter: &CandidateFilter) -> Vec<CandidateBss> {
        self.iter().filter(|bss| filter.matches(bss)).cloned().collect()
    }
}

impl BssCatalog for [CandidateBss] {
    fn candidates(&self, _iface: IfaceId, filter: &CandidateFilter) -> Vec<CandidateBss> {
        self.iter().filter(|bss| filter.matches(bss)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use airlink_proto::{KeyMgmt, RsnCapabilities};

    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn filter_by_ssid_keeps_catalog_order() {
        let catalog = vec![
            CandidateBss::new(mac(1), "home", 2412),
            CandidateBss::new(mac(2), "guest", 2437),
            CandidateBss::new(mac(3), "home", 5180),
        ];

        let found = catalog.candidates(IfaceId(0), &CandidateFilter::ssid("home"));
        let bssids: Vec<_> = found.iter().map(|bss| bss.bssid).collect();
        assert_eq!(bssids, vec![mac(1), mac(3)]);
    }

    #[test]
    fn security_builders_set_privacy() {
        let bss = CandidateBss::new(mac(1), "home", 5180)
            .with_rsn(SecurityIe::rsn(KeyMgmt::PSK, RsnCapabilities::empty()));
        assert!(bss.caps.contains(BssCapabilities::PRIVACY));
        assert!(bss.has_security_ie());
        assert_eq!(bss.band(), BandSet::GHZ_5);
        assert!(!CandidateBss::new(mac(2), "open", 2412).has_security_ie());
    }
}
