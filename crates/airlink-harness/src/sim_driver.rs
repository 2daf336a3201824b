//! Simulated driver and the access points it can reach.
//!
//! `SimDriver` answers station requests by queueing the [`DriverEvent`]s a real
//! MLME would report. Nothing is delivered synchronously: the caller (scenario
//! world or event loop) drains the outbox with [`SimDriver::take_events`] and
//! feeds each event back into the supplicant, the same way events arrive from
//! a netlink socket.
//!
//! Each AP carries a scripted [`ApBehavior`]. Protected APs also run the AP
//! side of the key handshake: after association they send EAPOL frames built by
//! [`eapol_frame`], which [`SimHandshake`](crate::SimHandshake) verifies
//! against the configured credential.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use airlink_core::{
    CandidateBss, Driver, DriverCapabilities, DriverError, DriverEvent, DriverFlags, IfaceId,
    NegotiatedParams,
};
use airlink_proto::{KeyMgmt, MacAddr, ReasonCode, StatusCode};

/// First message of the 4-way handshake
pub const EAPOL_MSG_1: u8 = 1;
/// Third message of the 4-way handshake; carries the key confirmation
pub const EAPOL_MSG_3: u8 = 3;
/// First message of the group key handshake
pub const EAPOL_GROUP_1: u8 = 5;

/// Build a simulated EAPOL frame: message number followed by the AP's secret.
pub fn eapol_frame(msg: u8, secret: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + secret.len());
    frame.push(msg);
    frame.extend_from_slice(secret.as_bytes());
    frame
}

/// How a simulated AP answers association attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApBehavior {
    /// Authenticate and associate; run the key handshake if protected
    Accept,
    /// Reject the association request
    RejectAssoc {
        /// Status code in the response
        status: StatusCode,
        /// MBO retry delay
        retry_delay: Option<Duration>,
        /// RSSI threshold that lifts the retry delay early
        rssi_threshold: Option<i32>,
    },
    /// Reject authentication
    RejectAuth {
        /// Status code in the response
        status: StatusCode,
    },
    /// Never answer; the station's association timer fires
    Silent,
}

/// One simulated access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAp {
    /// What the AP advertises
    pub bss: CandidateBss,
    /// How it answers
    pub behavior: ApBehavior,
    /// Passphrase or EAP password the AP expects
    pub secret: String,
    /// The AP is within range and shows up in scans
    pub in_range: bool,
}

impl SimAp {
    /// An accepting AP
    pub fn new(bss: CandidateBss, secret: impl Into<String>) -> Self {
        Self { bss, behavior: ApBehavior::Accept, secret: secret.into(), in_range: true }
    }

    /// An accepting AP without security
    pub fn open(bss: CandidateBss) -> Self {
        Self::new(bss, "")
    }

    /// Replace the scripted behaviour
    #[must_use]
    pub fn with_behavior(mut self, behavior: ApBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

/// A request the station issued, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverRequest {
    /// `associate`
    Associate {
        /// Interface
        iface: IfaceId,
        /// Target BSSID
        bssid: MacAddr,
        /// Negotiated AKM
        key_mgmt: KeyMgmt,
    },
    /// `deauthenticate`
    Deauthenticate {
        /// Interface
        iface: IfaceId,
        /// BSSID left
        bssid: MacAddr,
        /// Reason code sent
        reason: ReasonCode,
    },
    /// `trigger_scan`
    TriggerScan {
        /// Interface
        iface: IfaceId,
        /// Requested channels (empty = all)
        freqs: Vec<u32>,
    },
    /// `set_bssid_disallow`
    SetDisallow {
        /// Interface
        iface: IfaceId,
        /// Full disallow list
        bssids: Vec<MacAddr>,
    },
}

/// Simulated driver for every interface of the supplicant.
#[derive(Debug, Clone, Default)]
pub struct SimDriver {
    caps: DriverCapabilities,
    aps: BTreeMap<MacAddr, SimAp>,
    outbox: VecDeque<(IfaceId, DriverEvent)>,
    requests: Vec<DriverRequest>,
    disallowed: BTreeMap<IfaceId, Vec<MacAddr>>,
    associations: BTreeMap<IfaceId, MacAddr>,
    failing_scans: u32,
    quiet_deauth: bool,
}

impl SimDriver {
    /// Driver with the given capabilities and no APs in range
    pub fn new(caps: DriverCapabilities) -> Self {
        Self { caps, ..Self::default() }
    }

    /// Add (or replace) an AP
    pub fn add_ap(&mut self, ap: SimAp) {
        self.aps.insert(ap.bss.bssid, ap);
    }

    /// Change how an AP answers
    pub fn set_behavior(&mut self, bssid: MacAddr, behavior: ApBehavior) {
        if let Some(ap) = self.aps.get_mut(&bssid) {
            ap.behavior = behavior;
        }
    }

    /// Move an AP in or out of range
    pub fn set_in_range(&mut self, bssid: MacAddr, in_range: bool) {
        if let Some(ap) = self.aps.get_mut(&bssid) {
            ap.in_range = in_range;
        }
    }

    /// Fail the next `count` scan requests with `Busy`
    pub fn fail_scans(&mut self, count: u32) {
        self.failing_scans = count;
    }

    /// Stop reporting deauthentications of links that never formed, as many
    /// real drivers do.
    pub fn quiet_deauth(&mut self, quiet: bool) {
        self.quiet_deauth = quiet;
    }

    /// The AP `iface` is associated with drops it.
    ///
    /// Returns false when `iface` has no association.
    pub fn kick(&mut self, iface: IfaceId, reason: ReasonCode) -> bool {
        let Some(bssid) = self.associations.remove(&iface) else {
            return false;
        };
        self.outbox.push_back((iface, DriverEvent::Deauthenticated {
            bssid,
            reason,
            locally_generated: false,
        }));
        true
    }

    /// Queue an arbitrary event
    pub fn inject(&mut self, iface: IfaceId, event: DriverEvent) {
        self.outbox.push_back((iface, event));
    }

    /// Drain queued events in order
    pub fn take_events(&mut self) -> Vec<(IfaceId, DriverEvent)> {
        self.outbox.drain(..).collect()
    }

    /// True when events are waiting
    pub fn has_events(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Every request issued so far
    pub fn requests(&self) -> &[DriverRequest] {
        &self.requests
    }

    /// BSSIDs the station told the driver to avoid on `iface`
    pub fn disallowed(&self, iface: IfaceId) -> &[MacAddr] {
        self.disallowed.get(&iface).map_or(&[], Vec::as_slice)
    }

    /// BSS the driver currently considers `iface` associated with
    pub fn association(&self, iface: IfaceId) -> Option<MacAddr> {
        self.associations.get(&iface).copied()
    }

    /// What a scan on any interface would find right now
    pub fn visible(&self) -> Vec<CandidateBss> {
        self.aps.values().filter(|ap| ap.in_range).map(|ap| ap.bss.clone()).collect()
    }

    fn push(&mut self, iface: IfaceId, event: DriverEvent) {
        self.outbox.push_back((iface, event));
    }
}

impl Driver for SimDriver {
    fn capabilities(&self, _iface: IfaceId) -> DriverCapabilities {
        self.caps
    }

    fn associate(
        &mut self,
        iface: IfaceId,
        params: &NegotiatedParams,
        target: &CandidateBss,
    ) -> Result<(), DriverError> {
        let bssid = target.bssid;
        self.requests.push(DriverRequest::Associate { iface, bssid, key_mgmt: params.key_mgmt });

        if self.disallowed(iface).contains(&bssid) {
            return Err(DriverError::Rejected { status: StatusCode::UNSPECIFIED_FAILURE });
        }
        let Some(ap) = self.aps.get(&bssid).filter(|ap| ap.in_range).cloned() else {
            tracing::debug!(iface = %iface, bssid = %bssid, "no AP answers");
            return Ok(());
        };
        let sme = self.caps.flags.contains(DriverFlags::SME);

        match ap.behavior {
            ApBehavior::Accept => {
                if sme {
                    self.push(iface, DriverEvent::Authenticated { bssid });
                }
                self.push(iface, DriverEvent::Associated { bssid, freq: ap.bss.freq });
                self.associations.insert(iface, bssid);

                if !params.is_open() {
                    for msg in [EAPOL_MSG_1, EAPOL_MSG_3, EAPOL_GROUP_1] {
                        let frame = eapol_frame(msg, &ap.secret);
                        self.push(iface, DriverEvent::EapolRx { src: bssid, frame });
                    }
                }
            },
            ApBehavior::RejectAssoc { status, retry_delay, rssi_threshold } => {
                if sme {
                    self.push(iface, DriverEvent::Authenticated { bssid });
                }
                self.push(iface, DriverEvent::AssocRejected {
                    bssid,
                    status,
                    retry_delay,
                    rssi_threshold,
                });
            },
            ApBehavior::RejectAuth { status } => {
                self.push(iface, DriverEvent::AuthRejected { bssid, status });
            },
            ApBehavior::Silent => {},
        }
        Ok(())
    }

    fn deauthenticate(
        &mut self,
        iface: IfaceId,
        addr: MacAddr,
        reason: ReasonCode,
    ) -> Result<(), DriverError> {
        self.requests.push(DriverRequest::Deauthenticate { iface, bssid: addr, reason });
        let linked = self.associations.remove(&iface) == Some(addr);
        if self.quiet_deauth && !linked {
            tracing::debug!(iface = %iface, bssid = %addr, "deauth of unformed link not reported");
            return Ok(());
        }
        self.push(iface, DriverEvent::Deauthenticated {
            bssid: addr,
            reason,
            locally_generated: true,
        });
        Ok(())
    }

    fn trigger_scan(&mut self, iface: IfaceId, freqs: &[u32]) -> Result<(), DriverError> {
        self.requests.push(DriverRequest::TriggerScan { iface, freqs: freqs.to_vec() });
        if self.failing_scans > 0 {
            self.failing_scans -= 1;
            return Err(DriverError::Busy);
        }
        self.push(iface, DriverEvent::ScanResults);
        Ok(())
    }

    fn set_bssid_disallow(
        &mut self,
        iface: IfaceId,
        bssids: &[MacAddr],
    ) -> Result<(), DriverError> {
        self.requests.push(DriverRequest::SetDisallow { iface, bssids: bssids.to_vec() });
        self.disallowed.insert(iface, bssids.to_vec());
        Ok(())
    }
}
