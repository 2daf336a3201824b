//! Driver, MLME and key handshake boundaries.
//!
//! The core never talks to hardware. It issues a handful of requests through
//! [`Driver`], receives [`DriverEvent`]s from whoever owns the netlink socket,
//! and delegates EAPOL key exchanges to a [`KeyHandshake`] implementation.

use std::time::Duration;

use airlink_proto::{BandSet, Cipher, KeyMgmt, MacAddr, ReasonCode, StatusCode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    bss::CandidateBss, error::DriverError, negotiate::NegotiatedParams, profile::NetworkProfile,
    radio::RadioCaps, IfaceId,
};

bitflags! {
    /// Driver feature flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DriverFlags: u32 {
        /// Off-channel operations may run concurrently on disjoint bands
        const OFFCHANNEL_SIMULTANEOUS = 1 << 0;
        /// Authentication frames are built by the station (SME in userspace)
        const SME = 1 << 1;
        /// Request errors are final; no event will follow a failed request
        const AUTHORITATIVE_ERRORS = 1 << 2;
    }
}

/// What a driver can do, queried once per interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCapabilities {
    /// Supported AKMs
    pub key_mgmt: KeyMgmt,
    /// Supported ciphers
    pub ciphers: Cipher,
    /// Supported bands
    pub bands: BandSet,
    /// Feature flags
    pub flags: DriverFlags,
}

impl DriverCapabilities {
    /// Radio admission parameters derived from the capabilities.
    pub fn radio_caps(&self) -> RadioCaps {
        RadioCaps {
            offchannel_simultaneous: self.flags.contains(DriverFlags::OFFCHANNEL_SIMULTANEOUS),
            bands: self.bands,
        }
    }
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        Self {
            key_mgmt: KeyMgmt::all(),
            ciphers: Cipher::all(),
            bands: BandSet::GHZ_2_4 | BandSet::GHZ_5,
            flags: DriverFlags::empty(),
        }
    }
}

/// Requests the station issues to the driver.
pub trait Driver {
    /// Capabilities of the device behind `iface`
    fn capabilities(&self, iface: IfaceId) -> DriverCapabilities;

    /// Start authentication and association with `target`.
    ///
    /// Success only means the request was accepted; the outcome arrives as a
    /// [`DriverEvent`].
    fn associate(
        &mut self,
        iface: IfaceId,
        params: &NegotiatedParams,
        target: &CandidateBss,
    ) -> Result<(), DriverError>;

    /// Leave the BSS `addr`
    fn deauthenticate(
        &mut self,
        iface: IfaceId,
        addr: MacAddr,
        reason: ReasonCode,
    ) -> Result<(), DriverError>;

    /// Start a scan; an empty list means all supported channels
    fn trigger_scan(&mut self, iface: IfaceId, freqs: &[u32]) -> Result<(), DriverError>;

    /// Replace the set of BSSIDs the driver must not associate with
    fn set_bssid_disallow(&mut self, iface: IfaceId, bssids: &[MacAddr])
    -> Result<(), DriverError>;
}

/// Events reported by the driver/MLME.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Authentication completed (SME drivers only)
    Authenticated {
        /// AP address
        bssid: MacAddr,
    },
    /// Association completed
    Associated {
        /// AP address
        bssid: MacAddr,
        /// Operating frequency
        freq: u32,
    },
    /// The AP rejected the association request
    AssocRejected {
        /// AP address
        bssid: MacAddr,
        /// Status code from the response
        status: StatusCode,
        /// Retry delay the AP asked for (MBO association retry delay)
        retry_delay: Option<Duration>,
        /// Signal level above which the AP would accept us
        rssi_threshold: Option<i32>,
    },
    /// The AP rejected authentication
    AuthRejected {
        /// AP address
        bssid: MacAddr,
        /// Status code from the response
        status: StatusCode,
    },
    /// Disassociated
    Disassociated {
        /// AP address
        bssid: MacAddr,
        /// Reason code
        reason: ReasonCode,
        /// Disassociation originated from this station
        locally_generated: bool,
    },
    /// Deauthenticated
    Deauthenticated {
        /// AP address
        bssid: MacAddr,
        /// Reason code
        reason: ReasonCode,
        /// Deauthentication originated from this station
        locally_generated: bool,
    },
    /// EAPOL frame received
    EapolRx {
        /// Source address
        src: MacAddr,
        /// Frame body
        frame: Vec<u8>,
    },
    /// A scan finished and the catalog is up to date
    ScanResults,
    /// A scan could not be performed
    ScanFailed,
    /// The interface came up
    InterfaceEnabled,
    /// The interface went down
    InterfaceDisabled,
    /// TKIP Michael MIC failure detected
    MichaelMicFailure {
        /// Failure was on the pairwise key
        pairwise: bool,
    },
}

/// Outcome of feeding one EAPOL frame to the key handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// Frame consumed, handshake continues
    Pending,
    /// 4-way handshake done
    PairwiseComplete {
        /// A separate group key handshake follows
        group_pending: bool,
    },
    /// Group key handshake done
    GroupComplete,
    /// Handshake failed; the connection must be torn down
    Failed {
        /// Reason to deauthenticate with
        reason: ReasonCode,
    },
}

/// The key handshake subsystem (4-way, group key, EAP).
pub trait KeyHandshake {
    /// Prepare for a new association
    fn configure(&mut self, iface: IfaceId, params: &NegotiatedParams, profile: &NetworkProfile);

    /// Open or close the controlled port
    fn notify_port_valid(&mut self, iface: IfaceId, valid: bool);

    /// Process one received EAPOL frame
    fn process_eapol(&mut self, iface: IfaceId, src: MacAddr, frame: &[u8]) -> HandshakeProgress;
}
