//! Control boundary: commands in, notifications out.
//!
//! The text control protocol is parsed elsewhere; the core only sees the closed
//! [`ControlCommand`] set. Notifications render in the traditional
//! control-interface event format so a front end can forward them verbatim.

use std::{fmt, time::Duration};

use airlink_proto::{KeyMgmt, MacAddr, ReasonCode, StatusCode};

use crate::{policy::DisableReason, profile::ProfileId, station::ConnectionState};

/// Operator commands the station core handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Report the connection status
    Status,
    /// Start connecting, optionally restricted to one network
    Connect {
        /// Network to select; `None` lets the station choose
        network: Option<ProfileId>,
    },
    /// Disconnect and stay disconnected until the next connect
    Disconnect,
    /// Drop the current association and connect again
    Reassociate,
    /// Enable a network (clears a temporary disable)
    EnableNetwork(ProfileId),
    /// Disable a network
    DisableNetwork(ProfileId),
}

/// Reply to a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Connection status
    Status {
        /// Current state
        state: ConnectionState,
        /// Current (or target) BSSID
        bssid: Option<MacAddr>,
        /// Current (or target) SSID
        ssid: Option<String>,
        /// Negotiated key management
        key_mgmt: Option<KeyMgmt>,
    },
    /// Command accepted
    Ok,
}

impl fmt::Display for ControlReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { state, bssid, ssid, key_mgmt } => {
                if let Some(bssid) = bssid {
                    writeln!(f, "bssid={bssid}")?;
                }
                if let Some(ssid) = ssid {
                    writeln!(f, "ssid={ssid}")?;
                }
                if let Some(key_mgmt) = key_mgmt {
                    writeln!(f, "key_mgmt={}", key_mgmt.name())?;
                }
                writeln!(f, "wpa_state={}", state.as_str())
            },
            Self::Ok => f.write_str("OK"),
        }
    }
}

/// Outbound event for the control front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Connection state changed
    StateChange {
        /// Network involved, if any
        id: Option<ProfileId>,
        /// New state
        state: ConnectionState,
        /// BSSID involved
        bssid: MacAddr,
        /// SSID involved
        ssid: String,
    },
    /// Connection completed
    Connected {
        /// AP address
        bssid: MacAddr,
        /// Network
        id: ProfileId,
    },
    /// Connection lost or torn down
    Disconnected {
        /// AP address
        bssid: MacAddr,
        /// Reason code
        reason: ReasonCode,
        /// Initiated by this station
        locally_generated: bool,
    },
    /// Association rejected by the AP
    AssocReject {
        /// AP address
        bssid: MacAddr,
        /// Status code
        status: StatusCode,
    },
    /// Authentication rejected by the AP
    AuthReject {
        /// AP address
        bssid: MacAddr,
        /// Status code
        status: StatusCode,
    },
    /// A network was temporarily disabled after failures
    SsidTempDisabled {
        /// Network
        id: ProfileId,
        /// Network name
        ssid: String,
        /// Failures in the current streak
        auth_failures: u32,
        /// Disable duration
        duration: Duration,
        /// Why
        reason: DisableReason,
    },
    /// A temporarily disabled network was re-enabled
    SsidReenabled {
        /// Network
        id: ProfileId,
        /// Network name
        ssid: String,
    },
    /// A BSS was temporarily disallowed
    BssTempDisallowed {
        /// AP address
        bssid: MacAddr,
        /// Disallow duration
        duration: Duration,
        /// Signal level that lifts the disallow early
        rssi_threshold: Option<i32>,
    },
    /// A scan was started
    ScanStarted,
    /// Scan results are available
    ScanResults,
    /// A scan request failed
    ScanFailed,
    /// No usable network in the scan results
    NetworkNotFound,
    /// TKIP countermeasures started
    TkipCountermeasures {
        /// How long associations stay blocked
        duration: Duration,
    },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChange { id, state, bssid, ssid } => {
                let id = id.map_or(-1, |id| i64::from(id.0));
                write!(
                    f,
                    "CTRL-EVENT-STATE-CHANGE id={id} state={} BSSID={bssid} SSID={ssid}",
                    state.as_str()
                )
            },
            Self::Connected { bssid, id } => {
                write!(f, "CTRL-EVENT-CONNECTED - Connection to {bssid} completed [id={id}]")
            },
            Self::Disconnected { bssid, reason, locally_generated } => {
                write!(f, "CTRL-EVENT-DISCONNECTED bssid={bssid} reason={reason}")?;
                if *locally_generated {
                    f.write_str(" locally_generated=1")?;
                }
                Ok(())
            },
            Self::AssocReject { bssid, status } => {
                write!(f, "CTRL-EVENT-ASSOC-REJECT bssid={bssid} status_code={status}")
            },
            Self::AuthReject { bssid, status } => {
                write!(f, "CTRL-EVENT-AUTH-REJECT {bssid} status_code={status}")
            },
            Self::SsidTempDisabled { id, ssid, auth_failures, duration, reason } => write!(
                f,
                "CTRL-EVENT-SSID-TEMP-DISABLED id={id} ssid=\"{ssid}\" auth_failures={auth_failures} duration={} reason={reason}",
                duration.as_secs()
            ),
            Self::SsidReenabled { id, ssid } => {
                write!(f, "CTRL-EVENT-SSID-REENABLED id={id} ssid=\"{ssid}\"")
            },
            Self::BssTempDisallowed { bssid, duration, rssi_threshold } => {
                write!(
                    f,
                    "CTRL-EVENT-BSS-TEMP-DISALLOWED bssid={bssid} duration={}",
                    duration.as_secs()
                )?;
                if let Some(threshold) = rssi_threshold {
                    write!(f, " rssi_threshold={threshold}")?;
                }
                Ok(())
            },
            Self::ScanStarted => f.write_str("CTRL-EVENT-SCAN-STARTED"),
            Self::ScanResults => f.write_str("CTRL-EVENT-SCAN-RESULTS"),
            Self::ScanFailed => f.write_str("CTRL-EVENT-SCAN-FAILED"),
            Self::NetworkNotFound => f.write_str("CTRL-EVENT-NETWORK-NOT-FOUND"),
            Self::TkipCountermeasures { duration } => {
                write!(f, "CTRL-EVENT-TKIP-COUNTERMEASURES duration={}", duration.as_secs())
            },
        }
    }
}
