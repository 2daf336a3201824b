//! IEEE 802.11 reason and status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason code carried in deauthentication and disassociation frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCode(pub u16);

impl ReasonCode {
    /// Unspecified reason
    pub const UNSPECIFIED: Self = Self(1);
    /// Previous authentication no longer valid
    pub const PREV_AUTH_NOT_VALID: Self = Self(2);
    /// Station is leaving
    pub const DEAUTH_LEAVING: Self = Self(3);
    /// Disassociated due to inactivity
    pub const DISASSOC_DUE_TO_INACTIVITY: Self = Self(4);
    /// AP unable to handle all associated stations
    pub const DISASSOC_AP_BUSY: Self = Self(5);
    /// Michael MIC failure (TKIP countermeasures)
    pub const MICHAEL_MIC_FAILURE: Self = Self(14);
    /// 4-way handshake timeout
    pub const FOURWAY_HANDSHAKE_TIMEOUT: Self = Self(15);
    /// Group key handshake timeout
    pub const GROUP_KEY_UPDATE_TIMEOUT: Self = Self(16);
    /// IEEE 802.1X authentication failed
    pub const IEEE_802_1X_AUTH_FAILED: Self = Self(23);

    /// Reasons an AP sends when our credentials were rejected during key
    /// negotiation.
    #[must_use]
    pub fn indicates_bad_credentials(self) -> bool {
        matches!(
            self,
            Self::PREV_AUTH_NOT_VALID
                | Self::FOURWAY_HANDSHAKE_TIMEOUT
                | Self::IEEE_802_1X_AUTH_FAILED
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status code carried in authentication and association responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// Success
    pub const SUCCESS: Self = Self(0);
    /// Unspecified failure
    pub const UNSPECIFIED_FAILURE: Self = Self(1);
    /// AP unable to handle additional associated stations
    pub const AP_UNABLE_TO_HANDLE_NEW_STA: Self = Self(17);
    /// Association rejected temporarily; try again later (PMF SA query)
    pub const ASSOC_REJECTED_TEMPORARILY: Self = Self(30);
    /// Denied because of poor channel conditions (OCE RSSI-based rejection)
    pub const DENIED_POOR_CHANNEL_CONDITIONS: Self = Self(34);
    /// Invalid PMKID
    pub const INVALID_PMKID: Self = Self(53);
    /// Anti-clogging token required (SAE)
    pub const ANTI_CLOGGING_TOKEN_REQ: Self = Self(76);
    /// Unknown SAE password identifier
    pub const UNKNOWN_PASSWORD_IDENTIFIER: Self = Self(123);

    /// True when the rejection is caused by the AP's load or radio
    /// conditions rather than by our credentials.
    #[must_use]
    pub fn is_load_related(self) -> bool {
        matches!(
            self,
            Self::AP_UNABLE_TO_HANDLE_NEW_STA
                | Self::DENIED_POOR_CHANNEL_CONDITIONS
                | Self::ASSOC_REJECTED_TEMPORARILY
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
