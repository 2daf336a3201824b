//! Network profiles.
//!
//! A profile is one configured network: what the operator allows (protocols,
//! ciphers, AKMs, PMF policy), the credential, and the per-profile failure
//! bookkeeping the failure policy maintains. Failure state is process-lifetime
//! only and never persisted.

use std::{fmt, time::Instant};

use airlink_proto::{Cipher, KeyMgmt, MacAddr, PmfMode, ProtoFlags, SaePwe};

/// Identifier of a network profile, unique per interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub u32);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credential material handed to the key handshake subsystem.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Open network
    None,
    /// WPA-PSK passphrase or SAE password
    Passphrase(String),
    /// EAP with a password (PEAP/TTLS/PWD style)
    EapPassword {
        /// Identity
        identity: String,
        /// Password
        password: String,
    },
    /// EAP with a client certificate (TLS)
    EapCertificate {
        /// Identity
        identity: String,
    },
}

impl Credential {
    /// True for credentials a user types in; repeated failures with these are
    /// usually a wrong password.
    pub fn is_password_based(&self) -> bool {
        matches!(self, Self::Passphrase(_) | Self::EapPassword { .. })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Passphrase(_) => f.write_str("Passphrase(<redacted>)"),
            Self::EapPassword { identity, .. } => f
                .debug_struct("EapPassword")
                .field("identity", identity)
                .field("password", &"<redacted>")
                .finish(),
            Self::EapCertificate { identity } => {
                f.debug_struct("EapCertificate").field("identity", identity).finish()
            },
        }
    }
}

/// Failure bookkeeping, owned by the profile and updated by the failure
/// policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FailureState {
    pub(crate) auth_failures: u32,
    pub(crate) disabled_until: Option<Instant>,
    pub(crate) disabled_by: Option<MacAddr>,
}

/// One configured network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    /// Profile identifier
    pub id: ProfileId,
    /// Network name
    pub ssid: String,
    /// Profile may be selected
    pub enabled: bool,
    /// Higher priority profiles are preferred
    pub priority: i32,
    /// Allowed security protocols
    pub proto: ProtoFlags,
    /// Allowed AKMs
    pub key_mgmt: KeyMgmt,
    /// Allowed pairwise ciphers
    pub pairwise: Cipher,
    /// Allowed group ciphers
    pub group: Cipher,
    /// Allowed group-management ciphers
    pub group_mgmt: Cipher,
    /// Only associate with this BSSID
    pub bssid: Option<MacAddr>,
    /// Protected management frames policy
    pub pmf: PmfMode,
    /// SAE password element policy
    pub sae_pwe: SaePwe,
    /// Credential material
    pub credential: Credential,
    pub(crate) failures: FailureState,
}

impl NetworkProfile {
    /// A profile with the stock defaults: WPA/RSN, CCMP or TKIP, WPA-PSK or
    /// WPA-EAP, PMF disabled.
    pub fn new(id: ProfileId, ssid: impl Into<String>, credential: Credential) -> Self {
        Self {
            id,
            ssid: ssid.into(),
            enabled: true,
            priority: 0,
            proto: ProtoFlags::RSN | ProtoFlags::WPA,
            key_mgmt: KeyMgmt::PSK | KeyMgmt::IEEE8021X,
            pairwise: Cipher::CCMP | Cipher::TKIP,
            group: Cipher::CCMP | Cipher::TKIP,
            group_mgmt: Cipher::GROUP_MGMT_ALL,
            bssid: None,
            pmf: PmfMode::Disabled,
            sae_pwe: SaePwe::default(),
            credential,
            failures: FailureState::default(),
        }
    }

    /// Open network
    pub fn open(id: ProfileId, ssid: impl Into<String>) -> Self {
        Self::new(id, ssid, Credential::None).with_key_mgmt(KeyMgmt::NONE)
    }

    /// WPA2-Personal
    pub fn psk(id: ProfileId, ssid: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self::new(id, ssid, Credential::Passphrase(passphrase.into())).with_key_mgmt(KeyMgmt::PSK)
    }

    /// WPA3-Personal
    pub fn sae(id: ProfileId, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(id, ssid, Credential::Passphrase(password.into()))
            .with_proto(ProtoFlags::RSN)
            .with_key_mgmt(KeyMgmt::SAE)
            .with_pairwise(Cipher::CCMP)
            .with_group(Cipher::CCMP)
            .with_pmf(PmfMode::Required)
    }

    /// WPA2-Enterprise with a password-based EAP method
    pub fn eap_password(
        id: ProfileId,
        ssid: impl Into<String>,
        identity: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            ssid,
            Credential::EapPassword { identity: identity.into(), password: password.into() },
        )
        .with_key_mgmt(KeyMgmt::IEEE8021X)
    }

    /// Replace the allowed AKMs
    #[must_use]
    pub fn with_key_mgmt(mut self, key_mgmt: KeyMgmt) -> Self {
        self.key_mgmt = key_mgmt;
        self
    }

    /// Replace the allowed protocols
    #[must_use]
    pub fn with_proto(mut self, proto: ProtoFlags) -> Self {
        self.proto = proto;
        self
    }

    /// Replace the allowed pairwise ciphers
    #[must_use]
    pub fn with_pairwise(mut self, pairwise: Cipher) -> Self {
        self.pairwise = pairwise;
        self
    }

    /// Replace the allowed group ciphers
    #[must_use]
    pub fn with_group(mut self, group: Cipher) -> Self {
        self.group = group;
        self
    }

    /// Replace the PMF policy
    #[must_use]
    pub fn with_pmf(mut self, pmf: PmfMode) -> Self {
        self.pmf = pmf;
        self
    }

    /// Replace the SAE password element policy
    #[must_use]
    pub fn with_sae_pwe(mut self, sae_pwe: SaePwe) -> Self {
        self.sae_pwe = sae_pwe;
        self
    }

    /// Pin the profile to one BSSID
    #[must_use]
    pub fn with_bssid(mut self, bssid: MacAddr) -> Self {
        self.bssid = Some(bssid);
        self
    }

    /// Set the selection priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Consecutive authentication failures in the current streak
    pub fn auth_failures(&self) -> u32 {
        self.failures.auth_failures
    }

    /// End of the current temporary disable, if any
    pub fn disabled_until(&self) -> Option<Instant> {
        self.failures.disabled_until
    }

    /// BSSID blamed for the most recent temporary disable
    pub fn disabled_by(&self) -> Option<MacAddr> {
        self.failures.disabled_by
    }

    /// True while the profile is temporarily disabled.
    ///
    /// Evaluated lazily: an expired disable stays recorded (the streak
    /// continues) but no longer blocks selection.
    pub fn is_temp_disabled(&self, now: Instant) -> bool {
        self.failures.disabled_until.is_some_and(|until| now < until)
    }

    /// True if the profile authenticates with a password over 802.1X.
    pub fn is_password_eap(&self) -> bool {
        self.key_mgmt.is_ieee8021x() && matches!(self.credential, Credential::EapPassword { .. })
    }

    /// Operator override: forget the failure streak.
    pub(crate) fn clear_failures(&mut self) {
        self.failures = FailureState::default();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn credentials_are_redacted_in_debug() {
        let cred = Credential::EapPassword {
            identity: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let text = format!("{cred:?}");
        assert!(text.contains("alice"));
        assert!(!text.contains("hunter2"));

        let text = format!("{:?}", NetworkProfile::psk(ProfileId(0), "home", "secret-psk"));
        assert!(!text.contains("secret-psk"));
    }

    #[test]
    fn temp_disable_is_evaluated_lazily() {
        let t0 = Instant::now();
        let mut profile = NetworkProfile::psk(ProfileId(1), "home", "password");
        profile.failures.disabled_until = Some(t0 + Duration::from_secs(10));

        assert!(profile.is_temp_disabled(t0));
        assert!(!profile.is_temp_disabled(t0 + Duration::from_secs(10)));
        assert_eq!(profile.disabled_until(), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn password_eap_detection() {
        let eap = NetworkProfile::eap_password(ProfileId(2), "corp", "alice", "pw");
        assert!(eap.is_password_eap());
        assert!(!NetworkProfile::psk(ProfileId(3), "home", "pw").is_password_eap());
    }
}
