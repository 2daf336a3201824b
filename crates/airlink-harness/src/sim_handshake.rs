//! Simulated key handshake.
//!
//! Frames come from [`SimDriver`](crate::SimDriver): a message number followed
//! by the AP's secret. Message 3 plays the role of the MIC check; it fails when
//! the secret does not match the profile credential, which is how a wrong
//! passphrase (or a rejected EAP password) shows up to the station.

use std::collections::BTreeMap;

use airlink_core::{
    Credential, HandshakeProgress, IfaceId, KeyHandshake, NegotiatedParams, NetworkProfile,
};
use airlink_proto::{KeyMgmt, MacAddr, ReasonCode};

use crate::sim_driver::{EAPOL_GROUP_1, EAPOL_MSG_1, EAPOL_MSG_3};

#[derive(Debug, Clone)]
struct Session {
    key_mgmt: KeyMgmt,
    secret: Option<String>,
}

/// Key handshake that checks credentials against the simulated AP's secret.
#[derive(Debug, Clone, Default)]
pub struct SimHandshake {
    sessions: BTreeMap<IfaceId, Session>,
    port_valid: BTreeMap<IfaceId, bool>,
    frames: usize,
}

impl SimHandshake {
    /// Handshake with no sessions
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the controlled port of `iface` was opened and not closed since
    pub fn is_port_valid(&self, iface: IfaceId) -> bool {
        self.port_valid.get(&iface).copied().unwrap_or(false)
    }

    /// EAPOL frames processed so far
    pub fn frames_processed(&self) -> usize {
        self.frames
    }

    /// AKM the handshake on `iface` was configured for
    pub fn configured_key_mgmt(&self, iface: IfaceId) -> Option<KeyMgmt> {
        self.sessions.get(&iface).map(|session| session.key_mgmt)
    }
}

impl KeyHandshake for SimHandshake {
    fn configure(&mut self, iface: IfaceId, params: &NegotiatedParams, profile: &NetworkProfile) {
        let secret = match &profile.credential {
            Credential::None => None,
            Credential::Passphrase(passphrase) => Some(passphrase.clone()),
            Credential::EapPassword { password, .. } => Some(password.clone()),
            Credential::EapCertificate { identity } => Some(identity.clone()),
        };
        self.sessions.insert(iface, Session { key_mgmt: params.key_mgmt, secret });
    }

    fn notify_port_valid(&mut self, iface: IfaceId, valid: bool) {
        self.port_valid.insert(iface, valid);
    }

    fn process_eapol(&mut self, iface: IfaceId, src: MacAddr, frame: &[u8]) -> HandshakeProgress {
        self.frames += 1;
        let Some(session) = self.sessions.get(&iface) else {
            tracing::debug!(iface = %iface, src = %src, "EAPOL without a configured session");
            return HandshakeProgress::Failed { reason: ReasonCode::UNSPECIFIED };
        };
        let Some((&msg, secret)) = frame.split_first() else {
            return HandshakeProgress::Pending;
        };

        match msg {
            EAPOL_MSG_1 => HandshakeProgress::Pending,
            EAPOL_MSG_3 => {
                if session.secret.as_deref().map(str::as_bytes) == Some(secret) {
                    HandshakeProgress::PairwiseComplete { group_pending: true }
                } else if session.key_mgmt.is_ieee8021x() {
                    HandshakeProgress::Failed { reason: ReasonCode::IEEE_802_1X_AUTH_FAILED }
                } else {
                    HandshakeProgress::Failed { reason: ReasonCode::FOURWAY_HANDSHAKE_TIMEOUT }
                }
            },
            EAPOL_GROUP_1 => HandshakeProgress::GroupComplete,
            _ => HandshakeProgress::Pending,
        }
    }
}
