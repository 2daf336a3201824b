//! 48-bit IEEE 802 MAC addresses.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// A 48-bit MAC address, used both for BSSIDs and for peer station addresses.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-zero address, used by drivers to mean "no address".
    pub const ZERO: Self = Self([0; 6]);

    /// The broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// Create an address from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMac` unless the slice is exactly six bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let arr: [u8; 6] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidMac { input: format!("{} bytes", bytes.len()) })?;
        Ok(Self(arr))
    }

    /// Raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// True for the all-zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// True when the group bit is set (multicast or broadcast).
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl FromStr for MacAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidMac { input: s.to_owned() };

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}
