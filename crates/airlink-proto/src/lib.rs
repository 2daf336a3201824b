//! Parsed IEEE 802.11 value types for the airlink station core.
//!
//! Nothing in this crate touches bytes on the air. Beacon and probe-response
//! parsing belongs to the scanning subsystem; what reaches the station core is
//! the already-parsed view defined here:
//!
//! - [`addr`]: 48-bit MAC addresses (BSSIDs, peer addresses)
//! - [`band`]: frequency → band mapping and band sets used for radio admission
//! - [`suites`]: cipher, key-management and protocol bitsets, RSN capabilities
//! - [`ie`]: the security offer an AP advertises in its RSN / WPA / OSEN element
//! - [`codes`]: 802.11 reason and status codes
//! - [`errors`]: protocol-level errors
//!
//! All bitsets are `bitflags` wrappers. Unknown bits are retained, never
//! rejected: an AP advertising a suite we do not know simply offers nothing we
//! can use.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod addr;
pub mod band;
pub mod codes;
pub mod errors;
pub mod ie;
pub mod suites;

pub use addr::MacAddr;
pub use band::BandSet;
pub use codes::{ReasonCode, StatusCode};
pub use errors::{ProtocolError, Result};
pub use ie::{IeOffer, SecurityIe};
pub use suites::{
    Cipher, KeyMgmt, PmfMode, ProtoFlags, RsnCapabilities, RsnxCapabilities, SaePwe,
    SecurityProto,
};
