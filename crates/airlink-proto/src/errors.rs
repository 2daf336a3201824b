//! Error types for parsed 802.11 values.

use thiserror::Error;

/// Errors produced while interpreting 802.11 values handed to the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// MAC address text or bytes could not be interpreted
    #[error("invalid MAC address: {input:?}")]
    InvalidMac {
        /// The offending input, as text
        input: String,
    },

    /// A security element was present but could not be parsed
    #[error("malformed {element} element: {reason}")]
    MalformedIe {
        /// Element name (RSN, WPA, OSEN, RSNX)
        element: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

/// Convenient Result type alias for protocol value operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
