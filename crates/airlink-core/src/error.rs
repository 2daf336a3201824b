//! Error types for the station core.
//!
//! Each layer has its own strongly-typed error:
//! - [`NegotiationError`]: no usable security parameters for one attempt
//! - [`DriverError`]: a driver request failed
//! - [`SchedulerError`]: a radio work could not be queued or found
//! - [`StationError`]: an operation was invalid for the interface state
//!
//! None of these are fatal to the daemon. Negotiation and driver failures feed
//! the failure policy; cancellation of radio work is not an error at all.

use airlink_proto::StatusCode;
use thiserror::Error;

use crate::{profile::ProfileId, radio::WorkId, station::ConnectionState, IfaceId};

/// Security negotiation failed for one candidate.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationError {
    /// Pairwise or group cipher sets do not intersect
    #[error("no common cipher")]
    NoCommonCipher,

    /// Key-management sets do not intersect
    #[error("no common key management")]
    NoCommonAkm,

    /// PMF is required but the AP is not PMF capable
    #[error("protected management frames required but unavailable")]
    PmfUnavailable,

    /// The only allowed security element was unparseable
    #[error("malformed security element")]
    MalformedIe,
}

impl NegotiationError {
    /// Negotiation failures are a property of the AP's advertisement; retrying
    /// against the same advertisement cannot succeed.
    pub fn is_transient(&self) -> bool {
        false
    }

    /// Short reason string used in notifications.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoCommonCipher => "NO_COMMON_CIPHER",
            Self::NoCommonAkm => "NO_COMMON_AKM",
            Self::PmfUnavailable => "PMF_UNAVAILABLE",
            Self::MalformedIe => "MALFORMED_IE",
        }
    }
}

/// A driver request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver (or firmware) rejected the request with a status code
    #[error("request rejected with status {status}")]
    Rejected {
        /// 802.11 status code reported by the driver
        status: StatusCode,
    },

    /// The device is busy with another operation
    #[error("device busy")]
    Busy,

    /// The request is not supported by this driver
    #[error("operation not supported")]
    Unsupported,

    /// Transport failure towards the driver
    #[error("driver i/o error: {0}")]
    Io(String),
}

/// Radio work could not be queued or located.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The radio queue is at capacity; the caller retries later or drops
    #[error("radio {radio} work queue full ({capacity} items)")]
    QueueFull {
        /// Radio name
        radio: String,
        /// Configured capacity
        capacity: usize,
    },

    /// The interface is not attached to any radio
    #[error("interface {0} is not attached to a radio")]
    NotAttached(IfaceId),

    /// No such work item (already completed or cancelled)
    #[error("unknown radio work {0}")]
    UnknownWork(WorkId),
}

/// Station operations that are invalid in the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StationError {
    /// Operation not valid in this state
    #[error("invalid state: cannot {operation} in {state:?}")]
    InvalidState {
        /// Current state
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// No such network profile
    #[error("unknown network {0}")]
    UnknownNetwork(ProfileId),

    /// No such interface
    #[error("unknown interface {0}")]
    UnknownInterface(IfaceId),

    /// Negotiation failed for an explicitly requested target
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Radio work scheduling failed
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_errors_are_never_transient() {
        for err in [
            NegotiationError::NoCommonCipher,
            NegotiationError::NoCommonAkm,
            NegotiationError::PmfUnavailable,
            NegotiationError::MalformedIe,
        ] {
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn station_error_wraps_lower_layers() {
        let err = StationError::from(NegotiationError::PmfUnavailable);
        assert_eq!(
            err.to_string(),
            "negotiation failed: protected management frames required but unavailable"
        );

        let err = StationError::from(SchedulerError::QueueFull {
            radio: "phy0".to_string(),
            capacity: 4,
        });
        assert_eq!(err.to_string(), "scheduler error: radio phy0 work queue full (4 items)");
    }

    #[test]
    fn invalid_state_names_operation() {
        let err = StationError::InvalidState {
            state: ConnectionState::InterfaceDisabled,
            operation: "connect",
        };
        assert_eq!(err.to_string(), "invalid state: cannot connect in InterfaceDisabled");
    }
}
