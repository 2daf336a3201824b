//! Oracle functions for scenario verification.
//!
//! Oracle functions run at the end of scenarios to verify global consistency.
//! They receive the final world state and check invariants.

use std::time::Duration;

use airlink_core::{ConnectionState, IfaceId, Notification};
use airlink_proto::MacAddr;

use crate::scenario::World;

/// Oracle function type.
///
/// Receives immutable reference to world state and returns:
/// - `Ok(())` if all invariants hold
/// - `Err(message)` if verification fails
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;

/// `iface` ends in `state`.
pub fn in_state(iface: IfaceId, state: ConnectionState) -> OracleFn {
    Box::new(move |world| {
        let actual = world.state(iface);
        if actual == state {
            Ok(())
        } else {
            Err(format!("{iface}: expected {state:?}, found {actual:?}"))
        }
    })
}

/// `iface` ends connected to `bssid`.
pub fn connected_to(iface: IfaceId, bssid: MacAddr) -> OracleFn {
    Box::new(move |world| {
        let last = world
            .notifications(iface)
            .filter_map(|n| match n {
                Notification::Connected { bssid, .. } => Some(*bssid),
                _ => None,
            })
            .last();
        match (world.state(iface), last) {
            (ConnectionState::Completed, Some(found)) if found == bssid => Ok(()),
            (state, found) => Err(format!(
                "{iface}: expected completed with {bssid}, found {state:?} / {found:?}"
            )),
        }
    })
}

/// `iface` never completed a connection.
pub fn never_connected(iface: IfaceId) -> OracleFn {
    Box::new(move |world| match world.connections(iface) {
        0 => Ok(()),
        n => Err(format!("{iface}: expected no connection, found {n}")),
    })
}

/// The temporary disables announced on `iface` have exactly these durations.
pub fn temp_disables(iface: IfaceId, expected: Vec<Duration>) -> OracleFn {
    Box::new(move |world| {
        let actual = world.temp_disables(iface);
        if actual == expected {
            Ok(())
        } else {
            Err(format!("{iface}: temp disables {actual:?}, expected {expected:?}"))
        }
    })
}

/// Some notification on `iface` satisfies `pred`.
pub fn notified(
    iface: IfaceId,
    what: &'static str,
    pred: impl Fn(&Notification) -> bool + 'static,
) -> OracleFn {
    Box::new(move |world| {
        if world.notifications(iface).any(pred) {
            Ok(())
        } else {
            Err(format!("{iface}: no {what} notification"))
        }
    })
}

/// Nothing is queued or running on `radio`.
pub fn radio_idle(radio: &'static str) -> OracleFn {
    Box::new(move |world| {
        let works = world.supplicant().scheduler().queue_len(radio);
        if works == 0 { Ok(()) } else { Err(format!("radio {radio}: {works} works pending")) }
    })
}

/// Combine multiple oracles into one.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| {
        for oracle in oracles {
            oracle(world)?;
        }
        Ok(())
    })
}
