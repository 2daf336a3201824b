//! airlink station core
//!
//! This crate contains the pure state machine logic of a Wi-Fi client station:
//! network selection, security negotiation, the connection state machine,
//! radio work scheduling and failure handling. It is completely decoupled from
//! I/O, enabling deterministic testing.
//!
//! # Architecture: "The Hollow Shell"
//!
//! Station logic is strictly separated from the driver and the clock:
//!
//! ```text
//!      ┌──────────────────────────────┐
//!      │ airlink-core                 │
//!      │ - Station state machines     │
//!      │ - Security negotiation       │
//!      │ - Radio work scheduling      │
//!      │ - Failure policy             │
//!      └──────────────────────────────┘
//!         ↓                      ↓
//! ┌──────────────────┐  ┌──────────────────┐
//! │ airlink-harness  │  │ real daemon      │
//! │ (Turmoil)        │  │ (nl80211/Tokio)  │
//! │ - Virtual time   │  │ - Real driver    │
//! │ - Seeded RNG     │  │ - System clock   │
//! │ - Simulated APs  │  │                  │
//! └──────────────────┘  └──────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - No I/O in Core: never call `std::time::Instant::now()` or a random
//!   number generator directly
//! - Environment Trait: time and randomness go through [`env::Environment`];
//!   the driver and key handshake are traits borrowed per call
//! - Deterministic: given the same inputs and environment state, produce the
//!   same outputs
//!
//! # Modules
//!
//! - [`supplicant`]: owner of all stations, routes radio work
//! - [`station`]: per-interface connection state machine
//! - [`negotiate`]: security parameter negotiation
//! - [`radio`]: radio work scheduler shared by interfaces of one radio
//! - [`policy`]: backoff, BSSID ignore list and temporary disallow
//! - [`profile`]: configured networks
//! - [`bss`]: scan candidates and the catalog interface
//! - [`driver`]: driver and key handshake interfaces, driver events
//! - [`control`]: control commands, replies and notifications
//! - [`config`]: configuration and process-wide context
//! - [`env`]: environment abstraction (time, RNG)
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bss;
pub mod config;
pub mod control;
pub mod driver;
pub mod env;
pub mod error;
pub mod negotiate;
pub mod policy;
pub mod profile;
pub mod radio;
pub mod station;
pub mod supplicant;

pub use bss::{BssCatalog, CandidateBss, CandidateFilter};
pub use config::{GlobalConfig, GlobalContext, PolicyConfig, StationConfig};
pub use control::{ControlCommand, ControlReply, Notification};
pub use driver::{
    Driver, DriverCapabilities, DriverEvent, DriverFlags, HandshakeProgress, KeyHandshake,
};
pub use env::Environment;
pub use error::{DriverError, NegotiationError, SchedulerError, StationError};
pub use negotiate::{NegotiatedParams, Negotiator, negotiate};
pub use profile::{Credential, NetworkProfile, ProfileId};
pub use radio::{IfaceId, RadioScheduler, WorkId, WorkKind};
pub use station::{ConnectionState, Station, StationAction, StationIo, WorkContext};
pub use supplicant::{Supplicant, SupplicantAction};
