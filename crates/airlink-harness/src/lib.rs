//! Deterministic simulation harness for the airlink station core.
//!
//! This crate provides simulated implementations of the core's boundaries
//! (`Environment`, `Driver`, `KeyHandshake`, `BssCatalog`), a tokio event loop
//! that runs a `Supplicant` under Turmoil's virtual time, and a scenario
//! framework for reproducible connection tests with oracle verification.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event_loop;
pub mod scenario;
pub mod sim_catalog;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_handshake;

pub use event_loop::{EventLoop, LoopInput};
pub use sim_catalog::SimCatalog;
pub use sim_driver::{ApBehavior, DriverRequest, SimAp, SimDriver};
pub use sim_env::SimEnv;
pub use sim_handshake::SimHandshake;
