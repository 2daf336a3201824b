//! Scenario testing framework for deterministic simulation tests.
//!
//! This module provides a declarative API for writing station scenarios that
//! follow the Oracle Pattern. Scenarios drive a supplicant through simulated
//! APs under virtual time, deliver every driver event the steps cause, and
//! enforce oracle verification at the end.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use oracle::OracleFn;
pub use world::{Record, SimSupplicant, World};
