//! Scenario builder API.
//!
//! Provides a declarative API for constructing station scenarios that enforce
//! the Oracle Pattern: describe the radio environment, the interfaces and
//! their networks, script the steps, and finish with an oracle.

use std::time::Duration;

use airlink_core::{
    ControlCommand, DriverCapabilities, DriverEvent, GlobalConfig, IfaceId, NetworkProfile,
    ProfileId, StationConfig, WorkId, WorkKind,
};
use airlink_proto::{MacAddr, ReasonCode};

use crate::{
    ApBehavior, SimAp, SimDriver, SimEnv,
    scenario::{OracleFn, World},
};

/// One scripted step.
#[derive(Debug, Clone)]
enum Step {
    Command(IfaceId, ControlCommand),
    Event(IfaceId, DriverEvent),
    Advance(Duration),
    SetBehavior(MacAddr, ApBehavior),
    SetInRange(MacAddr, bool),
    Kick(IfaceId, ReasonCode),
    FailScans(u32),
    QuietDeauth,
    SubmitExternal { iface: IfaceId, kind: WorkKind, freq: u32, label: String },
    CompleteExternal(usize),
    RemoveInterface(IfaceId),
}

#[derive(Debug, Clone)]
struct Interface {
    iface: IfaceId,
    radio: String,
    config: StationConfig,
    enabled: bool,
}

/// Scenario builder.
///
/// Configure the simulated world, script steps, and add an oracle
/// verification function.
pub struct Scenario {
    seed: u64,
    global: GlobalConfig,
    caps: DriverCapabilities,
    aps: Vec<SimAp>,
    interfaces: Vec<Interface>,
    networks: Vec<(IfaceId, NetworkProfile)>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with default configuration and an empty world.
    pub fn new() -> Self {
        Self {
            seed: 0,
            global: GlobalConfig::default(),
            caps: DriverCapabilities::default(),
            aps: Vec::new(),
            interfaces: Vec::new(),
            networks: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Seed for the simulation RNG (backoff jitter).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Daemon-wide configuration.
    pub fn with_global_config(mut self, config: GlobalConfig) -> Self {
        self.global = config;
        self
    }

    /// Driver capabilities reported for every interface.
    pub fn with_capabilities(mut self, caps: DriverCapabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Add an AP to the radio environment.
    pub fn with_ap(mut self, ap: SimAp) -> Self {
        self.aps.push(ap);
        self
    }

    /// Add an enabled interface on `radio`.
    pub fn with_interface(self, iface: IfaceId, radio: &str, config: StationConfig) -> Self {
        self.with_interface_state(iface, radio, config, true)
    }

    /// Add an interface that starts enabled or disabled.
    pub fn with_interface_state(
        mut self,
        iface: IfaceId,
        radio: &str,
        config: StationConfig,
        enabled: bool,
    ) -> Self {
        self.interfaces.push(Interface { iface, radio: radio.to_string(), config, enabled });
        self
    }

    /// Configure a network on `iface`.
    pub fn with_network(mut self, iface: IfaceId, profile: NetworkProfile) -> Self {
        self.networks.push((iface, profile));
        self
    }

    /// Let `iface` pick a network and connect.
    pub fn connect(self, iface: IfaceId) -> Self {
        self.command(iface, ControlCommand::Connect { network: None })
    }

    /// Connect `iface` to one network only.
    pub fn select(self, iface: IfaceId, network: ProfileId) -> Self {
        self.command(iface, ControlCommand::Connect { network: Some(network) })
    }

    /// Issue a control command.
    pub fn command(mut self, iface: IfaceId, command: ControlCommand) -> Self {
        self.steps.push(Step::Command(iface, command));
        self
    }

    /// Deliver a driver event.
    pub fn inject(mut self, iface: IfaceId, event: DriverEvent) -> Self {
        self.steps.push(Step::Event(iface, event));
        self
    }

    /// Advance virtual time, firing timers on the way.
    pub fn advance(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Advance(duration));
        self
    }

    /// Change how an AP answers from now on.
    pub fn set_behavior(mut self, bssid: MacAddr, behavior: ApBehavior) -> Self {
        self.steps.push(Step::SetBehavior(bssid, behavior));
        self
    }

    /// Move an AP in or out of range.
    pub fn set_in_range(mut self, bssid: MacAddr, in_range: bool) -> Self {
        self.steps.push(Step::SetInRange(bssid, in_range));
        self
    }

    /// The AP drops `iface`.
    pub fn kick(mut self, iface: IfaceId, reason: ReasonCode) -> Self {
        self.steps.push(Step::Kick(iface, reason));
        self
    }

    /// Fail the next `count` scan requests.
    pub fn fail_scans(mut self, count: u32) -> Self {
        self.steps.push(Step::FailScans(count));
        self
    }

    /// From now on the driver does not report deauthentications of links that
    /// never formed.
    pub fn quiet_deauth(mut self) -> Self {
        self.steps.push(Step::QuietDeauth);
        self
    }

    /// Queue a radio work on behalf of an outside listener.
    ///
    /// External works are numbered in submission order for
    /// [`Scenario::complete_external`].
    pub fn submit_external(
        mut self,
        iface: IfaceId,
        kind: WorkKind,
        freq: u32,
        label: &str,
    ) -> Self {
        self.steps.push(Step::SubmitExternal { iface, kind, freq, label: label.to_string() });
        self
    }

    /// Complete the `index`-th submitted external work.
    pub fn complete_external(mut self, index: usize) -> Self {
        self.steps.push(Step::CompleteExternal(index));
        self
    }

    /// Detach an interface.
    pub fn remove_interface(mut self, iface: IfaceId) -> Self {
        self.steps.push(Step::RemoveInterface(iface));
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Builds the world, attaches interfaces and networks, runs every step in
    /// order (each step settles all driver traffic it causes), then invokes
    /// the oracle.
    pub fn run(self) -> Result<(), String> {
        let world = self.scenario.execute()?;
        (self.oracle)(&world)
    }
}

impl Scenario {
    fn execute(self) -> Result<World, String> {
        let mut driver = SimDriver::new(self.caps);
        for ap in self.aps {
            driver.add_ap(ap);
        }

        let mut world = World::new(SimEnv::with_seed(self.seed), driver, self.global);
        for interface in &self.interfaces {
            world.add_interface(
                interface.iface,
                &interface.radio,
                interface.config.clone(),
                interface.enabled,
            );
        }
        for (iface, profile) in self.networks {
            world.add_network(iface, profile)?;
        }

        let mut external: Vec<WorkId> = Vec::new();
        for step in self.steps {
            match step {
                Step::Command(iface, command) => {
                    world.command(iface, command)?;
                },
                Step::Event(iface, event) => world.inject(iface, event)?,
                Step::Advance(duration) => world.advance(duration)?,
                Step::SetBehavior(bssid, behavior) => {
                    world.driver_mut().set_behavior(bssid, behavior);
                },
                Step::SetInRange(bssid, in_range) => {
                    world.driver_mut().set_in_range(bssid, in_range);
                },
                Step::Kick(iface, reason) => {
                    if !world.driver_mut().kick(iface, reason) {
                        return Err(format!("kick: {iface} is not associated"));
                    }
                    world.advance(Duration::ZERO)?;
                },
                Step::FailScans(count) => world.driver_mut().fail_scans(count),
                Step::QuietDeauth => world.driver_mut().quiet_deauth(true),
                Step::SubmitExternal { iface, kind, freq, label } => {
                    external.push(world.submit_external(iface, kind, freq, &label)?);
                },
                Step::CompleteExternal(index) => {
                    let id = *external
                        .get(index)
                        .ok_or_else(|| format!("no external work #{index}"))?;
                    world.complete_external(id)?;
                },
                Step::RemoveInterface(iface) => world.remove_interface(iface)?,
            }
        }

        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use airlink_core::{CandidateBss, ConnectionState};

    use super::*;

    #[test]
    fn scenario_requires_oracle() {
        // This should compile - oracle provided
        let _scenario = Scenario::new().oracle(Box::new(|_world| Ok(())));
    }

    #[test]
    fn scenario_attaches_interfaces() {
        let scenario = Scenario::new()
            .with_interface(IfaceId(0), "phy0", StationConfig::default())
            .with_interface_state(IfaceId(1), "phy0", StationConfig::default(), false)
            .oracle(Box::new(|world| {
                assert_eq!(world.state(IfaceId(0)), ConnectionState::Disconnected);
                assert_eq!(world.state(IfaceId(1)), ConnectionState::InterfaceDisabled);
                Ok(())
            }));

        scenario.run().expect("scenario should succeed");
    }

    #[test]
    fn kick_without_association_is_a_scenario_error() {
        let ap = SimAp::open(CandidateBss::new(MacAddr([0x02, 0, 0, 0, 0, 1]), "cafe", 2412));
        let result = Scenario::new()
            .with_ap(ap)
            .with_interface(IfaceId(0), "phy0", StationConfig::default())
            .kick(IfaceId(0), ReasonCode::UNSPECIFIED)
            .oracle(Box::new(|_| Ok(())))
            .run();

        assert!(result.is_err());
    }
}
