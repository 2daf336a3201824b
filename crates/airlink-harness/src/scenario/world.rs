//! World state for scenario execution.
//!
//! The World owns one supplicant wired to the simulated driver, handshake and
//! catalog, a virtual clock, and the log of everything the supplicant
//! announced. Scenario steps mutate it; oracles read it.

use std::time::{Duration, Instant};

use airlink_core::{
    ConnectionState, ControlCommand, ControlReply, DriverEvent, GlobalConfig, IfaceId,
    NetworkProfile, Notification, StationConfig, Supplicant, SupplicantAction, WorkId, WorkKind,
};

use crate::{SimCatalog, SimDriver, SimEnv, SimHandshake};

/// Upper bound on driver events and timer firings per step; a scenario that
/// exceeds it is stuck in a loop.
const MAX_STEPS: usize = 10_000;

/// Supplicant under simulation.
pub type SimSupplicant = Supplicant<SimEnv, SimDriver, SimHandshake>;

/// One notification with the virtual time it was emitted at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Time since the scenario started
    pub at: Duration,
    /// Interface
    pub iface: IfaceId,
    /// What was announced
    pub notification: Notification,
}

/// World state: the supplicant, its simulated surroundings and metrics.
pub struct World {
    supplicant: SimSupplicant,
    catalog: SimCatalog,
    start: Instant,
    now: Instant,
    records: Vec<Record>,
    flushes: usize,
    external: Vec<WorkId>,
}

impl World {
    /// Create a world around a driver already populated with APs.
    pub fn new(env: SimEnv, driver: SimDriver, config: GlobalConfig) -> Self {
        let start = Instant::now();
        Self {
            supplicant: Supplicant::new(env, driver, SimHandshake::new(), config),
            catalog: SimCatalog::new(),
            start,
            now: start,
            records: Vec::new(),
            flushes: 0,
            external: Vec::new(),
        }
    }

    /// The supplicant
    pub fn supplicant(&self) -> &SimSupplicant {
        &self.supplicant
    }

    /// Mutable supplicant, for steps the builder has no shortcut for
    pub fn supplicant_mut(&mut self) -> &mut SimSupplicant {
        &mut self.supplicant
    }

    /// The simulated driver
    pub fn driver(&self) -> &SimDriver {
        self.supplicant.driver()
    }

    /// The scan result catalog
    pub fn catalog(&self) -> &SimCatalog {
        &self.catalog
    }

    /// Current virtual time
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Virtual time elapsed since the scenario started
    pub fn elapsed(&self) -> Duration {
        self.now - self.start
    }

    /// Connection state of `iface`.
    ///
    /// Panics if `iface` was never added.
    pub fn state(&self, iface: IfaceId) -> ConnectionState {
        self.supplicant.station(iface).map(|station| station.state()).expect("unknown interface")
    }

    /// Every notification in emission order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Notifications of one interface
    pub fn notifications(&self, iface: IfaceId) -> impl Iterator<Item = &Notification> + '_ {
        self.records.iter().filter(move |r| r.iface == iface).map(|r| &r.notification)
    }

    /// Number of completed connections on `iface`
    pub fn connections(&self, iface: IfaceId) -> usize {
        self.notifications(iface).filter(|n| matches!(n, Notification::Connected { .. })).count()
    }

    /// Durations of every temporary disable announced on `iface`
    pub fn temp_disables(&self, iface: IfaceId) -> Vec<Duration> {
        self.notifications(iface)
            .filter_map(|n| match n {
                Notification::SsidTempDisabled { duration, .. } => Some(*duration),
                _ => None,
            })
            .collect()
    }

    /// BSS flushes executed
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// External works currently owning a radio
    pub fn external_works(&self) -> &[WorkId] {
        &self.external
    }

    pub(crate) fn add_interface(
        &mut self,
        iface: IfaceId,
        radio: &str,
        config: StationConfig,
        enabled: bool,
    ) {
        self.supplicant.add_interface(iface, radio, config, enabled);
    }

    pub(crate) fn add_network(
        &mut self,
        iface: IfaceId,
        profile: NetworkProfile,
    ) -> Result<(), String> {
        self.supplicant.add_network(iface, profile).map_err(|e| format!("add_network: {e}"))
    }

    /// Run a control command and settle the resulting driver traffic.
    pub(crate) fn command(
        &mut self,
        iface: IfaceId,
        command: ControlCommand,
    ) -> Result<ControlReply, String> {
        let (reply, actions) = self
            .supplicant
            .handle_command(iface, command, &self.catalog, self.now)
            .map_err(|e| format!("{command:?} on {iface} failed: {e}"))?;
        self.apply(actions);
        self.settle()?;
        Ok(reply)
    }

    /// Queue a driver event and settle.
    pub(crate) fn inject(&mut self, iface: IfaceId, event: DriverEvent) -> Result<(), String> {
        self.supplicant.driver_mut().inject(iface, event);
        self.settle()
    }

    pub(crate) fn driver_mut(&mut self) -> &mut SimDriver {
        self.supplicant.driver_mut()
    }

    /// Queue a radio work for an outside listener.
    pub(crate) fn submit_external(
        &mut self,
        iface: IfaceId,
        kind: WorkKind,
        freq: u32,
        label: &str,
    ) -> Result<WorkId, String> {
        let (id, actions) = self
            .supplicant
            .submit_external_work(iface, kind, freq, false, label, self.now)
            .map_err(|e| format!("submit external work: {e}"))?;
        self.apply(actions);
        self.settle()?;
        Ok(id)
    }

    /// Finish an external work.
    pub(crate) fn complete_external(&mut self, id: WorkId) -> Result<(), String> {
        let actions = self
            .supplicant
            .complete_external_work(id, self.now)
            .map_err(|e| format!("complete external work: {e}"))?;
        self.external.retain(|&work| work != id);
        self.apply(actions);
        self.settle()
    }

    /// Detach an interface and settle.
    pub(crate) fn remove_interface(&mut self, iface: IfaceId) -> Result<(), String> {
        let actions = self
            .supplicant
            .remove_interface(iface, self.now)
            .map_err(|e| format!("remove_interface: {e}"))?;
        self.apply(actions);
        self.settle()
    }

    /// Advance virtual time by `duration`, firing every deadline on the way.
    pub(crate) fn advance(&mut self, duration: Duration) -> Result<(), String> {
        let target = self.now + duration;
        self.settle()?;

        for _ in 0..MAX_STEPS {
            match self.supplicant.next_deadline() {
                Some(at) if at <= target => {
                    self.now = self.now.max(at);
                    self.tick()?;
                    self.settle()?;
                },
                _ => {
                    self.now = target;
                    self.tick()?;
                    return self.settle();
                },
            }
        }
        Err(format!("timers still firing after {MAX_STEPS} steps at {:?}", self.elapsed()))
    }

    fn tick(&mut self) -> Result<(), String> {
        let actions = self
            .supplicant
            .tick(&self.catalog, self.now)
            .map_err(|e| format!("tick failed: {e}"))?;
        self.apply(actions);
        Ok(())
    }

    /// Deliver queued driver events until the driver goes quiet.
    fn settle(&mut self) -> Result<(), String> {
        for _ in 0..MAX_STEPS {
            let events = self.supplicant.driver_mut().take_events();
            if events.is_empty() {
                return Ok(());
            }
            for (iface, event) in events {
                if event == DriverEvent::ScanResults {
                    let visible = self.supplicant.driver().visible();
                    self.catalog.store(iface, visible);
                }
                let actions = self
                    .supplicant
                    .handle_event(iface, event, &self.catalog, self.now)
                    .map_err(|e| format!("event on {iface} failed: {e}"))?;
                self.apply(actions);
            }
        }
        Err(format!("driver still busy after {MAX_STEPS} rounds"))
    }

    fn apply(&mut self, actions: Vec<SupplicantAction>) {
        let at = self.elapsed();
        for action in actions {
            match action {
                SupplicantAction::Notify { iface, notification } => {
                    self.records.push(Record { at, iface, notification });
                },
                SupplicantAction::FlushBss { iface } => {
                    self.catalog.flush(iface);
                    self.flushes += 1;
                },
                SupplicantAction::ExternalWorkStarted { id, .. } => self.external.push(id),
                SupplicantAction::ExternalWorkCancelled { id, .. } => {
                    self.external.retain(|&work| work != id);
                },
            }
        }
    }
}
