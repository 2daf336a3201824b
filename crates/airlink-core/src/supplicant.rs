//! Supplicant
//!
//! Owns every station, the radio work scheduler and the process-wide context.
//!
//! ## Architecture
//!
//! ```text
//! Event loop
//!   ├─ Driver events / control commands / ticks
//!   └─ Supplicant ← THIS MODULE
//!       ├─ GlobalContext (TKIP countermeasures, daemon config)
//!       ├─ RadioScheduler (per-radio work queues)
//!       └─ Stations (one per interface, borrow Driver + KeyHandshake per call)
//! ```
//!
//! ## Responsibilities
//!
//! 1. **Interface lifecycle**: attach stations to radios and detach them
//! 2. **Work routing**: apply station work requests to the scheduler and hand
//!    start/cancel events back to the owning station
//! 3. **Action generation**: return notifications and flush requests for the
//!    event loop to execute (Sans-IO)
//!
//! Radio works queued by listeners outside the station (P2P, GAS, DPP) go
//! through the same scheduler and surface as
//! [`SupplicantAction::ExternalWorkStarted`].

use std::{
    collections::{BTreeMap, VecDeque},
    time::Instant,
};

use crate::{
    bss::BssCatalog,
    config::{GlobalConfig, GlobalContext, StationConfig},
    control::{ControlCommand, ControlReply, Notification},
    driver::{Driver, DriverEvent, KeyHandshake},
    env::Environment,
    error::StationError,
    profile::NetworkProfile,
    radio::{CancelScope, RadioScheduler, WorkEvent, WorkId, WorkKind},
    station::{Station, StationAction, StationIo, WorkContext},
    IfaceId,
};

/// Actions returned by the supplicant for the event loop to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplicantAction {
    /// Forward a notification to control-interface listeners
    Notify {
        /// Interface the notification is about
        iface: IfaceId,
        /// The notification
        notification: Notification,
    },
    /// Drop cached BSS data of an interface
    FlushBss {
        /// Interface to flush
        iface: IfaceId,
    },
    /// An external work now owns the radio; the listener must complete it
    ExternalWorkStarted {
        /// Work identifier
        id: WorkId,
        /// Owning interface
        iface: IfaceId,
        /// Work kind
        kind: WorkKind,
    },
    /// An external work was cancelled
    ExternalWorkCancelled {
        /// Work identifier
        id: WorkId,
        /// Owning interface
        iface: IfaceId,
        /// Work kind
        kind: WorkKind,
    },
}

enum Pending {
    Station(IfaceId, StationAction),
    Work(WorkEvent<WorkContext>),
}

/// All stations of the daemon plus the state they share.
pub struct Supplicant<E, D, H> {
    env: E,
    driver: D,
    handshake: H,
    global: GlobalContext,
    scheduler: RadioScheduler<WorkContext>,
    stations: BTreeMap<IfaceId, Station>,
}

impl<E, D, H> Supplicant<E, D, H>
where
    E: Environment,
    D: Driver,
    H: KeyHandshake,
{
    /// Create a supplicant with no interfaces.
    pub fn new(env: E, driver: D, handshake: H, config: GlobalConfig) -> Self {
        let scheduler = RadioScheduler::new(config.max_queued_works);
        Self {
            env,
            driver,
            handshake,
            global: GlobalContext::new(config),
            scheduler,
            stations: BTreeMap::new(),
        }
    }

    /// Environment
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable driver (simulation control)
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Key handshake subsystem
    pub fn handshake(&self) -> &H {
        &self.handshake
    }

    /// Mutable key handshake subsystem (simulation control)
    pub fn handshake_mut(&mut self) -> &mut H {
        &mut self.handshake
    }

    /// Process-wide context
    pub fn global(&self) -> &GlobalContext {
        &self.global
    }

    /// Radio work scheduler
    pub fn scheduler(&self) -> &RadioScheduler<WorkContext> {
        &self.scheduler
    }

    /// Station of `iface`
    pub fn station(&self, iface: IfaceId) -> Option<&Station> {
        self.stations.get(&iface)
    }

    /// Interfaces in id order
    pub fn interfaces(&self) -> impl Iterator<Item = IfaceId> + '_ {
        self.stations.keys().copied()
    }

    /// Attach a station for `iface` on radio `radio`.
    ///
    /// Interfaces naming the same radio share its work queue.
    pub fn add_interface(
        &mut self,
        iface: IfaceId,
        radio: &str,
        config: StationConfig,
        enabled: bool,
    ) {
        let caps = self.driver.capabilities(iface);
        self.scheduler.attach(iface, radio, caps.radio_caps());
        self.stations.insert(iface, Station::new(iface, config, &caps, enabled));
        tracing::info!(iface = %iface, radio, enabled, "interface added");
    }

    /// Remove a station. Its works are cancelled; works of other interfaces
    /// on the same radio may start as a result.
    ///
    /// # Errors
    ///
    /// `UnknownInterface` if `iface` has no station.
    pub fn remove_interface(
        &mut self,
        iface: IfaceId,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        self.stations.remove(&iface).ok_or(StationError::UnknownInterface(iface))?;
        let events = self.scheduler.detach(iface, now);
        tracing::info!(iface = %iface, "interface removed");
        self.run(events.into_iter().map(Pending::Work).collect(), now)
    }

    /// Add or replace a network profile of `iface`.
    ///
    /// # Errors
    ///
    /// `UnknownInterface` if `iface` has no station.
    pub fn add_network(
        &mut self,
        iface: IfaceId,
        profile: NetworkProfile,
    ) -> Result<(), StationError> {
        let station = self.stations.get_mut(&iface).ok_or(StationError::UnknownInterface(iface))?;
        tracing::debug!(
            iface = %iface,
            network = %profile.id,
            ssid = %profile.ssid,
            "network added"
        );
        station.add_network(profile);
        Ok(())
    }

    /// Execute a control command.
    ///
    /// # Errors
    ///
    /// `UnknownInterface`, or whatever the station rejects the command with.
    pub fn handle_command<B: BssCatalog + ?Sized>(
        &mut self,
        iface: IfaceId,
        command: ControlCommand,
        catalog: &B,
        now: Instant,
    ) -> Result<(ControlReply, Vec<SupplicantAction>), StationError> {
        let station = self.stations.get_mut(&iface).ok_or(StationError::UnknownInterface(iface))?;
        let mut io = StationIo {
            env: &self.env,
            driver: &mut self.driver,
            handshake: &mut self.handshake,
            global: &mut self.global,
        };
        tracing::debug!(iface = %iface, ?command, "control command");

        let (reply, actions) = match command {
            ControlCommand::Status => (station.status(), Vec::new()),
            ControlCommand::Connect { network } => {
                (ControlReply::Ok, station.select_network(network, catalog, &mut io, now)?)
            },
            ControlCommand::Disconnect => (ControlReply::Ok, station.request_disconnect(&mut io)?),
            ControlCommand::Reassociate => {
                (ControlReply::Ok, station.reassociate(catalog, &mut io, now)?)
            },
            ControlCommand::EnableNetwork(id) => {
                (ControlReply::Ok, station.enable_network(id, catalog, &mut io, now)?)
            },
            ControlCommand::DisableNetwork(id) => {
                (ControlReply::Ok, station.disable_network(id, catalog, &mut io, now)?)
            },
        };

        let out = self.run(Self::from_station(iface, actions), now)?;
        Ok((reply, out))
    }

    /// Process a driver event for `iface`.
    ///
    /// # Errors
    ///
    /// `UnknownInterface` if `iface` has no station.
    pub fn handle_event<B: BssCatalog + ?Sized>(
        &mut self,
        iface: IfaceId,
        event: DriverEvent,
        catalog: &B,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        let station = self.stations.get_mut(&iface).ok_or(StationError::UnknownInterface(iface))?;
        let mut io = StationIo {
            env: &self.env,
            driver: &mut self.driver,
            handshake: &mut self.handshake,
            global: &mut self.global,
        };
        let actions = station.handle_event(event, catalog, &mut io, now)?;
        self.run(Self::from_station(iface, actions), now)
    }

    /// Fire due deadlines of every station.
    ///
    /// # Errors
    ///
    /// Propagates station errors.
    pub fn tick<B: BssCatalog + ?Sized>(
        &mut self,
        catalog: &B,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        let mut pending = VecDeque::new();
        for (iface, station) in &mut self.stations {
            let mut io = StationIo {
                env: &self.env,
                driver: &mut self.driver,
                handshake: &mut self.handshake,
                global: &mut self.global,
            };
            let actions = station.tick(catalog, &mut io, now)?;
            pending.extend(actions.into_iter().map(|action| Pending::Station(*iface, action)));
        }
        self.run(pending, now)
    }

    /// Earliest deadline across all stations
    pub fn next_deadline(&self) -> Option<Instant> {
        self.stations.values().filter_map(Station::next_deadline).min()
    }

    /// Queue a radio work for a listener outside the station.
    ///
    /// # Errors
    ///
    /// `Scheduler` when the interface is not attached or the queue is full.
    pub fn submit_external_work(
        &mut self,
        iface: IfaceId,
        kind: WorkKind,
        freq: u32,
        next: bool,
        label: impl Into<String>,
        now: Instant,
    ) -> Result<(WorkId, Vec<SupplicantAction>), StationError> {
        let ctx = WorkContext::External { label: label.into() };
        let (id, events) = self.scheduler.submit(iface, kind, freq, next, ctx, now)?;
        let out = self.run(events.into_iter().map(Pending::Work).collect(), now)?;
        Ok((id, out))
    }

    /// Complete an external work.
    ///
    /// # Errors
    ///
    /// `Scheduler` when the work is unknown (already done or cancelled).
    pub fn complete_external_work(
        &mut self,
        id: WorkId,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        let (_ctx, events) = self.scheduler.complete(id, now)?;
        self.run(events.into_iter().map(Pending::Work).collect(), now)
    }

    /// Cancel an external work.
    ///
    /// # Errors
    ///
    /// `Scheduler` when the work is unknown.
    pub fn cancel_external_work(
        &mut self,
        id: WorkId,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        let events = self.scheduler.cancel(id, now)?;
        self.run(events.into_iter().map(Pending::Work).collect(), now)
    }

    /// Mark a scan triggered outside the station as running on `radio`.
    ///
    /// # Errors
    ///
    /// Propagates station errors from works started once the scan ends.
    pub fn set_external_scan(
        &mut self,
        radio: &str,
        running: bool,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        let events = self.scheduler.set_external_scan(radio, running, now);
        self.run(events.into_iter().map(Pending::Work).collect(), now)
    }

    fn from_station(iface: IfaceId, actions: Vec<StationAction>) -> VecDeque<Pending> {
        actions.into_iter().map(|action| Pending::Station(iface, action)).collect()
    }

    /// Apply station actions and route scheduler events until both run dry.
    fn run(
        &mut self,
        mut pending: VecDeque<Pending>,
        now: Instant,
    ) -> Result<Vec<SupplicantAction>, StationError> {
        let mut out = Vec::new();

        while let Some(item) = pending.pop_front() {
            match item {
                Pending::Station(iface, StationAction::SubmitWork { kind, freq, next, ctx }) => {
                    match self.scheduler.submit(iface, kind, freq, next, ctx, now) {
                        Ok((id, events)) => {
                            if let Some(station) = self.stations.get_mut(&iface) {
                                station.on_work_queued(kind, id);
                            }
                            pending.extend(events.into_iter().map(Pending::Work));
                        },
                        Err(err) => {
                            tracing::warn!(
                                iface = %iface,
                                kind = %kind,
                                error = %err,
                                "work not queued"
                            );
                            if let Some(station) = self.stations.get_mut(&iface) {
                                let actions = station.on_work_rejected(kind, now);
                                pending.extend(
                                    actions
                                        .into_iter()
                                        .map(|action| Pending::Station(iface, action)),
                                );
                            }
                        },
                    }
                },
                Pending::Station(iface, StationAction::CompleteWork(id)) => {
                    match self.scheduler.complete(id, now) {
                        Ok((_ctx, events)) => pending.extend(events.into_iter().map(Pending::Work)),
                        Err(err) => {
                            tracing::debug!(iface = %iface, error = %err, "work already gone");
                        },
                    }
                },
                Pending::Station(iface, StationAction::CancelWork { kind }) => {
                    let events =
                        self.scheduler.cancel_all(iface, kind, CancelScope::Interface, now);
                    pending.extend(events.into_iter().map(Pending::Work));
                },
                Pending::Station(iface, StationAction::Notify(notification)) => {
                    out.push(SupplicantAction::Notify { iface, notification });
                },
                Pending::Station(iface, StationAction::FlushBss) => {
                    out.push(SupplicantAction::FlushBss { iface });
                },
                Pending::Work(WorkEvent::Start { id, iface, kind }) => {
                    let Some(ctx) = self.scheduler.work(id).map(|work| work.ctx().clone()) else {
                        continue;
                    };
                    if let WorkContext::External { .. } = ctx {
                        out.push(SupplicantAction::ExternalWorkStarted { id, iface, kind });
                        continue;
                    }

                    let Some(station) = self.stations.get_mut(&iface) else {
                        pending.push_back(Pending::Station(iface, StationAction::CompleteWork(id)));
                        continue;
                    };
                    let mut io = StationIo {
                        env: &self.env,
                        driver: &mut self.driver,
                        handshake: &mut self.handshake,
                        global: &mut self.global,
                    };
                    let actions = station.on_work_started(id, &ctx, &mut io, now)?;
                    pending
                        .extend(actions.into_iter().map(|action| Pending::Station(iface, action)));
                },
                Pending::Work(WorkEvent::Cancel { id, iface, kind, ctx, .. }) => {
                    if let WorkContext::External { .. } = ctx {
                        out.push(SupplicantAction::ExternalWorkCancelled { id, iface, kind });
                    } else if let Some(station) = self.stations.get_mut(&iface) {
                        station.on_work_cancelled(id);
                    }
                },
            }
        }

        Ok(out)
    }
}
