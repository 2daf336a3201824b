//! Per-interface connection state machine.
//!
//! # Architecture: Action-Based State Machine
//!
//! Like every state machine in this crate, [`Station`]:
//! - takes time as a parameter (`now: Instant`) and never reads a clock
//! - returns `Result<Vec<StationAction>, StationError>`
//! - borrows its side-effecting collaborators per call through [`StationIo`]
//!
//! Radio work is requested through actions. The owner queues it on the radio
//! scheduler and reports back with [`Station::on_work_queued`],
//! [`Station::on_work_started`] and [`Station::on_work_cancelled`].
//!
//! # State Machine
//!
//! ```text
//!                    connect request
//!  ┌──────────────┐ (no candidate)  ┌──────────┐ scan results
//!  │ Disconnected │────────────────>│ Scanning │──────────────┐
//!  └──────────────┘                 └──────────┘              │
//!     ▲      │ connect request (candidate)                    │
//!     │      └──────────────┬─────────────────────────────────┘
//!     │                     ↓ connect work started
//!     │           ┌────────────────┐ SME ┌─────────────┐
//!     │ failure / │ Authenticating │────>│ Associating │
//!     │ timeout   └────────────────┘     └─────────────┘
//!     │                                        │ associated
//!     │                                        ↓
//!     │  ┌───────────┐ EAPOL ┌──────────────────┐     ┌─────────────────┐
//!     └──│ Associated│──────>│ FourWayHandshake │────>│ GroupHandshake  │
//!        └───────────┘       └──────────────────┘     └─────────────────┘
//!              │ open network          │ no group handshake     │
//!              ↓                       ↓                        ↓
//!        ┌─────────────────────────────────────────────────────────┐
//!        │                        Completed                        │
//!        └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Inactive (nothing to connect to, or operator disconnect) and
//! InterfaceDisabled (interface down) are the other not-trying states.
//!
//! # Timers
//!
//! - Association: 60 s for a fresh attempt, 5 s after a failure, 10 s in
//!   scan-iterate mode. Armed when the connect work starts, cleared on
//!   association or teardown.
//! - Handshake: 10 s from association to Completed.
//! - Reconnect: backoff delay chosen by the failure policy.
//! - BSS flush: cached scan data is dropped 10 s after the interface goes down.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use airlink_proto::{MacAddr, ReasonCode, StatusCode};

use crate::{
    bss::{BssCatalog, CandidateBss, CandidateFilter},
    config::{GlobalContext, StationConfig},
    control::{ControlReply, Notification},
    driver::{Driver, DriverCapabilities, DriverEvent, DriverFlags, HandshakeProgress, KeyHandshake},
    env::Environment,
    error::StationError,
    negotiate::{NegotiatedParams, Negotiator},
    policy::{reconnect_delay, DisableReason, FailurePolicy},
    profile::{NetworkProfile, ProfileId},
    radio::{WorkId, WorkKind, WorkPayload},
    IfaceId,
};

/// Connection state, totally ordered from "idle" to "connected".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    /// Not connected, may reconnect on its own
    Disconnected,
    /// Nothing to do (no usable network or operator disconnect)
    Inactive,
    /// Interface is down
    InterfaceDisabled,
    /// Looking for a network
    Scanning,
    /// Authenticating with the target (SME drivers)
    Authenticating,
    /// Associating with the target
    Associating,
    /// Associated, key handshake not started
    Associated,
    /// 4-way handshake in progress
    FourWayHandshake,
    /// Group key handshake in progress
    GroupHandshake,
    /// Connection fully established
    Completed,
}

impl ConnectionState {
    /// Control-interface name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Inactive => "INACTIVE",
            Self::InterfaceDisabled => "INTERFACE_DISABLED",
            Self::Scanning => "SCANNING",
            Self::Authenticating => "AUTHENTICATING",
            Self::Associating => "ASSOCIATING",
            Self::Associated => "ASSOCIATED",
            Self::FourWayHandshake => "4WAY_HANDSHAKE",
            Self::GroupHandshake => "GROUP_HANDSHAKE",
            Self::Completed => "COMPLETED",
        }
    }

    /// True while the station is actively scanning or connecting.
    pub fn is_trying(self) -> bool {
        self >= Self::Scanning
    }
}

/// Connect target chosen by selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Network
    pub profile: ProfileId,
    /// Target BSS
    pub target: CandidateBss,
    /// Negotiated parameters
    pub params: NegotiatedParams,
    /// Channels of other BSSes of the same network
    pub alternatives: Vec<u32>,
}

/// Context of a radio work queued by a station (or an external listener).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkContext {
    /// Station scan
    Scan {
        /// Channels to scan (empty = all)
        freqs: Vec<u32>,
    },
    /// Station connect
    Connect(Box<ConnectRequest>),
    /// Work owned by a listener outside the station (P2P, GAS, DPP)
    External {
        /// Free-form label for logs
        label: String,
    },
}

impl WorkPayload for WorkContext {
    fn freqs(&self) -> &[u32] {
        match self {
            Self::Scan { freqs } => freqs,
            Self::Connect(_) | Self::External { .. } => &[],
        }
    }
}

/// Actions returned by the station state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationAction {
    /// Queue a radio work
    SubmitWork {
        /// Work kind
        kind: WorkKind,
        /// Frequency hint (0 = none)
        freq: u32,
        /// Queue at the head
        next: bool,
        /// Work context
        ctx: WorkContext,
    },
    /// A started work is done
    CompleteWork(WorkId),
    /// Cancel this interface's works (all kinds when `None`)
    CancelWork {
        /// Kind filter
        kind: Option<WorkKind>,
    },
    /// Forward to the control front end
    Notify(Notification),
    /// Drop cached BSS data for this interface
    FlushBss,
}

/// Collaborators a station borrows for one call.
pub struct StationIo<'a, E, D, H> {
    /// Randomness for backoff jitter
    pub env: &'a E,
    /// Driver requests
    pub driver: &'a mut D,
    /// Key handshake subsystem
    pub handshake: &'a mut H,
    /// Process-wide context
    pub global: &'a mut GlobalContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkSlot {
    Idle,
    Requested,
    Queued(WorkId),
    Started(WorkId),
}

impl WorkSlot {
    fn is_idle(self) -> bool {
        self == Self::Idle
    }

    /// True if a start for `id` belongs to this slot.
    fn accepts(self, id: WorkId) -> bool {
        match self {
            Self::Requested => true,
            Self::Queued(queued) => queued == id,
            Self::Idle | Self::Started(_) => false,
        }
    }

    fn holds(self, id: WorkId) -> bool {
        matches!(self, Self::Queued(held) | Self::Started(held) if held == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Connection,
    Auth(DisableReason),
}

/// Connection state machine of one interface.
#[derive(Debug)]
pub struct Station {
    iface: IfaceId,
    config: StationConfig,
    flags: DriverFlags,
    negotiator: Negotiator,
    state: ConnectionState,
    profiles: BTreeMap<ProfileId, NetworkProfile>,
    selected: Option<ProfileId>,
    policy: FailurePolicy,
    scan_work: WorkSlot,
    connect_work: WorkSlot,
    current: Option<ConnectRequest>,
    /// One-shot: a locally generated disconnect from this BSS was caused by
    /// us. Cleared by the next association since drivers may never report it.
    own_request: Option<MacAddr>,
    operator_disconnected: bool,
    prior_failure: bool,
    rescan_freqs: Vec<u32>,
    assoc_deadline: Option<Instant>,
    handshake_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    flush_at: Option<Instant>,
    completed_at: Option<Instant>,
    link_loss: Option<(MacAddr, u32)>,
}

impl Station {
    /// Create a station for `iface`. A station on a down interface starts in
    /// [`ConnectionState::InterfaceDisabled`].
    pub fn new(
        iface: IfaceId,
        config: StationConfig,
        caps: &DriverCapabilities,
        enabled: bool,
    ) -> Self {
        let policy = FailurePolicy::new(config.policy.clone());
        Self {
            iface,
            config,
            flags: caps.flags,
            negotiator: Negotiator::new(caps),
            state: if enabled {
                ConnectionState::Disconnected
            } else {
                ConnectionState::InterfaceDisabled
            },
            profiles: BTreeMap::new(),
            selected: None,
            policy,
            scan_work: WorkSlot::Idle,
            connect_work: WorkSlot::Idle,
            current: None,
            own_request: None,
            operator_disconnected: false,
            prior_failure: false,
            rescan_freqs: Vec::new(),
            assoc_deadline: None,
            handshake_deadline: None,
            reconnect_at: None,
            flush_at: None,
            completed_at: None,
            link_loss: None,
        }
    }

    /// Interface this station drives
    pub fn iface(&self) -> IfaceId {
        self.iface
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current (or in-progress) connection
    pub fn current(&self) -> Option<&ConnectRequest> {
        self.current.as_ref()
    }

    /// Failure policy state
    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    /// Add or replace a network profile
    pub fn add_network(&mut self, profile: NetworkProfile) {
        self.profiles.insert(profile.id, profile);
    }

    /// Look up a network profile
    pub fn network(&self, id: ProfileId) -> Option<&NetworkProfile> {
        self.profiles.get(&id)
    }

    /// All network profiles in id order
    pub fn networks(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.values()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.assoc_deadline,
            self.handshake_deadline,
            self.reconnect_at,
            self.flush_at,
            self.policy.disallow_list().next_expiry(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn connect_kind(&self) -> WorkKind {
        if self.flags.contains(DriverFlags::SME) { WorkKind::SmeConnect } else { WorkKind::Connect }
    }

    fn is_target(&self, bssid: MacAddr) -> bool {
        self.current.as_ref().is_some_and(|req| req.target.bssid == bssid)
    }

    fn set_state(&mut self, new: ConnectionState, actions: &mut Vec<StationAction>) {
        if self.state == new {
            return;
        }
        tracing::debug!(iface = %self.iface, from = ?self.state, to = ?new, "state change");
        self.state = new;

        let (id, bssid, ssid) = match &self.current {
            Some(req) => (Some(req.profile), req.target.bssid, req.target.ssid.clone()),
            None => (None, MacAddr::ZERO, String::new()),
        };
        actions.push(StationAction::Notify(Notification::StateChange {
            id,
            state: new,
            bssid,
            ssid,
        }));
    }

    /// Status reply for the control front end
    pub fn status(&self) -> ControlReply {
        ControlReply::Status {
            state: self.state,
            bssid: self.current.as_ref().map(|req| req.target.bssid),
            ssid: self.current.as_ref().map(|req| req.target.ssid.clone()),
            key_mgmt: self
                .current
                .as_ref()
                .filter(|_| self.state == ConnectionState::Completed)
                .map(|req| req.params.key_mgmt),
        }
    }

    /// Start connecting with whatever network selection finds.
    ///
    /// # Errors
    ///
    /// `InvalidState` while the interface is disabled.
    pub fn request_connect<E, D, H, B>(
        &mut self,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        if self.state == ConnectionState::InterfaceDisabled {
            return Err(StationError::InvalidState { state: self.state, operation: "connect" });
        }
        self.operator_disconnected = false;

        let mut actions = Vec::new();
        self.try_connect(catalog, io, now, true, &mut actions);
        Ok(actions)
    }

    /// Connect to one specific network (`None` re-opens selection to all).
    ///
    /// # Errors
    ///
    /// `UnknownNetwork` for an unknown id, `Negotiation` when the profile
    /// cannot work with this driver at all, `InvalidState` while the interface
    /// is disabled.
    pub fn select_network<E, D, H, B>(
        &mut self,
        network: Option<ProfileId>,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        if self.state == ConnectionState::InterfaceDisabled {
            return Err(StationError::InvalidState { state: self.state, operation: "connect" });
        }
        let mut actions = Vec::new();

        if let Some(id) = network {
            let profile = self.profiles.get_mut(&id).ok_or(StationError::UnknownNetwork(id))?;
            self.negotiator.negotiate(None, profile)?;
            profile.enabled = true;

            let switching = self.current.as_ref().is_some_and(|req| req.profile != id);
            if switching {
                self.deauthenticate(io, ReasonCode::DEAUTH_LEAVING, &mut actions);
                self.teardown(io, &mut actions);
                self.set_state(ConnectionState::Disconnected, &mut actions);
            }
        }
        self.selected = network;
        self.operator_disconnected = false;

        self.try_connect(catalog, io, now, true, &mut actions);
        Ok(actions)
    }

    /// Operator disconnect: leave the BSS and stay put until asked again.
    ///
    /// # Errors
    ///
    /// `InvalidState` while the interface is disabled.
    pub fn request_disconnect<E, D, H>(
        &mut self,
        io: &mut StationIo<'_, E, D, H>,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if self.state == ConnectionState::InterfaceDisabled {
            return Err(StationError::InvalidState { state: self.state, operation: "disconnect" });
        }
        let mut actions = Vec::new();

        self.operator_disconnected = true;
        self.reconnect_at = None;
        self.rescan_freqs.clear();

        self.deauthenticate(io, ReasonCode::DEAUTH_LEAVING, &mut actions);
        self.teardown(io, &mut actions);
        if !self.scan_work.is_idle() {
            actions.push(StationAction::CancelWork { kind: Some(WorkKind::Scan) });
            self.scan_work = WorkSlot::Idle;
        }
        self.set_state(ConnectionState::Inactive, &mut actions);
        Ok(actions)
    }

    /// Drop the current association (if any) and connect again.
    ///
    /// # Errors
    ///
    /// `InvalidState` while the interface is disabled.
    pub fn reassociate<E, D, H, B>(
        &mut self,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        if self.state == ConnectionState::InterfaceDisabled {
            return Err(StationError::InvalidState { state: self.state, operation: "reassociate" });
        }
        let mut actions = Vec::new();
        self.operator_disconnected = false;

        if self.current.is_some() {
            self.deauthenticate(io, ReasonCode::DEAUTH_LEAVING, &mut actions);
            self.teardown(io, &mut actions);
            self.set_state(ConnectionState::Disconnected, &mut actions);
        }
        self.try_connect(catalog, io, now, true, &mut actions);
        Ok(actions)
    }

    /// Enable a network, clearing any temporary disable.
    ///
    /// # Errors
    ///
    /// `UnknownNetwork` for an unknown id.
    pub fn enable_network<E, D, H, B>(
        &mut self,
        id: ProfileId,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        let profile = self.profiles.get_mut(&id).ok_or(StationError::UnknownNetwork(id))?;
        let mut actions = Vec::new();

        profile.enabled = true;
        if profile.disabled_until().is_some() || profile.auth_failures() > 0 {
            profile.clear_failures();
            tracing::info!(iface = %self.iface, network = %id, "temporary disable cleared");
            actions.push(StationAction::Notify(Notification::SsidReenabled {
                id,
                ssid: profile.ssid.clone(),
            }));
        }

        let idle = matches!(self.state, ConnectionState::Disconnected | ConnectionState::Inactive);
        if idle && !self.operator_disconnected {
            self.try_connect(catalog, io, now, true, &mut actions);
        }
        Ok(actions)
    }

    /// Disable a network, leaving it if it is in use.
    ///
    /// # Errors
    ///
    /// `UnknownNetwork` for an unknown id.
    pub fn disable_network<E, D, H, B>(
        &mut self,
        id: ProfileId,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        let profile = self.profiles.get_mut(&id).ok_or(StationError::UnknownNetwork(id))?;
        profile.enabled = false;
        if self.selected == Some(id) {
            self.selected = None;
        }

        let mut actions = Vec::new();
        if self.current.as_ref().is_some_and(|req| req.profile == id) {
            self.deauthenticate(io, ReasonCode::DEAUTH_LEAVING, &mut actions);
            self.teardown(io, &mut actions);
            self.set_state(ConnectionState::Disconnected, &mut actions);
            if !self.operator_disconnected {
                self.try_connect(catalog, io, now, true, &mut actions);
            }
        }
        Ok(actions)
    }

    /// The owner queued a requested work under `id`.
    pub fn on_work_queued(&mut self, kind: WorkKind, id: WorkId) {
        let slot = if kind.is_scan() { &mut self.scan_work } else { &mut self.connect_work };
        if *slot == WorkSlot::Requested {
            *slot = WorkSlot::Queued(id);
        }
    }

    /// The owner could not queue a requested work.
    pub fn on_work_rejected(&mut self, kind: WorkKind, now: Instant) -> Vec<StationAction> {
        let mut actions = Vec::new();
        tracing::warn!(iface = %self.iface, kind = %kind, "radio work rejected");
        if kind.is_scan() {
            self.scan_work = WorkSlot::Idle;
            if self.state == ConnectionState::Scanning {
                self.set_state(ConnectionState::Disconnected, &mut actions);
            }
        } else {
            self.connect_work = WorkSlot::Idle;
        }
        self.reconnect_at = Some(now + self.config.rescan_interval);
        actions
    }

    /// A radio work of this station was admitted.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for symmetry with the other entry
    /// points.
    pub fn on_work_started<E, D, H>(
        &mut self,
        id: WorkId,
        ctx: &WorkContext,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        let mut actions = Vec::new();
        match ctx {
            WorkContext::Scan { freqs } => {
                if !self.scan_work.accepts(id) {
                    tracing::debug!(iface = %self.iface, work = %id, "stale scan work");
                    return Ok(vec![StationAction::CompleteWork(id)]);
                }
                self.scan_work = WorkSlot::Started(id);

                match io.driver.trigger_scan(self.iface, freqs) {
                    Ok(()) => actions.push(StationAction::Notify(Notification::ScanStarted)),
                    Err(err) => {
                        tracing::warn!(iface = %self.iface, error = %err, "scan request failed");
                        self.scan_work = WorkSlot::Idle;
                        actions.push(StationAction::CompleteWork(id));
                        actions.push(StationAction::Notify(Notification::ScanFailed));
                        self.set_state(ConnectionState::Disconnected, &mut actions);
                        self.reconnect_at = Some(now + self.config.rescan_interval);
                    },
                }
            },
            WorkContext::Connect(req) => {
                if !self.connect_work.accepts(id)
                    || self.state == ConnectionState::InterfaceDisabled
                {
                    tracing::debug!(iface = %self.iface, work = %id, "stale connect work");
                    return Ok(vec![StationAction::CompleteWork(id)]);
                }
                if io.global.countermeasures_active(now) {
                    tracing::info!(
                        iface = %self.iface,
                        "association blocked by TKIP countermeasures"
                    );
                    self.connect_work = WorkSlot::Idle;
                    self.reconnect_at = io.global.countermeasures_until();
                    return Ok(vec![StationAction::CompleteWork(id)]);
                }

                self.connect_work = WorkSlot::Started(id);
                self.current = Some((**req).clone());
                let next = if self.flags.contains(DriverFlags::SME) {
                    ConnectionState::Authenticating
                } else {
                    ConnectionState::Associating
                };
                self.set_state(next, &mut actions);

                let timeout = if self.config.scan_iterate {
                    self.config.scan_iterate_timeout
                } else if self.prior_failure {
                    self.config.assoc_retry_timeout
                } else {
                    self.config.assoc_timeout
                };
                self.assoc_deadline = Some(now + timeout);

                tracing::info!(
                    iface = %self.iface,
                    bssid = %req.target.bssid,
                    ssid = %req.target.ssid,
                    freq = req.target.freq,
                    key_mgmt = req.params.key_mgmt.name(),
                    pairwise = req.params.pairwise.name(),
                    timeout_s = timeout.as_secs(),
                    "trying to associate"
                );

                if let Err(err) = io.driver.associate(self.iface, &req.params, &req.target) {
                    if self.flags.contains(DriverFlags::AUTHORITATIVE_ERRORS) {
                        tracing::warn!(
                            iface = %self.iface,
                            error = %err,
                            "association request rejected"
                        );
                        self.fail_attempt(Failure::Connection, io, now, &mut actions);
                    } else {
                        tracing::debug!(
                            iface = %self.iface,
                            error = %err,
                            "association request failed, waiting for timeout"
                        );
                    }
                }
            },
            WorkContext::External { .. } => {},
        }
        Ok(actions)
    }

    /// A radio work of this station was cancelled.
    pub fn on_work_cancelled(&mut self, id: WorkId) {
        if self.scan_work.holds(id) {
            self.scan_work = WorkSlot::Idle;
        }
        if self.connect_work.holds(id) {
            self.connect_work = WorkSlot::Idle;
        }
    }

    /// Process one driver event.
    ///
    /// # Errors
    ///
    /// Currently infallible for events; reconnect attempts that fail to
    /// schedule are retried by the reconnect timer.
    pub fn handle_event<E, D, H, B>(
        &mut self,
        event: DriverEvent,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        let mut actions = Vec::new();

        match event {
            DriverEvent::InterfaceDisabled => self.on_interface_disabled(io, now, &mut actions),
            DriverEvent::InterfaceEnabled => {
                if self.state == ConnectionState::InterfaceDisabled {
                    self.flush_at = None;
                    if self.operator_disconnected {
                        self.set_state(ConnectionState::Inactive, &mut actions);
                    } else {
                        self.set_state(ConnectionState::Disconnected, &mut actions);
                        self.try_connect(catalog, io, now, true, &mut actions);
                    }
                }
            },
            _ if self.state == ConnectionState::InterfaceDisabled => {
                tracing::trace!(iface = %self.iface, ?event, "event ignored, interface disabled");
            },
            DriverEvent::Authenticated { bssid } => {
                if self.state == ConnectionState::Authenticating && self.is_target(bssid) {
                    self.set_state(ConnectionState::Associating, &mut actions);
                }
            },
            DriverEvent::Associated { bssid, .. } => {
                self.on_associated(bssid, io, now, &mut actions);
            },
            DriverEvent::AssocRejected { bssid, status, retry_delay, rssi_threshold } => {
                if !self.is_connecting(bssid) {
                    return Ok(actions);
                }
                actions.push(StationAction::Notify(Notification::AssocReject { bssid, status }));
                if let Some(delay) = retry_delay {
                    self.disallow(bssid, delay, rssi_threshold, io, now, &mut actions);
                }
                self.fail_attempt(Failure::Connection, io, now, &mut actions);
            },
            DriverEvent::AuthRejected { bssid, status } => {
                if !self.is_connecting(bssid) {
                    return Ok(actions);
                }
                actions.push(StationAction::Notify(Notification::AuthReject { bssid, status }));
                let failure = if status == StatusCode::UNKNOWN_PASSWORD_IDENTIFIER {
                    Failure::Auth(DisableReason::WrongKey)
                } else {
                    Failure::Connection
                };
                self.fail_attempt(failure, io, now, &mut actions);
            },
            DriverEvent::Disassociated { bssid, reason, locally_generated }
            | DriverEvent::Deauthenticated { bssid, reason, locally_generated } => {
                self.on_link_lost(bssid, reason, locally_generated, io, now, &mut actions);
            },
            DriverEvent::EapolRx { src, frame } => {
                self.on_eapol(src, &frame, io, now, &mut actions);
            },
            DriverEvent::ScanResults => {
                if let WorkSlot::Started(id) = self.scan_work {
                    actions.push(StationAction::CompleteWork(id));
                    self.scan_work = WorkSlot::Idle;
                }
                actions.push(StationAction::Notify(Notification::ScanResults));
                if self.state == ConnectionState::Scanning {
                    self.try_connect(catalog, io, now, false, &mut actions);
                }
            },
            DriverEvent::ScanFailed => {
                if let WorkSlot::Started(id) = self.scan_work {
                    actions.push(StationAction::CompleteWork(id));
                    self.scan_work = WorkSlot::Idle;
                }
                actions.push(StationAction::Notify(Notification::ScanFailed));
                if self.state == ConnectionState::Scanning {
                    self.set_state(ConnectionState::Disconnected, &mut actions);
                    self.reconnect_at = Some(now + self.config.rescan_interval);
                }
            },
            DriverEvent::MichaelMicFailure { pairwise } => {
                self.on_mic_failure(pairwise, io, now, &mut actions);
            },
        }

        Ok(actions)
    }

    /// Fire due deadlines.
    ///
    /// # Errors
    ///
    /// Currently infallible; see [`Station::handle_event`].
    pub fn tick<E, D, H, B>(
        &mut self,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
    ) -> Result<Vec<StationAction>, StationError>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        let mut actions = Vec::new();
        let due = |deadline: Option<Instant>| deadline.is_some_and(|at| now >= at);

        if due(self.assoc_deadline) {
            self.assoc_deadline = None;
            tracing::warn!(
                iface = %self.iface,
                bssid = ?self.current.as_ref().map(|req| req.target.bssid),
                "authentication/association timed out"
            );
            self.deauthenticate(io, ReasonCode::DEAUTH_LEAVING, &mut actions);
            self.fail_attempt(Failure::Connection, io, now, &mut actions);
        }

        if due(self.handshake_deadline) {
            self.handshake_deadline = None;
            tracing::warn!(iface = %self.iface, state = ?self.state, "key handshake timed out");
            let reason = ReasonCode::FOURWAY_HANDSHAKE_TIMEOUT;
            let failure = self.classify_failure(Some(reason));
            self.deauthenticate(io, reason, &mut actions);
            self.fail_attempt(failure, io, now, &mut actions);
        }

        if due(self.reconnect_at) {
            self.reconnect_at = None;
            let idle =
                matches!(self.state, ConnectionState::Disconnected | ConnectionState::Inactive);
            if idle && !self.operator_disconnected {
                self.try_connect(catalog, io, now, true, &mut actions);
            }
        }

        if due(self.flush_at) {
            self.flush_at = None;
            if self.state == ConnectionState::InterfaceDisabled {
                tracing::debug!(iface = %self.iface, "flushing cached BSS data");
                actions.push(StationAction::FlushBss);
            }
        }

        self.policy.disallow_list_mut().prune(now);
        self.sync_disallow(io, now);

        Ok(actions)
    }

    fn is_connecting(&self, bssid: MacAddr) -> bool {
        matches!(self.state, ConnectionState::Authenticating | ConnectionState::Associating)
            && self.is_target(bssid)
    }

    /// Pick a target and queue connect work, or fall back to scanning.
    ///
    /// With `scan_if_none` unset (selection right after a scan) finding nothing
    /// schedules a later rescan instead of scanning again immediately.
    fn try_connect<E, D, H, B>(
        &mut self,
        catalog: &B,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        scan_if_none: bool,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
        B: BssCatalog + ?Sized,
    {
        if self.state >= ConnectionState::Authenticating || !self.connect_work.is_idle() {
            return;
        }
        self.reconnect_at = None;

        if io.global.countermeasures_active(now) {
            tracing::info!(iface = %self.iface, "association blocked by TKIP countermeasures");
            self.reconnect_at = io.global.countermeasures_until();
            self.set_state(ConnectionState::Disconnected, actions);
            return;
        }

        let candidates: Vec<&NetworkProfile> = self
            .profiles
            .values()
            .filter(|profile| profile.enabled)
            .filter(|profile| self.selected.map_or(true, |id| id == profile.id))
            .collect();
        if candidates.is_empty() {
            self.set_state(ConnectionState::Inactive, actions);
            return;
        }
        if candidates.iter().all(|profile| profile.is_temp_disabled(now)) {
            self.reconnect_at =
                candidates.iter().filter_map(|profile| profile.disabled_until()).min();
            tracing::debug!(iface = %self.iface, "every network temporarily disabled");
            self.set_state(ConnectionState::Disconnected, actions);
            return;
        }

        let selection = self.select(catalog, now);
        self.sync_disallow(io, now);

        match selection {
            Some(req) => {
                tracing::debug!(
                    iface = %self.iface,
                    network = %req.profile,
                    bssid = %req.target.bssid,
                    "selected BSS"
                );
                actions.push(StationAction::SubmitWork {
                    kind: self.connect_kind(),
                    freq: req.target.freq,
                    next: true,
                    ctx: WorkContext::Connect(Box::new(req)),
                });
                self.connect_work = WorkSlot::Requested;
            },
            None if scan_if_none => {
                self.set_state(ConnectionState::Scanning, actions);
                if self.scan_work.is_idle() {
                    let freqs = std::mem::take(&mut self.rescan_freqs);
                    actions.push(StationAction::SubmitWork {
                        kind: WorkKind::Scan,
                        freq: 0,
                        next: false,
                        ctx: WorkContext::Scan { freqs },
                    });
                    self.scan_work = WorkSlot::Requested;
                }
            },
            None => {
                actions.push(StationAction::Notify(Notification::NetworkNotFound));
                self.set_state(ConnectionState::Disconnected, actions);
                self.reconnect_at = Some(now + self.config.rescan_interval);
            },
        }
    }

    /// Network selection over the catalog. Clears an exhausted ignore list
    /// once and retries.
    fn select<B: BssCatalog + ?Sized>(
        &mut self,
        catalog: &B,
        now: Instant,
    ) -> Option<ConnectRequest> {
        let bsses = catalog.candidates(self.iface, &CandidateFilter::any());

        let (mut found, all_ignored) = self.pick(&bsses, now);
        if found.is_none() && all_ignored {
            self.policy.clear_ignore_list(now);
            found = self.pick(&bsses, now).0;
        }

        let mut req = found?;
        req.alternatives = bsses
            .iter()
            .filter(|bss| bss.ssid == req.target.ssid && bss.bssid != req.target.bssid)
            .filter(|bss| !self.policy.is_ignored(bss.bssid, now))
            .map(|bss| bss.freq)
            .collect();
        Some(req)
    }

    /// Best (profile, BSS) pair, plus whether some matching BSS was skipped
    /// only because it is ignored.
    fn pick(&mut self, bsses: &[CandidateBss], now: Instant) -> (Option<ConnectRequest>, bool) {
        let mut best: Option<(i32, ConnectRequest)> = None;
        let mut ignored_match = false;

        for bss in bsses {
            for profile in self.profiles.values() {
                if !profile.enabled
                    || profile.is_temp_disabled(now)
                    || self.selected.is_some_and(|id| id != profile.id)
                    || profile.ssid != bss.ssid
                    || profile.bssid.is_some_and(|bssid| bssid != bss.bssid)
                {
                    continue;
                }
                if self.policy.is_ignored(bss.bssid, now) {
                    ignored_match = true;
                    continue;
                }
                if self.policy.disallow_list_mut().is_disallowed(bss.bssid, bss.signal, now) {
                    continue;
                }

                match self.negotiator.negotiate(Some(bss), profile) {
                    Ok(params) => {
                        let better =
                            best.as_ref().map_or(true, |(prio, _)| profile.priority > *prio);
                        if better {
                            let req = ConnectRequest {
                                profile: profile.id,
                                target: bss.clone(),
                                params,
                                alternatives: Vec::new(),
                            };
                            best = Some((profile.priority, req));
                        }
                    },
                    Err(err) => tracing::debug!(
                        iface = %self.iface,
                        bssid = %bss.bssid,
                        network = %profile.id,
                        reason = err.reason(),
                        "candidate rejected"
                    ),
                }
            }
        }

        let found = best.map(|(_, req)| req);
        (found, ignored_match)
    }

    fn on_associated<E, D, H>(
        &mut self,
        bssid: MacAddr,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if !self.is_connecting(bssid) {
            tracing::debug!(iface = %self.iface, bssid = %bssid, "unexpected association event");
            return;
        }
        self.assoc_deadline = None;
        self.own_request = None;
        if let WorkSlot::Started(id) = self.connect_work {
            actions.push(StationAction::CompleteWork(id));
        }
        self.connect_work = WorkSlot::Idle;
        self.set_state(ConnectionState::Associated, actions);

        let Some(req) = self.current.as_ref() else {
            return;
        };
        if req.params.is_open() {
            self.complete_connection(io, now, actions);
            return;
        }
        if let Some(profile) = self.profiles.get(&req.profile) {
            io.handshake.configure(self.iface, &req.params, profile);
        }
        self.handshake_deadline = Some(now + self.config.handshake_timeout);
    }

    fn on_eapol<E, D, H>(
        &mut self,
        src: MacAddr,
        frame: &[u8],
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if self.state < ConnectionState::Associated {
            tracing::trace!(iface = %self.iface, src = %src, "EAPOL before association dropped");
            return;
        }

        match io.handshake.process_eapol(self.iface, src, frame) {
            HandshakeProgress::Pending => {
                if self.state == ConnectionState::Associated {
                    self.set_state(ConnectionState::FourWayHandshake, actions);
                }
            },
            HandshakeProgress::PairwiseComplete { group_pending } => {
                if self.state == ConnectionState::Associated {
                    self.set_state(ConnectionState::FourWayHandshake, actions);
                }
                if self.state == ConnectionState::FourWayHandshake {
                    if group_pending {
                        self.set_state(ConnectionState::GroupHandshake, actions);
                    } else {
                        self.complete_connection(io, now, actions);
                    }
                }
            },
            HandshakeProgress::GroupComplete => match self.state {
                ConnectionState::FourWayHandshake => {
                    self.set_state(ConnectionState::GroupHandshake, actions);
                    self.complete_connection(io, now, actions);
                },
                ConnectionState::GroupHandshake => self.complete_connection(io, now, actions),
                _ => {},
            },
            HandshakeProgress::Failed { reason } => {
                tracing::warn!(
                    iface = %self.iface,
                    state = ?self.state,
                    reason = %reason,
                    "key handshake failed"
                );
                let failure = self.classify_failure(Some(reason));
                self.deauthenticate(io, reason, actions);
                self.fail_attempt(failure, io, now, actions);
            },
        }
    }

    fn complete_connection<E, D, H>(
        &mut self,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        debug_assert!(self.current.is_some(), "completed without negotiated parameters");
        let Some((id, bssid)) = self.current.as_ref().map(|req| (req.profile, req.target.bssid))
        else {
            return;
        };

        self.assoc_deadline = None;
        self.handshake_deadline = None;
        self.set_state(ConnectionState::Completed, actions);
        io.handshake.notify_port_valid(self.iface, true);

        if let Some(profile) = self.profiles.get_mut(&id) {
            self.policy.on_success(profile, Some(bssid));
        }
        self.prior_failure = false;
        self.completed_at = Some(now);
        self.rescan_freqs.clear();

        tracing::info!(iface = %self.iface, bssid = %bssid, network = %id, "connection completed");
        actions.push(StationAction::Notify(Notification::Connected { bssid, id }));
    }

    fn on_link_lost<E, D, H>(
        &mut self,
        bssid: MacAddr,
        reason: ReasonCode,
        locally_generated: bool,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if locally_generated && self.own_request == Some(bssid) {
            self.own_request = None;
            tracing::debug!(
                iface = %self.iface,
                bssid = %bssid,
                "own disconnect request completed"
            );
            return;
        }
        if self.state < ConnectionState::Authenticating || !self.is_target(bssid) {
            tracing::trace!(iface = %self.iface, bssid = %bssid, "stale disconnect event");
            return;
        }

        tracing::info!(
            iface = %self.iface,
            bssid = %bssid,
            reason = %reason,
            state = ?self.state,
            "disconnected"
        );
        actions.push(StationAction::Notify(Notification::Disconnected {
            bssid,
            reason,
            locally_generated,
        }));

        if self.state == ConnectionState::Completed {
            self.track_link_loss(bssid, io, now, actions);
        }
        let failure = self.classify_failure(Some(reason));
        self.fail_attempt(failure, io, now, actions);
    }

    fn track_link_loss<E, D, H>(
        &mut self,
        bssid: MacAddr,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        let recent = self
            .completed_at
            .is_some_and(|at| now.saturating_duration_since(at) <= self.config.link_loss_window);
        if !recent {
            self.link_loss = None;
            return;
        }

        let count = match self.link_loss {
            Some((lost, count)) if lost == bssid => count + 1,
            _ => 1,
        };
        if count >= self.config.link_loss_threshold {
            self.link_loss = None;
            let duration = self.config.link_loss_disallow;
            self.disallow(bssid, duration, None, io, now, actions);
        } else {
            self.link_loss = Some((bssid, count));
        }
    }

    fn on_interface_disabled<E, D, H>(
        &mut self,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if self.state == ConnectionState::InterfaceDisabled {
            return;
        }
        if !self.scan_work.is_idle() || !self.connect_work.is_idle() {
            actions.push(StationAction::CancelWork { kind: None });
        }
        self.scan_work = WorkSlot::Idle;
        self.connect_work = WorkSlot::Idle;
        if self.state >= ConnectionState::Associated {
            io.handshake.notify_port_valid(self.iface, false);
        }

        self.current = None;
        self.own_request = None;
        self.assoc_deadline = None;
        self.handshake_deadline = None;
        self.reconnect_at = None;
        self.set_state(ConnectionState::InterfaceDisabled, actions);
        self.flush_at = Some(now + self.config.bss_flush_grace);
    }

    fn on_mic_failure<E, D, H>(
        &mut self,
        pairwise: bool,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        tracing::warn!(iface = %self.iface, pairwise, "Michael MIC failure detected");
        if !io.global.record_mic_failure(now) {
            return;
        }

        let duration = io.global.config().countermeasure_duration;
        tracing::warn!(
            iface = %self.iface,
            duration_s = duration.as_secs(),
            "TKIP countermeasures started"
        );
        actions.push(StationAction::Notify(Notification::TkipCountermeasures { duration }));

        self.deauthenticate(io, ReasonCode::MICHAEL_MIC_FAILURE, actions);
        self.teardown(io, actions);
        self.set_state(ConnectionState::Disconnected, actions);
        self.reconnect_at = io.global.countermeasures_until();
    }

    /// Failure kind for a teardown in the current state.
    fn classify_failure(&self, reason: Option<ReasonCode>) -> Failure {
        let Some(req) = self.current.as_ref() else {
            return Failure::Connection;
        };
        let key_mgmt = req.params.key_mgmt;

        match self.state {
            ConnectionState::FourWayHandshake if key_mgmt.is_psk() || key_mgmt.is_sae() => {
                Failure::Auth(DisableReason::WrongKey)
            },
            ConnectionState::Associated
            | ConnectionState::FourWayHandshake
            | ConnectionState::GroupHandshake
                if key_mgmt.is_ieee8021x()
                    && reason.map_or(true, ReasonCode::indicates_bad_credentials) =>
            {
                Failure::Auth(DisableReason::AuthFailed)
            },
            _ => Failure::Connection,
        }
    }

    /// Send a deauthentication for the current target and mark the resulting
    /// disconnect event as our own.
    fn deauthenticate<E, D, H>(
        &mut self,
        io: &mut StationIo<'_, E, D, H>,
        reason: ReasonCode,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if self.state < ConnectionState::Authenticating {
            return;
        }
        let Some(bssid) = self.current.as_ref().map(|req| req.target.bssid) else {
            return;
        };

        self.own_request = Some(bssid);
        if let Err(err) = io.driver.deauthenticate(self.iface, bssid, reason) {
            tracing::warn!(
                iface = %self.iface,
                bssid = %bssid,
                error = %err,
                "deauthentication failed"
            );
        }
        actions.push(StationAction::Notify(Notification::Disconnected {
            bssid,
            reason,
            locally_generated: true,
        }));
    }

    /// Release everything tied to the current attempt without touching the
    /// failure policy.
    fn teardown<E, D, H>(
        &mut self,
        io: &mut StationIo<'_, E, D, H>,
        actions: &mut Vec<StationAction>,
    ) -> Option<ConnectRequest>
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        self.assoc_deadline = None;
        self.handshake_deadline = None;

        match self.connect_work {
            WorkSlot::Started(id) => actions.push(StationAction::CompleteWork(id)),
            WorkSlot::Requested | WorkSlot::Queued(_) => {
                actions.push(StationAction::CancelWork { kind: Some(self.connect_kind()) });
            },
            WorkSlot::Idle => {},
        }
        self.connect_work = WorkSlot::Idle;

        if self.state >= ConnectionState::Associated {
            io.handshake.notify_port_valid(self.iface, false);
        }
        self.current.take()
    }

    /// Tear down the attempt and feed the failure policy.
    fn fail_attempt<E, D, H>(
        &mut self,
        failure: Failure,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        let attempt = self.teardown(io, actions);
        self.set_state(ConnectionState::Disconnected, actions);
        self.prior_failure = true;

        let Some(req) = attempt else {
            return;
        };
        let Some(profile) = self.profiles.get_mut(&req.profile) else {
            return;
        };
        let bssid = req.target.bssid;
        let env = io.env;

        match failure {
            Failure::Auth(reason) => {
                let disabled =
                    self.policy.on_auth_failed(profile, Some(bssid), reason, now, |bound| {
                        env.random_below(bound)
                    });
                if let Some(notification) = disabled {
                    actions.push(StationAction::Notify(notification));
                }
                self.reconnect_at = Some(now + reconnect_delay(1));
            },
            Failure::Connection => {
                let plan = self.policy.on_connection_failed(
                    profile,
                    Some(bssid),
                    &req.alternatives,
                    now,
                    |bound| env.random_below(bound),
                );
                if let Some(notification) = plan.temp_disabled {
                    actions.push(StationAction::Notify(notification));
                }
                self.rescan_freqs = plan.freqs;
                self.reconnect_at = Some(now + plan.delay);
            },
        }
    }

    fn disallow<E, D, H>(
        &mut self,
        bssid: MacAddr,
        duration: Duration,
        rssi_threshold: Option<i32>,
        io: &mut StationIo<'_, E, D, H>,
        now: Instant,
        actions: &mut Vec<StationAction>,
    ) where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        self.policy.disallow_list_mut().disallow(bssid, duration, rssi_threshold, now);
        actions.push(StationAction::Notify(Notification::BssTempDisallowed {
            bssid,
            duration,
            rssi_threshold,
        }));
        self.sync_disallow(io, now);
    }

    /// Push the disallow list to the driver if it changed.
    fn sync_disallow<E, D, H>(&mut self, io: &mut StationIo<'_, E, D, H>, now: Instant)
    where
        E: Environment,
        D: Driver,
        H: KeyHandshake,
    {
        if !self.policy.disallow_list_mut().take_changed() {
            return;
        }
        let bssids = self.policy.disallow_list().active(now);
        if let Err(err) = io.driver.set_bssid_disallow(self.iface, &bssids) {
            tracing::warn!(
                iface = %self.iface,
                error = %err,
                "failed to update BSSID disallow list"
            );
        }
    }
}
