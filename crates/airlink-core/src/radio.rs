//! Radio work scheduling.
//!
//! Several virtual interfaces can share one physical radio. Operations that
//! need exclusive (or band-exclusive) use of the hardware are queued here as
//! radio works and admitted one at a time, or two at a time on hardware that
//! can run off-channel operations concurrently on disjoint bands.
//!
//! ```text
//!   iface wlan0 ─┐                      ┌──────────── phy0 ────────────┐
//!                ├─ submit(kind, ctx) ─▶│ queue: [connect] [scan] [gas] │
//!   iface p2p0 ──┘                      │ started: ≤ 1 (≤ 2 if capable)  │
//!                                       └──────────────┬─────────────────┘
//!                                                      │
//!                               WorkEvent::Start / WorkEvent::Cancel { ctx }
//! ```
//!
//! # Admission
//!
//! Admission is recomputed from scratch after every mutation (submit,
//! complete, cancel, detach, external scan change):
//!
//! - Without simultaneous off-channel support, nothing starts while anything
//!   runs; otherwise the queue head starts (a scan head waits while an
//!   external scan runs).
//! - With support, nothing starts while a connect-class work runs or
//!   [`MAX_ACTIVE_WORKS`] are active. Otherwise the queue is walked in order up
//!   to the first queued connect-class work; a work may join the running set
//!   when its kind differs from every running kind, its band set is non-empty
//!   and disjoint from every running band set, and it is not a second
//!   scan-class work on the same interface.
//!
//! The scheduler never retries anything on its own. Every work leaves the
//! queue either through [`RadioScheduler::complete`] or through a
//! [`WorkEvent::Cancel`] that hands its context back, started or not.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
    time::Instant,
};

use airlink_proto::BandSet;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Maximum number of concurrently started works on a capable radio.
pub const MAX_ACTIVE_WORKS: usize = 2;

/// Virtual interface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IfaceId(pub u32);

impl fmt::Display for IfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Radio work identifier, unique for the scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag of a radio work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Station scan
    Scan,
    /// P2P device discovery scan
    P2pScan,
    /// Driver-SME connect
    Connect,
    /// Userspace-SME connect
    SmeConnect,
    /// Remain on channel
    RemainOnChannel,
    /// Transmit an action frame off-channel
    SendAction,
    /// GAS/ANQP query
    GasQuery,
    /// DPP listen
    DppListen,
}

impl WorkKind {
    /// Scan-class works: at most one per interface runs at a time.
    pub const fn is_scan(self) -> bool {
        matches!(self, Self::Scan | Self::P2pScan)
    }

    /// Connect-class works run alone.
    pub const fn is_connect(self) -> bool {
        matches!(self, Self::Connect | Self::SmeConnect)
    }

    /// Short name used in logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::P2pScan => "p2p-scan",
            Self::Connect => "connect",
            Self::SmeConnect => "sme-connect",
            Self::RemainOnChannel => "remain-on-channel",
            Self::SendAction => "send-action",
            Self::GasQuery => "gas-query",
            Self::DppListen => "dpp-listen",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context carried by a radio work.
///
/// A context may name the frequencies it will touch (a partial scan, for
/// example); admission then uses the union of their bands.
pub trait WorkPayload {
    /// Frequencies this work will visit; empty when unknown
    fn freqs(&self) -> &[u32] {
        &[]
    }
}

impl WorkPayload for () {}

impl WorkPayload for Vec<u32> {
    fn freqs(&self) -> &[u32] {
        self
    }
}

/// Admission-relevant radio capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioCaps {
    /// Off-channel operations may overlap on disjoint bands
    pub offchannel_simultaneous: bool,
    /// Bands the radio supports
    pub bands: BandSet,
}

/// Which works a cancellation reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Only works of the given interface
    Interface,
    /// Works of every interface on the same radio
    AllInterfaces,
}

/// Scheduler notification for the owner of a work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkEvent<C> {
    /// The work now owns the radio (or its band)
    Start {
        /// Work identifier
        id: WorkId,
        /// Owning interface
        iface: IfaceId,
        /// Work kind
        kind: WorkKind,
    },
    /// The work was removed without completing
    Cancel {
        /// Work identifier
        id: WorkId,
        /// Owning interface
        iface: IfaceId,
        /// Work kind
        kind: WorkKind,
        /// The work had already started
        started: bool,
        /// The work's context, handed back for release
        ctx: C,
    },
}

/// One queued or running radio operation.
#[derive(Debug, Clone)]
pub struct RadioWork<C> {
    id: WorkId,
    iface: IfaceId,
    kind: WorkKind,
    freq: u32,
    bands: BandSet,
    started: bool,
    queued_at: Instant,
    ctx: C,
}

impl<C> RadioWork<C> {
    /// Work identifier
    pub fn id(&self) -> WorkId {
        self.id
    }

    /// Owning interface
    pub fn iface(&self) -> IfaceId {
        self.iface
    }

    /// Work kind
    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    /// Frequency hint (0 = none)
    pub fn freq(&self) -> u32 {
        self.freq
    }

    /// Bands the work may occupy
    pub fn bands(&self) -> BandSet {
        self.bands
    }

    /// True once admitted
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Submission time
    pub fn queued_at(&self) -> Instant {
        self.queued_at
    }

    /// Work context
    pub fn ctx(&self) -> &C {
        &self.ctx
    }
}

#[derive(Debug)]
struct Radio<C> {
    name: String,
    works: VecDeque<RadioWork<C>>,
    ifaces: BTreeSet<IfaceId>,
    offchannel_simultaneous: bool,
    bands: BandSet,
    external_scan: bool,
}

impl<C> Radio<C> {
    fn active(&self) -> impl Iterator<Item = &RadioWork<C>> {
        self.works.iter().filter(|work| work.started)
    }

    fn blocked_by_external_scan(&self, work: &RadioWork<C>) -> bool {
        self.external_scan && work.kind.is_scan()
    }

    /// Index of the next work to admit, if any.
    fn next_startable(&self) -> Option<usize> {
        let running: Vec<&RadioWork<C>> = self.active().collect();

        if !self.offchannel_simultaneous {
            if !running.is_empty() {
                return None;
            }
            let head = self.works.front()?;
            return (!self.blocked_by_external_scan(head)).then_some(0);
        }

        if running.len() >= MAX_ACTIVE_WORKS || running.iter().any(|work| work.kind.is_connect())
        {
            return None;
        }

        if running.is_empty() {
            return self.works.iter().position(|work| !self.blocked_by_external_scan(work));
        }

        for (idx, work) in self.works.iter().enumerate() {
            if work.started {
                continue;
            }
            if work.kind.is_connect() {
                break;
            }
            if self.blocked_by_external_scan(work) {
                continue;
            }

            let compatible = running.iter().all(|active| {
                active.kind != work.kind
                    && work.bands.is_disjoint_from(active.bands)
                    && !(work.kind.is_scan() && active.kind.is_scan() && active.iface == work.iface)
            });
            if compatible {
                return Some(idx);
            }
        }
        None
    }

    /// Admit as many works as the rules allow.
    fn admit(&mut self, now: Instant) -> Vec<WorkEvent<C>> {
        let mut events = Vec::new();
        while let Some(idx) = self.next_startable() {
            let Some(work) = self.works.get_mut(idx) else {
                break;
            };
            work.started = true;
            tracing::debug!(
                radio = %self.name,
                iface = %work.iface,
                work = %work.id,
                kind = %work.kind,
                wait_ms = now.saturating_duration_since(work.queued_at).as_millis() as u64,
                "radio work started"
            );
            events.push(WorkEvent::Start { id: work.id, iface: work.iface, kind: work.kind });
        }
        events
    }

    /// Remove every work matching `pred` and report each as cancelled.
    fn cancel_matching(&mut self, pred: impl Fn(&RadioWork<C>) -> bool) -> Vec<WorkEvent<C>> {
        let mut events = Vec::new();
        let mut kept = VecDeque::with_capacity(self.works.len());
        for work in self.works.drain(..) {
            if pred(&work) {
                tracing::debug!(
                    radio = %self.name,
                    iface = %work.iface,
                    work = %work.id,
                    kind = %work.kind,
                    started = work.started,
                    "radio work cancelled"
                );
                events.push(WorkEvent::Cancel {
                    id: work.id,
                    iface: work.iface,
                    kind: work.kind,
                    started: work.started,
                    ctx: work.ctx,
                });
            } else {
                kept.push_back(work);
            }
        }
        self.works = kept;
        events
    }
}

/// Registry of radios and their work queues.
#[derive(Debug)]
pub struct RadioScheduler<C> {
    radios: BTreeMap<String, Radio<C>>,
    iface_radio: BTreeMap<IfaceId, String>,
    next_id: u64,
    capacity: usize,
}

impl<C: WorkPayload> RadioScheduler<C> {
    /// Create a scheduler with `capacity` queued works per radio.
    pub fn new(capacity: usize) -> Self {
        Self { radios: BTreeMap::new(), iface_radio: BTreeMap::new(), next_id: 1, capacity }
    }

    /// Attach `iface` to the radio `radio_name`, creating the radio on first
    /// use. The first interface's capabilities define the radio.
    pub fn attach(&mut self, iface: IfaceId, radio_name: &str, caps: RadioCaps) {
        let radio = self.radios.entry(radio_name.to_string()).or_insert_with(|| {
            tracing::debug!(radio = radio_name, "radio created");
            Radio {
                name: radio_name.to_string(),
                works: VecDeque::new(),
                ifaces: BTreeSet::new(),
                offchannel_simultaneous: caps.offchannel_simultaneous,
                bands: caps.bands,
                external_scan: false,
            }
        });
        radio.ifaces.insert(iface);
        self.iface_radio.insert(iface, radio_name.to_string());
    }

    /// Detach `iface`: cancel its works and drop the radio with its last
    /// interface. Works of the remaining interfaces may start as a result.
    pub fn detach(&mut self, iface: IfaceId, now: Instant) -> Vec<WorkEvent<C>> {
        let Some(name) = self.iface_radio.remove(&iface) else {
            return Vec::new();
        };
        let Some(radio) = self.radios.get_mut(&name) else {
            return Vec::new();
        };

        let mut events = radio.cancel_matching(|work| work.iface == iface);
        radio.ifaces.remove(&iface);
        if radio.ifaces.is_empty() {
            tracing::debug!(radio = %name, "radio destroyed");
            self.radios.remove(&name);
        } else {
            events.extend(radio.admit(now));
        }
        events
    }

    /// Queue a work for `iface`. `next` puts it at the head of the queue.
    pub fn submit(
        &mut self,
        iface: IfaceId,
        kind: WorkKind,
        freq: u32,
        next: bool,
        ctx: C,
        now: Instant,
    ) -> Result<(WorkId, Vec<WorkEvent<C>>), SchedulerError> {
        let radio = self
            .iface_radio
            .get(&iface)
            .and_then(|name| self.radios.get_mut(name))
            .ok_or(SchedulerError::NotAttached(iface))?;

        if radio.works.len() >= self.capacity {
            return Err(SchedulerError::QueueFull {
                radio: radio.name.clone(),
                capacity: self.capacity,
            });
        }

        let bands = if freq != 0 {
            BandSet::from_freq(freq)
        } else if !ctx.freqs().is_empty() {
            BandSet::from_freqs(ctx.freqs())
        } else {
            radio.bands
        };

        let id = WorkId(self.next_id);
        self.next_id += 1;

        let work = RadioWork { id, iface, kind, freq, bands, started: false, queued_at: now, ctx };
        if next {
            radio.works.push_front(work);
        } else {
            radio.works.push_back(work);
        }
        tracing::trace!(
            radio = %radio.name,
            iface = %iface,
            work = %id,
            kind = %kind,
            "radio work queued"
        );

        Ok((id, radio.admit(now)))
    }

    /// Finish a work and hand back its context.
    pub fn complete(
        &mut self,
        id: WorkId,
        now: Instant,
    ) -> Result<(C, Vec<WorkEvent<C>>), SchedulerError> {
        for radio in self.radios.values_mut() {
            if let Some(idx) = radio.works.iter().position(|work| work.id == id) {
                let work = radio.works.remove(idx).ok_or(SchedulerError::UnknownWork(id))?;
                tracing::debug!(
                    radio = %radio.name,
                    iface = %work.iface,
                    work = %id,
                    kind = %work.kind,
                    "radio work done"
                );
                let events = radio.admit(now);
                return Ok((work.ctx, events));
            }
        }
        Err(SchedulerError::UnknownWork(id))
    }

    /// Cancel works of `iface` (or of its whole radio), optionally only one
    /// kind. Started works are cancelled too.
    pub fn cancel_all(
        &mut self,
        iface: IfaceId,
        kind: Option<WorkKind>,
        scope: CancelScope,
        now: Instant,
    ) -> Vec<WorkEvent<C>> {
        let Some(radio) = self.iface_radio.get(&iface).and_then(|name| self.radios.get_mut(name))
        else {
            return Vec::new();
        };

        let mut events = radio.cancel_matching(|work| {
            let iface_match = scope == CancelScope::AllInterfaces || work.iface == iface;
            iface_match && kind.map_or(true, |kind| work.kind == kind)
        });
        if !events.is_empty() {
            events.extend(radio.admit(now));
        }
        events
    }

    /// Cancel a single work.
    pub fn cancel(
        &mut self,
        id: WorkId,
        now: Instant,
    ) -> Result<Vec<WorkEvent<C>>, SchedulerError> {
        let radio = self
            .radios
            .values_mut()
            .find(|radio| radio.works.iter().any(|work| work.id == id))
            .ok_or(SchedulerError::UnknownWork(id))?;

        let mut events = radio.cancel_matching(|work| work.id == id);
        events.extend(radio.admit(now));
        Ok(events)
    }

    /// Mark an externally triggered scan as running (or finished) on `radio`.
    /// Scan-class works wait while it runs.
    pub fn set_external_scan(
        &mut self,
        radio: &str,
        running: bool,
        now: Instant,
    ) -> Vec<WorkEvent<C>> {
        let Some(radio) = self.radios.get_mut(radio) else {
            return Vec::new();
        };
        radio.external_scan = running;
        if running { Vec::new() } else { radio.admit(now) }
    }

    /// True if `iface` has a queued or started work of `kind`.
    pub fn is_pending(&self, iface: IfaceId, kind: WorkKind) -> bool {
        self.iface_radio
            .get(&iface)
            .and_then(|name| self.radios.get(name))
            .is_some_and(|radio| {
                radio.works.iter().any(|work| work.iface == iface && work.kind == kind)
            })
    }

    /// True if a connect-class work runs on `radio`.
    pub fn is_connect_active(&self, radio: &str) -> bool {
        self.radios
            .get(radio)
            .is_some_and(|radio| radio.active().any(|work| work.kind.is_connect()))
    }

    /// Look up a work.
    pub fn work(&self, id: WorkId) -> Option<&RadioWork<C>> {
        self.radios.values().flat_map(|radio| radio.works.iter()).find(|work| work.id == id)
    }

    /// Works currently started on `radio`, in queue order.
    pub fn started_works(&self, radio: &str) -> Vec<&RadioWork<C>> {
        self.radios.get(radio).map(|radio| radio.active().collect()).unwrap_or_default()
    }

    /// Number of works (queued and started) on `radio`.
    pub fn queue_len(&self, radio: &str) -> usize {
        self.radios.get(radio).map_or(0, |radio| radio.works.len())
    }

    /// Radio `iface` is attached to.
    pub fn radio_of(&self, iface: IfaceId) -> Option<&str> {
        self.iface_radio.get(&iface).map(String::as_str)
    }

    /// True if a radio named `radio` exists.
    pub fn has_radio(&self, radio: &str) -> bool {
        self.radios.contains_key(radio)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const WLAN0: IfaceId = IfaceId(0);
    const P2P0: IfaceId = IfaceId(1);

    fn caps(simultaneous: bool) -> RadioCaps {
        RadioCaps {
            offchannel_simultaneous: simultaneous,
            bands: BandSet::GHZ_2_4 | BandSet::GHZ_5,
        }
    }

    fn scheduler(simultaneous: bool) -> RadioScheduler<Vec<u32>> {
        let mut sched = RadioScheduler::new(8);
        sched.attach(WLAN0, "phy0", caps(simultaneous));
        sched.attach(P2P0, "phy0", caps(simultaneous));
        sched
    }

    fn started(events: &[WorkEvent<Vec<u32>>]) -> Vec<WorkId> {
        events
            .iter()
            .filter_map(|event| match event {
                WorkEvent::Start { id, .. } => Some(*id),
                WorkEvent::Cancel { .. } => None,
            })
            .collect()
    }

    #[test]
    fn exclusive_radio_runs_one_work_at_a_time() {
        let now = Instant::now();
        let mut sched = scheduler(false);

        let (first, events) =
            sched.submit(WLAN0, WorkKind::Scan, 2412, false, Vec::new(), now).unwrap();
        assert_eq!(started(&events), vec![first]);

        let (second, events) =
            sched.submit(P2P0, WorkKind::GasQuery, 5180, false, Vec::new(), now).unwrap();
        assert!(events.is_empty());

        let (_, events) = sched.complete(first, now + Duration::from_millis(20)).unwrap();
        assert_eq!(started(&events), vec![second]);
    }

    #[test]
    fn disjoint_bands_share_capable_radio() {
        let now = Instant::now();
        let mut sched = scheduler(true);

        let (scan, _) = sched.submit(WLAN0, WorkKind::Scan, 2412, false, Vec::new(), now).unwrap();
        let (gas, events) =
            sched.submit(P2P0, WorkKind::GasQuery, 5180, false, Vec::new(), now).unwrap();

        assert_eq!(started(&events), vec![gas]);
        assert_eq!(sched.started_works("phy0").len(), 2);
        assert!(sched.work(scan).unwrap().is_started());
    }

    #[test]
    fn same_band_waits_on_capable_radio() {
        let now = Instant::now();
        let mut sched = scheduler(true);

        sched.submit(WLAN0, WorkKind::Scan, 2412, false, Vec::new(), now).unwrap();
        let (_, events) =
            sched.submit(P2P0, WorkKind::GasQuery, 2437, false, Vec::new(), now).unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn connect_runs_alone() {
        let now = Instant::now();
        let mut sched = scheduler(true);

        let (connect, events) =
            sched.submit(WLAN0, WorkKind::Connect, 2412, true, Vec::new(), now).unwrap();
        assert_eq!(started(&events), vec![connect]);

        let (_, events) =
            sched.submit(P2P0, WorkKind::GasQuery, 5180, false, Vec::new(), now).unwrap();
        assert!(events.is_empty());
        assert!(sched.is_connect_active("phy0"));
    }

    #[test]
    fn queued_connect_blocks_later_works() {
        let now = Instant::now();
        let mut sched = scheduler(true);

        sched.submit(P2P0, WorkKind::RemainOnChannel, 2412, false, Vec::new(), now).unwrap();
        sched.submit(WLAN0, WorkKind::Connect, 5180, false, Vec::new(), now).unwrap();
        let (_, events) =
            sched.submit(WLAN0, WorkKind::GasQuery, 5180, false, Vec::new(), now).unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn second_scan_on_same_interface_waits() {
        let now = Instant::now();
        let mut sched = scheduler(true);

        sched.submit(WLAN0, WorkKind::Scan, 2412, false, Vec::new(), now).unwrap();
        let (_, events) =
            sched.submit(WLAN0, WorkKind::P2pScan, 5180, false, Vec::new(), now).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn scan_frequency_list_defines_bands() {
        let now = Instant::now();
        let mut sched = scheduler(true);

        let (scan, _) =
            sched.submit(WLAN0, WorkKind::Scan, 0, false, vec![2412, 2437], now).unwrap();
        assert_eq!(sched.work(scan).unwrap().bands(), BandSet::GHZ_2_4);

        let (full, _) = sched.submit(P2P0, WorkKind::P2pScan, 0, false, Vec::new(), now).unwrap();
        assert_eq!(sched.work(full).unwrap().bands(), BandSet::GHZ_2_4 | BandSet::GHZ_5);
        assert!(!sched.work(full).unwrap().is_started());
    }

    #[test]
    fn cancel_returns_context_of_started_work() {
        let now = Instant::now();
        let mut sched = scheduler(false);

        let (scan, _) = sched.submit(WLAN0, WorkKind::Scan, 0, false, vec![2412], now).unwrap();
        let (gas, _) = sched.submit(P2P0, WorkKind::GasQuery, 0, false, Vec::new(), now).unwrap();

        let events = sched.cancel_all(WLAN0, None, CancelScope::Interface, now);
        assert_eq!(
            events[0],
            WorkEvent::Cancel {
                id: scan,
                iface: WLAN0,
                kind: WorkKind::Scan,
                started: true,
                ctx: vec![2412],
            }
        );
        assert_eq!(started(&events), vec![gas]);
    }

    #[test]
    fn external_scan_holds_scans_only() {
        let now = Instant::now();
        let mut sched = scheduler(false);
        sched.set_external_scan("phy0", true, now);

        let (scan, events) =
            sched.submit(WLAN0, WorkKind::Scan, 0, false, Vec::new(), now).unwrap();
        assert!(events.is_empty());

        let events = sched.set_external_scan("phy0", false, now);
        assert_eq!(started(&events), vec![scan]);
    }

    #[test]
    fn queue_capacity_and_unknown_lookups() {
        let now = Instant::now();
        let mut sched: RadioScheduler<()> = RadioScheduler::new(1);
        sched.attach(WLAN0, "phy0", caps(false));

        sched.submit(WLAN0, WorkKind::Scan, 0, false, (), now).unwrap();
        assert_eq!(
            sched.submit(WLAN0, WorkKind::Scan, 0, false, (), now).unwrap_err(),
            SchedulerError::QueueFull { radio: "phy0".to_string(), capacity: 1 }
        );
        assert_eq!(
            sched.submit(P2P0, WorkKind::Scan, 0, false, (), now).unwrap_err(),
            SchedulerError::NotAttached(P2P0)
        );
        assert_eq!(
            sched.complete(WorkId(99), now).unwrap_err(),
            SchedulerError::UnknownWork(WorkId(99))
        );
    }

    #[test]
    fn last_detach_destroys_radio() {
        let now = Instant::now();
        let mut sched = scheduler(false);

        sched.submit(WLAN0, WorkKind::Scan, 0, false, Vec::new(), now).unwrap();
        let (gas, _) = sched.submit(P2P0, WorkKind::GasQuery, 0, false, Vec::new(), now).unwrap();

        let events = sched.detach(WLAN0, now);
        assert_eq!(started(&events), vec![gas]);
        assert!(sched.has_radio("phy0"));

        let events = sched.detach(P2P0, now);
        assert!(matches!(
            events.as_slice(),
            [WorkEvent::Cancel { id, started: true, .. }] if *id == gas
        ));
        assert!(!sched.has_radio("phy0"));
        assert!(!sched.is_pending(P2P0, WorkKind::GasQuery));
    }
}
