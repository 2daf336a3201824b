//! Property-based tests for the radio work scheduler.
//!
//! Random interleavings of submit, complete and cancel on two interfaces
//! sharing one radio must keep the admission rules:
//! - at most one started work without simultaneous off-channel support, at
//!   most `MAX_ACTIVE_WORKS` with it
//! - a started connect-class work runs alone
//! - concurrently started works differ in kind and use disjoint bands
//! - every queued work leaves exactly once, by completion or cancellation,
//!   and its context comes back intact

use std::{collections::BTreeMap, time::Instant};

use airlink_core::{
    IfaceId, RadioScheduler, WorkId, WorkKind,
    radio::{CancelScope, MAX_ACTIVE_WORKS, RadioCaps, WorkEvent},
};
use airlink_proto::BandSet;
use proptest::prelude::*;

const RADIO: &str = "phy0";

#[derive(Debug, Clone)]
enum Op {
    Submit { iface: u32, kind: WorkKind, freq: u32, next: bool },
    CompleteStarted { pick: usize },
    CancelKind { iface: u32, kind: Option<WorkKind>, all: bool },
    ExternalScan(bool),
}

fn kind() -> impl Strategy<Value = WorkKind> {
    prop_oneof![
        Just(WorkKind::Scan),
        Just(WorkKind::P2pScan),
        Just(WorkKind::Connect),
        Just(WorkKind::SmeConnect),
        Just(WorkKind::RemainOnChannel),
        Just(WorkKind::SendAction),
        Just(WorkKind::GasQuery),
        Just(WorkKind::DppListen),
    ]
}

fn freq() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), Just(2412), Just(2437), Just(5180)]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u32..2, kind(), freq(), any::<bool>())
            .prop_map(|(iface, kind, freq, next)| Op::Submit { iface, kind, freq, next }),
        3 => any::<usize>().prop_map(|pick| Op::CompleteStarted { pick }),
        1 => (0u32..2, proptest::option::of(kind()), any::<bool>())
            .prop_map(|(iface, kind, all)| Op::CancelKind { iface, kind, all }),
        1 => any::<bool>().prop_map(Op::ExternalScan),
    ]
}

/// Works still owned by the scheduler, with the context they were queued with.
struct Ledger {
    live: BTreeMap<WorkId, Vec<u32>>,
    started: BTreeMap<WorkId, bool>,
}

impl Ledger {
    fn apply(&mut self, events: Vec<WorkEvent<Vec<u32>>>) -> Result<(), TestCaseError> {
        for event in events {
            match event {
                WorkEvent::Start { id, .. } => {
                    prop_assert!(self.live.contains_key(&id), "start for unknown work {id}");
                    let was_started = self.started.insert(id, true);
                    prop_assert_eq!(was_started, Some(false), "work {} started twice", id);
                },
                WorkEvent::Cancel { id, ctx, .. } => {
                    let queued = self.live.remove(&id);
                    prop_assert_eq!(queued.as_ref(), Some(&ctx), "cancel for unknown work {}", id);
                    self.started.remove(&id);
                },
            }
        }
        Ok(())
    }
}

fn check_admission(
    scheduler: &RadioScheduler<Vec<u32>>,
    simultaneous: bool,
) -> Result<(), TestCaseError> {
    let started = scheduler.started_works(RADIO);
    let limit = if simultaneous { MAX_ACTIVE_WORKS } else { 1 };
    prop_assert!(started.len() <= limit, "{} works started", started.len());

    if started.len() > 1 {
        prop_assert!(started.iter().all(|work| !work.kind().is_connect()));
        for (i, a) in started.iter().enumerate() {
            for b in &started[i + 1..] {
                prop_assert_ne!(a.kind(), b.kind());
                prop_assert!(a.bands().is_disjoint_from(b.bands()));
            }
        }
    }
    Ok(())
}

fn run_ops(simultaneous: bool, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let now = Instant::now();
    let mut scheduler = RadioScheduler::new(8);
    let caps = RadioCaps {
        offchannel_simultaneous: simultaneous,
        bands: BandSet::GHZ_2_4 | BandSet::GHZ_5,
    };
    scheduler.attach(IfaceId(0), RADIO, caps);
    scheduler.attach(IfaceId(1), RADIO, caps);

    let mut ledger = Ledger { live: BTreeMap::new(), started: BTreeMap::new() };

    for op in ops {
        match op {
            Op::Submit { iface, kind, freq, next } => {
                let ctx = if freq == 0 { Vec::new() } else { vec![freq] };
                if let Ok((id, events)) =
                    scheduler.submit(IfaceId(iface), kind, freq, next, ctx.clone(), now)
                {
                    ledger.live.insert(id, ctx);
                    ledger.started.insert(id, false);
                    ledger.apply(events)?;
                } else {
                    prop_assert_eq!(scheduler.queue_len(RADIO), 8);
                }
            },
            Op::CompleteStarted { pick } => {
                let started: Vec<WorkId> =
                    scheduler.started_works(RADIO).iter().map(|w| w.id()).collect();
                if started.is_empty() {
                    continue;
                }
                let id = started[pick % started.len()];
                let (ctx, events) = scheduler.complete(id, now).expect("started work completes");
                prop_assert_eq!(ledger.live.remove(&id), Some(ctx));
                ledger.started.remove(&id);
                ledger.apply(events)?;
            },
            Op::CancelKind { iface, kind, all } => {
                let scope = if all { CancelScope::AllInterfaces } else { CancelScope::Interface };
                let events = scheduler.cancel_all(IfaceId(iface), kind, scope, now);
                ledger.apply(events)?;
            },
            Op::ExternalScan(running) => {
                let events = scheduler.set_external_scan(RADIO, running, now);
                ledger.apply(events)?;
            },
        }

        check_admission(&scheduler, simultaneous)?;
        prop_assert_eq!(scheduler.queue_len(RADIO), ledger.live.len());
    }

    // Detaching both interfaces hands back everything still queued
    for iface in [IfaceId(0), IfaceId(1)] {
        let events = scheduler.detach(iface, now);
        ledger.apply(events)?;
    }
    prop_assert!(ledger.live.is_empty(), "works leaked: {:?}", ledger.live);
    Ok(())
}

#[test]
fn prop_admission_rules_hold_without_simultaneous_offchannel() {
    proptest!(|(ops in proptest::collection::vec(op(), 1..60))| {
        run_ops(false, ops)?;
    });
}

#[test]
fn prop_admission_rules_hold_with_simultaneous_offchannel() {
    proptest!(|(ops in proptest::collection::vec(op(), 1..60))| {
        run_ops(true, ops)?;
    });
}
