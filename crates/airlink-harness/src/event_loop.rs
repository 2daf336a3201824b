//! Async event loop around a simulated supplicant.
//!
//! The core is sans-IO; something has to own it, feed it driver events and
//! control commands, and wake it for timers. This loop does that on a single
//! tokio task:
//!
//! ```text
//! ┌────────────┐  LoopInput   ┌───────────┐  SupplicantAction  ┌──────────┐
//! │ test / CLI │ ───────────▶ │ EventLoop │ ─────────────────▶ │ listener │
//! └────────────┘              └─────┬─────┘                    └──────────┘
//!                                   │ sleep until next_deadline()
//!                                   ▼
//!                        Supplicant + SimDriver outbox
//! ```
//!
//! Under Turmoil the sleeps run on virtual time, so minute-long backoff
//! schedules finish instantly and identically on every run.

use std::time::Duration;

use airlink_core::{
    ControlCommand, ControlReply, DriverEvent, Environment, IfaceId, StationError, Supplicant,
    SupplicantAction,
};
use tokio::sync::{mpsc, oneshot};

use crate::{SimCatalog, SimDriver, SimHandshake};

/// Input to the event loop.
#[derive(Debug)]
pub enum LoopInput {
    /// Execute a control command and answer on `reply`
    Command {
        /// Interface
        iface: IfaceId,
        /// Command
        command: ControlCommand,
        /// Where the reply goes
        reply: oneshot::Sender<Result<ControlReply, StationError>>,
    },
    /// Queue a driver event as if the driver had reported it
    Event {
        /// Interface
        iface: IfaceId,
        /// Event
        event: DriverEvent,
    },
    /// Stop the loop
    Shutdown,
}

enum Wake {
    Input(Option<LoopInput>),
    Timer,
}

/// Single-task event loop driving a supplicant on simulated hardware.
pub struct EventLoop<E> {
    supplicant: Supplicant<E, SimDriver, SimHandshake>,
    catalog: SimCatalog,
    inputs: mpsc::UnboundedReceiver<LoopInput>,
    outputs: mpsc::UnboundedSender<SupplicantAction>,
}

impl<E: Environment> EventLoop<E> {
    /// Create a loop reading `inputs` and publishing actions on `outputs`.
    pub fn new(
        supplicant: Supplicant<E, SimDriver, SimHandshake>,
        inputs: mpsc::UnboundedReceiver<LoopInput>,
        outputs: mpsc::UnboundedSender<SupplicantAction>,
    ) -> Self {
        Self { supplicant, catalog: SimCatalog::new(), inputs, outputs }
    }

    /// The supplicant
    pub fn supplicant(&self) -> &Supplicant<E, SimDriver, SimHandshake> {
        &self.supplicant
    }

    /// The scan result catalog
    pub fn catalog(&self) -> &SimCatalog {
        &self.catalog
    }

    /// Run until [`LoopInput::Shutdown`] arrives or every sender is gone,
    /// then hand the loop back for inspection.
    pub async fn run(mut self) -> Self {
        let env = self.supplicant.env().clone();
        tracing::debug!("event loop started");

        loop {
            self.drain_driver(&env);

            let wait = self
                .supplicant
                .next_deadline()
                .map(|at| at.saturating_duration_since(env.now()));
            let wake = tokio::select! {
                input = self.inputs.recv() => Wake::Input(input),
                () = sleep_for(&env, wait) => Wake::Timer,
            };

            match wake {
                Wake::Input(Some(LoopInput::Command { iface, command, reply })) => {
                    let result = self
                        .supplicant
                        .handle_command(iface, command, &self.catalog, env.now())
                        .map(|(answer, actions)| {
                            self.dispatch(actions);
                            answer
                        });
                    if reply.send(result).is_err() {
                        tracing::debug!(iface = %iface, "command reply dropped");
                    }
                },
                Wake::Input(Some(LoopInput::Event { iface, event })) => {
                    self.supplicant.driver_mut().inject(iface, event);
                },
                Wake::Input(Some(LoopInput::Shutdown) | None) => break,
                Wake::Timer => match self.supplicant.tick(&self.catalog, env.now()) {
                    Ok(actions) => self.dispatch(actions),
                    Err(err) => tracing::warn!(error = %err, "tick failed"),
                },
            }
        }

        tracing::debug!("event loop stopped");
        self
    }

    /// Feed every queued driver event to the supplicant.
    fn drain_driver(&mut self, env: &E) {
        while self.supplicant.driver().has_events() {
            for (iface, event) in self.supplicant.driver_mut().take_events() {
                if event == DriverEvent::ScanResults {
                    let visible = self.supplicant.driver().visible();
                    self.catalog.store(iface, visible);
                }
                match self.supplicant.handle_event(iface, event, &self.catalog, env.now()) {
                    Ok(actions) => self.dispatch(actions),
                    Err(err) => tracing::warn!(iface = %iface, error = %err, "driver event failed"),
                }
            }
        }
    }

    fn dispatch(&mut self, actions: Vec<SupplicantAction>) {
        for action in actions {
            if let SupplicantAction::FlushBss { iface } = action {
                self.catalog.flush(iface);
            }
            if self.outputs.send(action).is_err() {
                tracing::trace!("action listener gone");
            }
        }
    }
}

async fn sleep_for<E: Environment>(env: &E, wait: Option<Duration>) {
    match wait {
        Some(wait) => env.sleep(wait).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use airlink_core::{
        CandidateBss, ConnectionState, DriverCapabilities, GlobalConfig, NetworkProfile, ProfileId,
        StationConfig,
    };
    use airlink_proto::MacAddr;

    use super::*;
    use crate::{SimAp, SimEnv};

    const AP: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 1]);
    const STA: IfaceId = IfaceId(0);

    #[test]
    fn loop_connects_and_shuts_down() {
        let mut sim = turmoil::Builder::new().build();

        sim.client("station", async {
            let mut driver = SimDriver::new(DriverCapabilities::default());
            driver.add_ap(SimAp::open(CandidateBss::new(AP, "cafe", 2412)));
            let env = SimEnv::new();
            let mut supplicant =
                Supplicant::new(env, driver, SimHandshake::new(), GlobalConfig::default());
            supplicant.add_interface(STA, "phy0", StationConfig::default(), true);
            supplicant.add_network(STA, NetworkProfile::open(ProfileId(0), "cafe"))?;

            let (tx, rx) = mpsc::unbounded_channel();
            let (out_tx, _out_rx) = mpsc::unbounded_channel();
            let event_loop = EventLoop::new(supplicant, rx, out_tx);

            let script = async move {
                let (reply, answer) = oneshot::channel();
                let command = ControlCommand::Connect { network: None };
                tx.send(LoopInput::Command { iface: STA, command, reply })?;
                assert_eq!(answer.await?, Ok(ControlReply::Ok));

                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(LoopInput::Shutdown)?;
                Ok::<_, Box<dyn std::error::Error>>(())
            };

            let (event_loop, script) = tokio::join!(event_loop.run(), script);
            script?;

            let station = event_loop.supplicant().station(STA).expect("station");
            assert_eq!(station.state(), ConnectionState::Completed);
            Ok(())
        });

        sim.run().expect("simulation failed");
    }
}
