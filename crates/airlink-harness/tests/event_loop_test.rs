//! The event loop under Turmoil: timers run on virtual time, so minute-long
//! backoff schedules complete instantly.

use std::time::Duration;

use airlink_core::{
    CandidateBss, ControlCommand, ControlReply, DriverCapabilities, DriverEvent, GlobalConfig,
    IfaceId, NetworkProfile, Notification, ProfileId, StationConfig, Supplicant, SupplicantAction,
};
use airlink_harness::{EventLoop, LoopInput, SimAp, SimDriver, SimEnv, SimHandshake};
use airlink_proto::{KeyMgmt, MacAddr, ReasonCode, RsnCapabilities, SecurityIe};
use tokio::sync::{mpsc, oneshot};

const AP: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 1]);
const STA: IfaceId = IfaceId(0);

fn supplicant(passphrase: &str) -> Supplicant<SimEnv, SimDriver, SimHandshake> {
    let bss = CandidateBss::new(AP, "home", 2412)
        .with_rsn(SecurityIe::rsn(KeyMgmt::PSK, RsnCapabilities::empty()));
    let mut driver = SimDriver::new(DriverCapabilities::default());
    driver.add_ap(SimAp::new(bss, "correct horse"));

    let mut supplicant =
        Supplicant::new(SimEnv::new(), driver, SimHandshake::new(), GlobalConfig::default());
    supplicant.add_interface(STA, "phy0", StationConfig::default(), true);
    supplicant
        .add_network(STA, NetworkProfile::psk(ProfileId(0), "home", passphrase))
        .expect("add network");
    supplicant
}

async fn command(
    tx: &mpsc::UnboundedSender<LoopInput>,
    command: ControlCommand,
) -> Result<ControlReply, Box<dyn std::error::Error>> {
    let (reply, answer) = oneshot::channel();
    tx.send(LoopInput::Command { iface: STA, command, reply })?;
    Ok(answer.await??)
}

fn notifications(rx: &mut mpsc::UnboundedReceiver<SupplicantAction>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(action) = rx.try_recv() {
        if let SupplicantAction::Notify { notification, .. } = action {
            out.push(notification);
        }
    }
    out
}

#[test]
fn backoff_runs_on_virtual_time() {
    let mut sim =
        turmoil::Builder::new().simulation_duration(Duration::from_secs(120)).build();

    sim.client("station", async {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(supplicant("battery staple"), rx, out_tx);

        let script = async move {
            command(&tx, ControlCommand::Connect { network: None }).await?;
            tokio::time::sleep(Duration::from_secs(65)).await;
            tx.send(LoopInput::Shutdown)?;
            Ok::<_, Box<dyn std::error::Error>>(())
        };

        let (_event_loop, script) = tokio::join!(event_loop.run(), script);
        script?;

        let durations: Vec<u64> = notifications(&mut out_rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::SsidTempDisabled { duration, .. } => Some(duration.as_secs()),
                _ => None,
            })
            .collect();
        assert_eq!(durations, vec![10, 20, 30, 60]);
        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn injected_deauth_triggers_reconnect() {
    let mut sim = turmoil::Builder::new().build();

    sim.client("station", async {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(supplicant("correct horse"), rx, out_tx);

        let script = async move {
            command(&tx, ControlCommand::Connect { network: None }).await?;
            tokio::time::sleep(Duration::from_millis(50)).await;

            let event = DriverEvent::Deauthenticated {
                bssid: AP,
                reason: ReasonCode::UNSPECIFIED,
                locally_generated: false,
            };
            tx.send(LoopInput::Event { iface: STA, event })?;
            tokio::time::sleep(Duration::from_secs(1)).await;

            let status = command(&tx, ControlCommand::Status).await?;
            tx.send(LoopInput::Shutdown)?;
            Ok::<_, Box<dyn std::error::Error>>(status)
        };

        let (event_loop, status) = tokio::join!(event_loop.run(), script);
        assert!(status?.to_string().contains("wpa_state=COMPLETED"));

        let connected = notifications(&mut out_rx)
            .iter()
            .filter(|n| matches!(n, Notification::Connected { .. }))
            .count();
        assert_eq!(connected, 2);
        assert_eq!(event_loop.supplicant().driver().association(STA), Some(AP));
        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn unknown_interface_is_reported_to_the_caller() {
    let mut sim = turmoil::Builder::new().build();

    sim.client("station", async {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(supplicant("correct horse"), rx, out_tx);

        let script = async move {
            let (reply, answer) = oneshot::channel();
            let command = ControlCommand::Status;
            tx.send(LoopInput::Command { iface: IfaceId(9), command, reply })?;
            let result = answer.await?;
            drop(tx);
            Ok::<_, Box<dyn std::error::Error>>(result)
        };

        let (_event_loop, result) = tokio::join!(event_loop.run(), script);
        assert!(result?.is_err());
        Ok(())
    });

    sim.run().expect("simulation failed");
}
