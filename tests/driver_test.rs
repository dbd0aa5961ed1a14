use evse_controller::config::Config;
use evse_controller::controller::{EvseState, RequestSource};
use evse_controller::driver::{DriverCommand, EvseDriver};
use evse_controller::hardware::{ManualClock, SimHandle, SimulatedHardware};
use evse_controller::meter::SimulatedMeter;
use evse_controller::session::SessionStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

struct Harness {
    driver: EvseDriver,
    sim: SimHandle,
    clock: ManualClock,
    _tx: mpsc::UnboundedSender<DriverCommand>,
}

fn harness(config: Config) -> Harness {
    let (hw, sim) = SimulatedHardware::new(config.pilot.adc_to_voltage);
    let clock = ManualClock::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let meter = SimulatedMeter::new(230.0, 10.0);
    let driver = EvseDriver::new(
        config,
        Box::new(hw),
        Box::new(meter),
        Arc::new(clock.clone()),
        rx,
    )
    .with_simulator(sim.clone());
    Harness {
        driver,
        sim,
        clock,
        _tx: tx,
    }
}

fn config_in(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.state_file = dir.path().join("state.json").display().to_string();
    config
}

impl Harness {
    fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.clock.advance(Duration::from_millis(10));
            self.driver.tick();
        }
    }
}

#[test]
fn buttons_drive_two_press_start_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(config_in(&dir));
    h.driver.start();
    h.sim.set_cp_voltage(6.0);
    h.ticks(5);

    h.sim.set_start_button(false);
    h.ticks(1);
    assert_eq!(h.driver.controller().state(), EvseState::WaitingForAuth);

    // Release inside the debounce window is ignored
    h.sim.set_start_button(true);
    h.ticks(5);
    assert_eq!(h.driver.controller().state(), EvseState::WaitingForAuth);

    h.ticks(30);
    h.sim.set_start_button(false);
    h.ticks(1);
    assert_eq!(h.driver.controller().state(), EvseState::Charging);
    assert!(h.sessions_active());

    h.sim.set_stop_button(false);
    h.ticks(1);
    assert_eq!(h.driver.controller().state(), EvseState::Idle);
    assert!(!h.sessions_active());
    let last = h.driver.sessions().last_session().unwrap();
    assert_eq!(last.status, SessionStatus::Completed);
}

impl Harness {
    fn sessions_active(&self) -> bool {
        self.driver.sessions().current_session.is_some()
    }
}

#[test]
fn commands_reply_and_persist_settings() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let state_file = config.state_file.clone();
    let mut h = harness(config.clone());
    h.driver.start();

    let (tx, mut rx) = oneshot::channel();
    assert!(h.driver.handle_command(DriverCommand::SetCurrentLimit { amps: 3, reply: tx }));
    assert_eq!(rx.try_recv().unwrap(), 6);

    assert!(h.driver.handle_command(DriverCommand::SetEnabled(false)));
    assert_eq!(h.driver.controller().state(), EvseState::Disabled);

    let (tx, mut rx) = oneshot::channel();
    h.driver.handle_command(DriverCommand::StartCharging {
        source: RequestSource::Api,
        reply: tx,
    });
    assert!(rx.try_recv().unwrap().is_err());

    assert!(!h.driver.handle_command(DriverCommand::Shutdown));

    // A new driver on the same state file restores the settings
    let saved = std::fs::read_to_string(&state_file).unwrap();
    assert!(saved.contains("\"enabled\": false"));
    let mut h2 = harness(config);
    h2.driver.start();
    assert_eq!(h2.driver.controller().state(), EvseState::Disabled);
    assert_eq!(h2.driver.controller().offered_current(), 6);
}

#[test]
fn simulate_and_snapshot_follow_the_board() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(config_in(&dir));
    let snapshots = h.driver.subscribe_snapshot();
    h.driver.start();

    h.driver
        .handle_command(DriverCommand::Simulate(evse_controller::hardware::SimInputs {
            cp_voltage: Some(6.0),
            ..Default::default()
        }));
    let (tx, mut rx) = oneshot::channel();
    h.driver.handle_command(DriverCommand::StartChargingRemote {
        source: RequestSource::Remote,
        limit_amps: Some(10),
        reply: tx,
    });
    assert_eq!(rx.try_recv().unwrap(), Ok(()));
    h.ticks(1);

    let snap = snapshots.borrow().clone();
    assert_eq!(snap.controller.state, EvseState::Charging);
    assert!(snap.controller.contactor_closed);
    assert_eq!(snap.controller.offered_current_amps, 10);
    assert_eq!(snap.driver_state, "Running");
    assert_eq!(snap.session["session_active"], true);
}

#[test]
fn session_energy_is_booked_into_lifetime_total() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(config_in(&dir));
    h.driver.start();
    h.sim.set_cp_voltage(6.0);
    h.ticks(1);

    let (tx, _rx) = oneshot::channel();
    h.driver.handle_command(DriverCommand::StartChargingRemote {
        source: RequestSource::Api,
        limit_amps: None,
        reply: tx,
    });
    // One hour at 2300 W
    for _ in 0..360 {
        h.clock.advance(Duration::from_secs(10));
        h.driver.tick();
    }
    h.sim.set_cp_voltage(12.0);
    h.ticks(1);

    let snap = h.driver.subscribe_snapshot().borrow().clone();
    assert!((snap.lifetime_energy_kwh - 2.3).abs() < 1e-9);
    let last = h.driver.sessions().last_session().unwrap();
    assert!((last.energy_delivered_kwh - 2.3).abs() < 1e-9);
}

#[test]
fn restart_mid_session_books_interrupted_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let state_file = config.state_file.clone();
    let mut h = harness(config.clone());
    h.driver.start();
    h.sim.set_cp_voltage(6.0);
    h.ticks(1);

    let (tx, mut rx) = oneshot::channel();
    h.driver.handle_command(DriverCommand::StartChargingRemote {
        source: RequestSource::Remote,
        limit_amps: None,
        reply: tx,
    });
    assert_eq!(rx.try_recv().unwrap(), Ok(()));
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&state_file).unwrap()).unwrap();
    assert!(saved["sessions"]["current"].is_object());

    // Six minutes at 2300 W, then power is lost without a shutdown
    for _ in 0..36 {
        h.clock.advance(Duration::from_secs(10));
        h.driver.tick();
    }
    drop(h);

    let mut h2 = harness(config);
    h2.driver.start();
    let history = h2.driver.sessions().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SessionStatus::Interrupted);
    assert!((history[0].energy_delivered_kwh - 0.23).abs() < 1e-9);
    let snap = h2.driver.subscribe_snapshot().borrow().clone();
    assert!((snap.lifetime_energy_kwh - 0.23).abs() < 1e-9);
    assert_eq!(h2.driver.controller().state(), EvseState::Idle);
}

#[test]
fn remote_start_limit_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let mut h = harness(config.clone());
    h.driver.start();
    h.sim.set_cp_voltage(6.0);
    h.ticks(1);

    let (tx, mut rx) = oneshot::channel();
    h.driver.handle_command(DriverCommand::StartChargingRemote {
        source: RequestSource::Remote,
        limit_amps: Some(20),
        reply: tx,
    });
    assert_eq!(rx.try_recv().unwrap(), Ok(()));
    assert!(!h.driver.handle_command(DriverCommand::Shutdown));

    let mut h2 = harness(config);
    h2.driver.start();
    assert_eq!(h2.driver.controller().offered_current(), 20);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let (hw, _sim) = SimulatedHardware::new(config.pilot.adc_to_voltage);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut driver = EvseDriver::new(
        config.clone(),
        Box::new(hw),
        Box::new(SimulatedMeter::from_config(&config.meter)),
        Arc::new(evse_controller::hardware::SystemClock::new()),
        rx,
    );
    let state = driver.subscribe_state();
    let task = tokio::spawn(async move { driver.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(DriverCommand::Shutdown).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(
        *state.borrow(),
        evse_controller::driver::DriverState::ShuttingDown
    );
}
