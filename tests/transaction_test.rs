use evse_controller::config::Config;
use evse_controller::controller::{EvseController, EvseState, Rejection};
use evse_controller::hardware::{ManualClock, SimHandle, SimulatedHardware};
use evse_controller::meter::SimulatedMeter;
use evse_controller::transaction::{BridgeAction, TransactionBridge, TransactionStatus};
use std::sync::Arc;

fn controller() -> (EvseController, SimHandle) {
    let config = Config::default();
    let (hw, sim) = SimulatedHardware::new(config.pilot.adc_to_voltage);
    let mut ctl = EvseController::new(
        &config,
        Box::new(hw),
        Box::new(SimulatedMeter::from_config(&config.meter)),
        Arc::new(ManualClock::new()),
    );
    ctl.begin();
    (ctl, sim)
}

fn status(active: bool, permits_charge: bool) -> TransactionStatus {
    TransactionStatus {
        active,
        permits_charge,
        transaction_id: active.then_some(42),
    }
}

#[test]
fn first_observation_only_records_baseline() {
    let (mut ctl, sim) = controller();
    sim.set_cp_voltage(6.0);
    let mut bridge = TransactionBridge::new();

    // Already active at boot: no start
    assert_eq!(
        bridge.observe(status(true, true), &mut ctl),
        BridgeAction::Initialized
    );
    ctl.step();
    assert_eq!(ctl.state(), EvseState::Idle);
}

#[test]
fn transaction_edges_start_and_stop_charging() {
    let (mut ctl, sim) = controller();
    sim.set_cp_voltage(6.0);
    ctl.step();
    let mut bridge = TransactionBridge::new();
    bridge.observe(status(false, false), &mut ctl);

    assert_eq!(
        bridge.observe(status(true, true), &mut ctl),
        BridgeAction::RemoteStart(Ok(()))
    );
    assert_eq!(ctl.state(), EvseState::Charging);

    // No edge, no action
    assert_eq!(
        bridge.observe(status(true, true), &mut ctl),
        BridgeAction::None
    );

    assert_eq!(
        bridge.observe(status(false, true), &mut ctl),
        BridgeAction::Stop(Ok(()))
    );
    ctl.step();
    assert_eq!(ctl.state(), EvseState::Idle);
}

#[test]
fn revoked_permission_stops_charging() {
    let (mut ctl, sim) = controller();
    sim.set_cp_voltage(6.0);
    let mut bridge = TransactionBridge::new();
    bridge.observe(status(false, false), &mut ctl);
    bridge.observe(status(true, true), &mut ctl);
    assert_eq!(ctl.state(), EvseState::Charging);

    assert_eq!(
        bridge.observe(status(true, false), &mut ctl),
        BridgeAction::Stop(Ok(()))
    );
    ctl.step();
    assert_eq!(ctl.state(), EvseState::Idle);
}

#[test]
fn remote_start_without_vehicle_is_rejected() {
    let (mut ctl, _sim) = controller();
    let mut bridge = TransactionBridge::new();
    bridge.observe(status(false, false), &mut ctl);
    assert_eq!(
        bridge.observe(status(true, true), &mut ctl),
        BridgeAction::RemoteStart(Err(Rejection::VehicleNotConnected))
    );
}

#[test]
fn remote_start_command_applies_limit() {
    let (mut ctl, sim) = controller();
    sim.set_cp_voltage(6.0);
    let bridge = TransactionBridge::new();

    bridge.on_remote_start(None, &mut ctl).unwrap();
    assert_eq!(ctl.offered_current(), 16);
    assert_eq!(ctl.state(), EvseState::Charging);

    bridge.on_remote_stop(&mut ctl).unwrap();
    ctl.step();
    assert_eq!(ctl.state(), EvseState::Idle);

    bridge.on_remote_start(Some(40), &mut ctl).unwrap();
    assert_eq!(ctl.offered_current(), 32);
    ctl.step();
    assert_eq!(ctl.state(), EvseState::Charging);
    assert_eq!(bridge.on_remote_stop(&mut ctl), Ok(()));
}
