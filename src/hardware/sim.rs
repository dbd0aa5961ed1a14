//! Simulated charge point hardware
//!
//! Used by the host build, the HTTP `simulate` endpoint and the tests. The
//! pilot is simulated in volts and converted to ADC counts with the same
//! scale factor the controller uses to convert back.

use super::EvseHardware;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct SimState {
    cp_voltage: f64,
    rcd_ok: bool,
    emergency_stop_released: bool,
    start_button: bool,
    stop_button: bool,
    contactor_closed: bool,
    duty_count: u32,
    pwm_setup: Option<(u32, u8)>,
}

/// Partial update of the simulated inputs; `None` fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimInputs {
    pub cp_voltage: Option<f64>,
    pub rcd_ok: Option<bool>,
    pub emergency_stop_released: Option<bool>,
}

/// Simulated board, handed to the controller
#[derive(Debug)]
pub struct SimulatedHardware {
    state: Arc<Mutex<SimState>>,
    adc_to_voltage: f64,
}

/// Handle for poking inputs and observing outputs of a [`SimulatedHardware`]
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    // A panicked test thread must not take the simulation down with it
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedHardware {
    /// New board with no vehicle (12 V pilot), healthy RCD and released e-stop
    pub fn new(adc_to_voltage: f64) -> (Self, SimHandle) {
        let state = Arc::new(Mutex::new(SimState {
            cp_voltage: 12.0,
            rcd_ok: true,
            emergency_stop_released: true,
            start_button: true,
            stop_button: true,
            contactor_closed: false,
            duty_count: 0,
            pwm_setup: None,
        }));
        let handle = SimHandle {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                adc_to_voltage,
            },
            handle,
        )
    }
}

impl EvseHardware for SimulatedHardware {
    fn configure_pwm(&mut self, frequency_hz: u32, resolution_bits: u8) {
        lock(&self.state).pwm_setup = Some((frequency_hz, resolution_bits));
    }

    fn write_pwm_duty(&mut self, count: u32) {
        lock(&self.state).duty_count = count;
    }

    fn set_contactor(&mut self, closed: bool) {
        lock(&self.state).contactor_closed = closed;
    }

    fn read_cp_adc(&mut self) -> u16 {
        let volts = lock(&self.state).cp_voltage;
        let counts = (volts / self.adc_to_voltage).round();
        counts.clamp(0.0, f64::from(u16::MAX)) as u16
    }

    fn rcd_ok(&mut self) -> bool {
        lock(&self.state).rcd_ok
    }

    fn emergency_stop_released(&mut self) -> bool {
        lock(&self.state).emergency_stop_released
    }

    fn start_button_level(&mut self) -> bool {
        lock(&self.state).start_button
    }

    fn stop_button_level(&mut self) -> bool {
        lock(&self.state).stop_button
    }
}

impl SimHandle {
    pub fn set_cp_voltage(&self, volts: f64) {
        lock(&self.state).cp_voltage = volts;
    }

    pub fn set_rcd_ok(&self, ok: bool) {
        lock(&self.state).rcd_ok = ok;
    }

    pub fn set_emergency_stop_released(&self, released: bool) {
        lock(&self.state).emergency_stop_released = released;
    }

    pub fn set_start_button(&self, level: bool) {
        lock(&self.state).start_button = level;
    }

    pub fn set_stop_button(&self, level: bool) {
        lock(&self.state).stop_button = level;
    }

    pub fn apply(&self, inputs: &SimInputs) {
        let mut s = lock(&self.state);
        if let Some(v) = inputs.cp_voltage {
            s.cp_voltage = v;
        }
        if let Some(ok) = inputs.rcd_ok {
            s.rcd_ok = ok;
        }
        if let Some(released) = inputs.emergency_stop_released {
            s.emergency_stop_released = released;
        }
    }

    pub fn contactor_closed(&self) -> bool {
        lock(&self.state).contactor_closed
    }

    pub fn duty_count(&self) -> u32 {
        lock(&self.state).duty_count
    }

    pub fn pwm_setup(&self) -> Option<(u32, u8)> {
        lock(&self.state).pwm_setup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp_voltage_round_trips_through_adc() {
        let scale = (3.3 / 4095.0) * 12.0;
        let (mut hw, handle) = SimulatedHardware::new(scale);
        handle.set_cp_voltage(6.0);
        let volts = f64::from(hw.read_cp_adc()) * scale;
        assert!((volts - 6.0).abs() < scale);
    }

    #[test]
    fn negative_voltage_saturates_at_zero_counts() {
        let (mut hw, handle) = SimulatedHardware::new(0.01);
        handle.set_cp_voltage(-12.0);
        assert_eq!(hw.read_cp_adc(), 0);
    }

    #[test]
    fn outputs_are_observable() {
        let (mut hw, handle) = SimulatedHardware::new(0.01);
        hw.configure_pwm(1000, 10);
        hw.write_pwm_duty(420);
        hw.set_contactor(true);
        assert_eq!(handle.pwm_setup(), Some((1000, 10)));
        assert_eq!(handle.duty_count(), 420);
        assert!(handle.contactor_closed());

        handle.apply(&SimInputs {
            rcd_ok: Some(false),
            ..SimInputs::default()
        });
        assert!(!hw.rcd_ok());
        assert!(hw.emergency_stop_released());
    }
}
