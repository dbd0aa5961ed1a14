//! IEC 61851 Control Pilot decoding
//!
//! The CP line voltage (high level of the pilot waveform) tells the charger
//! whether a vehicle is plugged in and whether it is ready to draw power.
//! Classification is a pure function of one voltage sample.

use crate::config::PilotConfig;
use serde::{Deserialize, Serialize};

/// Discrete Control Pilot state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpState {
    /// ~12 V: no vehicle connected
    StateA,
    /// ~9 V: vehicle connected, not ready to charge
    StateB,
    /// ~6 V: vehicle ready, ventilation not required
    StateC,
    /// ~3 V: vehicle ready, ventilation required or charging
    StateD,
    /// Short circuit or over-voltage on the pilot
    Fault,
}

impl CpState {
    /// A vehicle is present in states B, C and D
    pub fn is_car_connected(self) -> bool {
        matches!(self, CpState::StateB | CpState::StateC | CpState::StateD)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CpState::StateA => "A",
            CpState::StateB => "B",
            CpState::StateC => "C",
            CpState::StateD => "D",
            CpState::Fault => "F",
        }
    }
}

/// Which side of the valid range a faulted reading fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotFault {
    /// Below the fault threshold
    Short,
    /// At or above the State A ceiling
    OverVoltage,
}

/// Voltage band boundaries, each an exclusive upper bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpThresholds {
    pub fault_max_v: f64,
    pub state_d_max_v: f64,
    pub state_c_max_v: f64,
    pub state_b_max_v: f64,
    pub state_a_max_v: f64,
}

impl From<&PilotConfig> for CpThresholds {
    fn from(cfg: &PilotConfig) -> Self {
        Self {
            fault_max_v: cfg.fault_max_v,
            state_d_max_v: cfg.state_d_max_v,
            state_c_max_v: cfg.state_c_max_v,
            state_b_max_v: cfg.state_b_max_v,
            state_a_max_v: cfg.state_a_max_v,
        }
    }
}

impl CpThresholds {
    /// Classify a CP voltage into one of the five pilot states
    pub fn decode(&self, volts: f64) -> CpState {
        match self.fault_of(volts) {
            Some(_) => CpState::Fault,
            None if volts < self.state_d_max_v => CpState::StateD,
            None if volts < self.state_c_max_v => CpState::StateC,
            None if volts < self.state_b_max_v => CpState::StateB,
            None => CpState::StateA,
        }
    }

    /// Fault kind for a reading, `None` when the reading is inside a valid band.
    ///
    /// NaN compares false everywhere and is reported as a short so that a
    /// broken ADC never looks like a healthy pilot.
    pub fn fault_of(&self, volts: f64) -> Option<PilotFault> {
        if volts.is_nan() || volts < self.fault_max_v {
            Some(PilotFault::Short)
        } else if volts >= self.state_a_max_v {
            Some(PilotFault::OverVoltage)
        } else {
            None
        }
    }
}

/// Convert raw ADC counts to CP volts
pub fn adc_to_volts(counts: u16, adc_to_voltage: f64) -> f64 {
    f64::from(counts) * adc_to_voltage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> CpThresholds {
        CpThresholds::from(&PilotConfig::default())
    }

    #[test]
    fn decodes_reference_voltages() {
        let t = thresholds();
        assert_eq!(t.decode(2.0), CpState::StateD);
        assert_eq!(t.decode(5.0), CpState::StateC);
        assert_eq!(t.decode(8.0), CpState::StateB);
        assert_eq!(t.decode(11.0), CpState::StateA);
        assert_eq!(t.decode(0.2), CpState::Fault);
        assert_eq!(t.decode(14.0), CpState::Fault);
    }

    #[test]
    fn band_edges_belong_to_the_upper_band() {
        let t = thresholds();
        assert_eq!(t.decode(0.5), CpState::StateD);
        assert_eq!(t.decode(4.0), CpState::StateC);
        assert_eq!(t.decode(7.0), CpState::StateB);
        assert_eq!(t.decode(10.0), CpState::StateA);
        assert_eq!(t.decode(13.0), CpState::Fault);
        assert_eq!(t.fault_of(13.0), Some(PilotFault::OverVoltage));
        assert_eq!(t.fault_of(0.49), Some(PilotFault::Short));
        assert_eq!(t.fault_of(f64::NAN), Some(PilotFault::Short));
    }

    #[test]
    fn car_connected_only_in_b_c_d() {
        assert!(!CpState::StateA.is_car_connected());
        assert!(CpState::StateB.is_car_connected());
        assert!(CpState::StateC.is_car_connected());
        assert!(CpState::StateD.is_car_connected());
        assert!(!CpState::Fault.is_car_connected());
    }

    #[test]
    fn recalibrated_thresholds_apply() {
        let cfg = PilotConfig {
            state_b_max_v: 9.5,
            ..PilotConfig::default()
        };
        let t = CpThresholds::from(&cfg);
        assert_eq!(t.decode(9.7), CpState::StateA);
    }

    #[test]
    fn adc_scaling() {
        assert!((adc_to_volts(1000, 0.01) - 10.0).abs() < 1e-9);
        assert_eq!(adc_to_volts(0, 0.01), 0.0);
    }
}
