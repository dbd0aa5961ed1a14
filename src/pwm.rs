//! Control Pilot PWM duty encoding
//!
//! The duty cycle of the 1 kHz pilot advertises the maximum current the
//! vehicle may draw. The linear law maps `min_amps..=63 A` onto `0..=90 %`;
//! 100 % is reserved by the standard and never produced.

use crate::config::{IEC_MAX_CURRENT_AMPS, PwmConfig};
use crate::hardware::EvseHardware;

/// Highest duty cycle the encoder will ever produce
pub const MAX_DUTY_PERCENT: f64 = 90.0;

/// Duty cycle in percent for an offered current.
///
/// Currents below `min_amps` yield 0 % (no-charge offer).
pub fn duty_percent_for_current(amps: i32, min_amps: i32) -> f64 {
    if amps < min_amps {
        return 0.0;
    }
    let span = f64::from(IEC_MAX_CURRENT_AMPS - min_amps);
    if span <= 0.0 {
        return MAX_DUTY_PERCENT;
    }
    let duty = f64::from(amps - min_amps) / span * MAX_DUTY_PERCENT;
    duty.clamp(0.0, MAX_DUTY_PERCENT)
}

/// Scale a duty percentage to a PWM compare count for the given resolution
pub fn duty_count(duty_percent: f64, resolution_bits: u8) -> u32 {
    let max_count = (1u32 << resolution_bits.min(31)) - 1;
    let pct = duty_percent.clamp(0.0, MAX_DUTY_PERCENT);
    // Truncation matches the counter semantics of the PWM peripheral
    (f64::from(max_count) * (pct / 100.0)) as u32
}

/// Programs the pilot PWM output from an offered current
#[derive(Debug, Clone)]
pub struct DutyEncoder {
    frequency_hz: u32,
    resolution_bits: u8,
    min_amps: i32,
}

impl DutyEncoder {
    pub fn new(pwm: &PwmConfig, min_amps: i32) -> Self {
        Self {
            frequency_hz: pwm.frequency_hz,
            resolution_bits: pwm.resolution_bits,
            min_amps,
        }
    }

    /// One-time PWM peripheral setup
    pub fn configure(&self, hw: &mut dyn EvseHardware) {
        hw.configure_pwm(self.frequency_hz, self.resolution_bits);
    }

    /// Write the duty for `amps`; returns the (percent, count) that was written
    pub fn apply(&self, hw: &mut dyn EvseHardware, amps: i32) -> (f64, u32) {
        let pct = duty_percent_for_current(amps, self.min_amps);
        let count = duty_count(pct, self.resolution_bits);
        hw.write_pwm_duty(count);
        (pct, count)
    }

    /// Force the output to 0 % (controller disabled)
    pub fn silence(&self, hw: &mut dyn EvseHardware) {
        hw.write_pwm_duty(0);
    }
}
