#![no_main]
use libfuzzer_sys::fuzz_target;

use evse_controller::config::PilotConfig;
use evse_controller::pilot::{CpState, CpThresholds};
use evse_controller::pwm::{duty_count, duty_percent_for_current};

fuzz_target!(|data: &[u8]| {
    // Interpret the input as a stream of little-endian f64 voltages and i32 currents
    let thresholds = CpThresholds::from(&PilotConfig::default());
    for chunk in data.chunks_exact(8) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        let volts = f64::from_le_bytes(buf);
        let state = thresholds.decode(volts);
        if volts.is_finite() {
            assert_eq!(
                thresholds.fault_of(volts).is_some(),
                state == CpState::Fault
            );
        }

        let amps = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let duty = duty_percent_for_current(amps, 6);
        assert!((0.0..=90.0).contains(&duty));
        let _ = duty_count(duty, 10);
    }
});
