use super::*;

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            fault_max_v: 0.5,
            state_d_max_v: 4.0,
            state_c_max_v: 7.0,
            state_b_max_v: 10.0,
            state_a_max_v: 13.0,
            // 12-bit ADC on a 3.3 V reference behind a 12 V -> 1 V divider
            adc_to_voltage: (3.3 / 4095.0) * 12.0,
        }
    }
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000,
            resolution_bits: 10,
        }
    }
}

impl Default for CurrentConfig {
    fn default() -> Self {
        Self {
            min_amps: 6,
            max_amps: 32,
            default_amps: 16,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 10_000,
            grid_voltage: 230.0,
            simulated_voltage: 5.0,
            simulated_current: 1.5,
        }
    }
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            latched: vec![FaultCause::EmergencyStop],
        }
    }
}

impl Default for ButtonsConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/evse.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pilot: PilotConfig::default(),
            pwm: PwmConfig::default(),
            current: CurrentConfig::default(),
            meter: MeterConfig::default(),
            faults: FaultsConfig::default(),
            buttons: ButtonsConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            step_interval_ms: 10,
            status_interval_ms: 5000,
            start_enabled: true,
            session_history_size: 100,
            state_file: "/data/evse_state.json".to_string(),
        }
    }
}
