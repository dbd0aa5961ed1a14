//! Configuration management for the EVSE controller
//!
//! This module handles loading, validation, and management of the controller
//! configuration from YAML files. Every hardware calibration value (CP voltage
//! bands, ADC scale, PWM setup, current limits, metering cadence) lives here so
//! that a board can be recalibrated without rebuilding.

use crate::controller::FaultCause;
use crate::error::{EvseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;

/// Highest current the IEC 61851 PWM law can advertise
pub const IEC_MAX_CURRENT_AMPS: i32 = 63;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Control Pilot sensing calibration
    pub pilot: PilotConfig,

    /// Control Pilot PWM output setup
    pub pwm: PwmConfig,

    /// Offered current limits
    pub current: CurrentConfig,

    /// Meter sampling and simulation parameters
    pub meter: MeterConfig,

    /// Fault recovery policy
    pub faults: FaultsConfig,

    /// Manual button handling
    pub buttons: ButtonsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Period of the state machine step loop in milliseconds
    pub step_interval_ms: u64,

    /// Period of the status log line in milliseconds (0 disables it)
    pub status_interval_ms: u64,

    /// Enable the controller on boot (unless persisted state says otherwise)
    pub start_enabled: bool,

    /// Number of completed sessions kept in history
    pub session_history_size: usize,

    /// Path of the persisted state file
    pub state_file: String,
}

/// CP voltage band boundaries and ADC scaling.
///
/// Each `*_max_v` value is the exclusive upper bound of its band; the bands
/// must be strictly ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// Below this the pilot is considered shorted
    pub fault_max_v: f64,

    /// Upper bound of State D (ventilation required)
    pub state_d_max_v: f64,

    /// Upper bound of State C (vehicle ready)
    pub state_c_max_v: f64,

    /// Upper bound of State B (vehicle connected)
    pub state_b_max_v: f64,

    /// Upper bound of State A (no vehicle); at or above is over-voltage
    pub state_a_max_v: f64,

    /// Volts per ADC count, including the sense divider ratio
    pub adc_to_voltage: f64,
}

/// Control Pilot PWM output parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    /// PWM frequency (IEC 61851 uses 1 kHz)
    pub frequency_hz: u32,

    /// PWM counter resolution in bits
    pub resolution_bits: u8,
}

/// Offered current limits in amperes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentConfig {
    /// Lowest current that can be offered (IEC 61851 minimum is 6 A)
    pub min_amps: i32,

    /// Rated current of the outlet, at most 63 A
    pub max_amps: i32,

    /// Current offered after boot
    pub default_amps: i32,
}

/// Meter sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Interval between telemetry samples in milliseconds
    pub sample_interval_ms: u64,

    /// Nominal grid voltage reported while not charging
    pub grid_voltage: f64,

    /// Voltage reported by the simulated meter while charging
    pub simulated_voltage: f64,

    /// Current reported by the simulated meter while charging
    pub simulated_current: f64,
}

/// Fault recovery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultsConfig {
    /// Fault causes that stay latched until acknowledged
    pub latched: Vec<FaultCause>,
}

/// Manual button configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonsConfig {
    /// Minimum spacing between two accepted presses in milliseconds
    pub debounce_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file; empty disables file logging
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `EVSE_CONFIG` or the first default location found
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os("EVSE_CONFIG") {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(EvseError::config(format!(
                    "EVSE_CONFIG points to missing file {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let default_paths = [
            "evse_config.yaml",
            "/data/evse_config.yaml",
            "/etc/evse/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let p = &self.pilot;
        let bands = [
            ("pilot.fault_max_v", p.fault_max_v),
            ("pilot.state_d_max_v", p.state_d_max_v),
            ("pilot.state_c_max_v", p.state_c_max_v),
            ("pilot.state_b_max_v", p.state_b_max_v),
            ("pilot.state_a_max_v", p.state_a_max_v),
        ];
        for (field, value) in bands {
            if !value.is_finite() {
                return Err(EvseError::validation(field, "Must be a finite voltage"));
            }
        }
        for pair in bands.windows(2) {
            if pair[1].1 <= pair[0].1 {
                return Err(EvseError::validation(
                    pair[1].0,
                    format!("Must be greater than {} ({})", pair[0].0, pair[0].1),
                ));
            }
        }
        if !(p.adc_to_voltage.is_finite() && p.adc_to_voltage > 0.0) {
            return Err(EvseError::validation(
                "pilot.adc_to_voltage",
                "Must be positive",
            ));
        }

        if self.pwm.frequency_hz == 0 {
            return Err(EvseError::validation(
                "pwm.frequency_hz",
                "Must be greater than 0",
            ));
        }
        if !(1..=16).contains(&self.pwm.resolution_bits) {
            return Err(EvseError::validation(
                "pwm.resolution_bits",
                "Must be between 1 and 16",
            ));
        }

        let c = &self.current;
        if c.min_amps < 1 {
            return Err(EvseError::validation("current.min_amps", "Must be positive"));
        }
        if c.max_amps < c.min_amps {
            return Err(EvseError::validation(
                "current.max_amps",
                "Must not be below current.min_amps",
            ));
        }
        if c.max_amps > IEC_MAX_CURRENT_AMPS {
            return Err(EvseError::validation(
                "current.max_amps",
                format!("Must not exceed {} A", IEC_MAX_CURRENT_AMPS),
            ));
        }

        if self.meter.sample_interval_ms == 0 {
            return Err(EvseError::validation(
                "meter.sample_interval_ms",
                "Must be greater than 0",
            ));
        }
        if self.meter.grid_voltage <= 0.0 {
            return Err(EvseError::validation(
                "meter.grid_voltage",
                "Must be positive",
            ));
        }
        if self.meter.simulated_voltage < 0.0 || self.meter.simulated_current < 0.0 {
            return Err(EvseError::validation(
                "meter.simulated_*",
                "Must not be negative",
            ));
        }

        if self.step_interval_ms == 0 {
            return Err(EvseError::validation(
                "step_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.web.port == 0 {
            return Err(EvseError::validation("web.port", "Port must be greater than 0"));
        }

        crate::logging::parse_log_level(&self.logging.level)
            .map_err(|e| EvseError::validation("logging.level", e.to_string()))?;

        Ok(())
    }
}
