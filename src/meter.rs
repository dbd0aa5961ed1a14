//! Metering and energy integration
//!
//! The sampler runs inside the controller step, gated by its own interval.
//! While charging it asks a [`MeterSource`] for voltage and current; while
//! idle it reports the nominal grid voltage and zero current. Energy is
//! integrated from the true elapsed time between samples.

use crate::config::MeterConfig;
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const WATT_SECONDS_PER_KWH: f64 = 3_600_000.0;

/// Instantaneous voltage/current pair from a meter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    pub voltage: f64,
    pub current: f64,
}

/// Meter I/O failure. Never forces a safety fault on its own.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MeterError {
    #[error("meter unavailable: {0}")]
    Unavailable(String),

    #[error("meter read timed out")]
    Timeout,
}

/// Source of voltage/current while the contactor is closed
pub trait MeterSource: Send {
    fn read(&mut self) -> Result<MeterReading, MeterError>;
}

/// Fixed readings standing in for a real meter (CT sensor, Modbus, pulse)
#[derive(Debug, Clone)]
pub struct SimulatedMeter {
    reading: MeterReading,
}

impl SimulatedMeter {
    pub fn new(voltage: f64, current: f64) -> Self {
        Self {
            reading: MeterReading { voltage, current },
        }
    }

    pub fn from_config(cfg: &MeterConfig) -> Self {
        Self::new(cfg.simulated_voltage, cfg.simulated_current)
    }
}

impl MeterSource for SimulatedMeter {
    fn read(&mut self) -> Result<MeterReading, MeterError> {
        Ok(self.reading)
    }
}

/// Quality of the latest telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TelemetryStatus {
    Ok,
    /// Meter could not be read; energy integration is suspended
    Degraded { reason: String },
}

/// Latest telemetry published by the sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSample {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Watts
    pub power: f64,
    /// Energy of the current (or last) session in kWh
    pub energy_kwh: f64,
    pub telemetry: TelemetryStatus,
}

impl MeterSample {
    fn idle(grid_voltage: f64) -> Self {
        Self {
            voltage: grid_voltage,
            current: 0.0,
            power: 0.0,
            energy_kwh: 0.0,
            telemetry: TelemetryStatus::Ok,
        }
    }
}

/// Periodic sampler and energy integrator
pub struct MeterSampler {
    source: Box<dyn MeterSource>,
    interval: Duration,
    grid_voltage: f64,
    sample: MeterSample,
    last_sample_at: Duration,
    last_energy_update: Duration,
    logger: StructuredLogger,
}

impl MeterSampler {
    pub fn new(cfg: &MeterConfig, source: Box<dyn MeterSource>) -> Self {
        Self {
            source,
            interval: Duration::from_millis(cfg.sample_interval_ms),
            grid_voltage: cfg.grid_voltage,
            sample: MeterSample::idle(cfg.grid_voltage),
            last_sample_at: Duration::ZERO,
            last_energy_update: Duration::ZERO,
            logger: get_logger("meter"),
        }
    }

    /// Restart both timers at `now` (controller `begin`)
    pub fn reset_timers(&mut self, now: Duration) {
        self.last_sample_at = now;
        self.last_energy_update = now;
    }

    /// Zero the session energy and restart the integration window
    pub fn start_session(&mut self, now: Duration) {
        self.sample.energy_kwh = 0.0;
        self.last_energy_update = now;
    }

    /// Take a sample if the interval elapsed; returns whether one was taken
    pub fn poll(&mut self, now: Duration, charging: bool) -> bool {
        if now.saturating_sub(self.last_sample_at) < self.interval {
            return false;
        }
        self.last_sample_at = now;
        self.sample(now, charging);
        true
    }

    /// Take one sample unconditionally
    pub fn sample(&mut self, now: Duration, charging: bool) {
        let reading = if charging {
            self.source.read()
        } else {
            Ok(MeterReading {
                voltage: self.grid_voltage,
                current: 0.0,
            })
        };

        let dt_s = now.saturating_sub(self.last_energy_update).as_secs_f64();
        self.last_energy_update = now;

        match reading {
            Ok(r) => {
                if let TelemetryStatus::Degraded { .. } = self.sample.telemetry {
                    self.logger.info("Meter readings recovered");
                }
                self.sample.voltage = r.voltage;
                self.sample.current = r.current;
                self.sample.power = r.voltage * r.current;
                self.sample.telemetry = TelemetryStatus::Ok;

                if dt_s > 0.0 && self.sample.power > 0.0 {
                    self.sample.energy_kwh += self.sample.power * dt_s / WATT_SECONDS_PER_KWH;
                }
            }
            Err(e) => {
                if self.sample.telemetry == TelemetryStatus::Ok {
                    self.logger
                        .warn(&format!("Meter read failed, telemetry degraded: {}", e));
                }
                self.sample.telemetry = TelemetryStatus::Degraded {
                    reason: e.to_string(),
                };
            }
        }

        self.logger.trace(&format!(
            "V={:.1}V I={:.2}A P={:.0}W E={:.4}kWh",
            self.sample.voltage, self.sample.current, self.sample.power, self.sample.energy_kwh
        ));
    }

    pub fn latest(&self) -> &MeterSample {
        &self.sample
    }
}
