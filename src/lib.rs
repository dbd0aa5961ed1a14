//! # evse-controller - IEC 61851 charge point controller
//!
//! Controls a single-outlet AC charging station: decodes the Control Pilot
//! voltage into vehicle states, advertises the offered current through the
//! pilot PWM duty cycle, switches the contactor and integrates delivered
//! energy.
//!
//! ## Architecture
//!
//! - `pilot`: Control Pilot voltage decoding
//! - `pwm`: offered current to duty cycle encoding
//! - `meter`: metering and energy integration
//! - `controller`: the charging state machine
//! - `hardware`: hardware and clock seams, simulated board
//! - `buttons`: manual start/stop inputs
//! - `transaction`: remote transaction bridge
//! - `session`: charging session ledger
//! - `persistence`: state persistence and recovery
//! - `driver`: step loop and command handling
//! - `web`: HTTP control and status API
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing

pub mod buttons;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod meter;
pub mod persistence;
pub mod pilot;
pub mod pwm;
pub mod session;
pub mod transaction;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use controller::{EvseController, EvseState};
pub use driver::EvseDriver;
pub use error::{EvseError, Result};
