use crate::meter::MeterSample;
use crate::pilot::{CpState, PilotFault};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Charging state machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvseState {
    /// Output forced off; nothing is evaluated
    Disabled,
    /// Ready, waiting for a charge request
    Idle,
    /// Reserved; never entered
    WaitingForCar,
    /// First start press seen, waiting for the second
    WaitingForAuth,
    /// Contactor closed, power flowing
    Charging,
    /// Safety fault, contactor held open
    Fault,
}

impl EvseState {
    pub fn as_str(self) -> &'static str {
        match self {
            EvseState::Disabled => "Disabled",
            EvseState::Idle => "Idle",
            EvseState::WaitingForCar => "WaitingForCar",
            EvseState::WaitingForAuth => "WaitingForAuth",
            EvseState::Charging => "Charging",
            EvseState::Fault => "Fault",
        }
    }
}

impl std::fmt::Display for EvseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the safety predicate failed. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCause {
    EmergencyStop,
    RcdTripped,
    PilotShort,
    PilotOverVoltage,
}

impl From<PilotFault> for FaultCause {
    fn from(f: PilotFault) -> Self {
        match f {
            PilotFault::Short => FaultCause::PilotShort,
            PilotFault::OverVoltage => FaultCause::PilotOverVoltage,
        }
    }
}

impl std::fmt::Display for FaultCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultCause::EmergencyStop => "emergency stop engaged",
            FaultCause::RcdTripped => "RCD tripped",
            FaultCause::PilotShort => "control pilot shorted",
            FaultCause::PilotOverVoltage => "control pilot over-voltage",
        };
        f.write_str(s)
    }
}

/// Who asked for a start or stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    /// Physical buttons
    Manual,
    /// Remote transaction protocol
    Remote,
    /// Local HTTP API
    Api,
}

/// How a charging session was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeEntry {
    /// Two-press authorization through WaitingForAuth
    Manual,
    /// Direct remote start
    Remote,
}

/// Reason a request was not acted upon. Rejection never changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("already charging")]
    AlreadyCharging,

    #[error("controller is disabled")]
    Disabled,

    #[error("controller is faulted")]
    Faulted,

    #[error("not charging")]
    NotCharging,

    #[error("no active fault")]
    NotFaulted,

    #[error("safety check failed: {0}")]
    SafetyNotOk(FaultCause),

    #[error("vehicle not connected")]
    VehicleNotConnected,
}

pub type RequestResult = std::result::Result<(), Rejection>;

/// Why a charging session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionEndReason {
    StopRequested(RequestSource),
    VehicleDisconnected,
    SafetyFault(FaultCause),
    Disabled,
    Reenabled,
}

/// Things that happened inside a step or an operation, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    StateChanged { from: EvseState, to: EvseState },
    SessionStarted { entry: ChargeEntry },
    SessionEnded { reason: SessionEndReason, energy_kwh: f64 },
    FaultRaised { cause: FaultCause, latched: bool },
    FaultCleared { cause: FaultCause },
}

/// Active fault bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveFault {
    pub cause: FaultCause,
    pub latched: bool,
    pub acknowledged: bool,
}

impl ActiveFault {
    /// Latched faults stay until acknowledged
    pub fn may_recover(&self) -> bool {
        !self.latched || self.acknowledged
    }
}

/// Read-only view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub state: EvseState,
    pub cp_state: CpState,
    pub cp_voltage: f64,
    pub car_connected: bool,
    pub offered_current_amps: i32,
    pub duty_percent: f64,
    pub contactor_closed: bool,
    pub fault: Option<FaultCause>,
    pub fault_latched: bool,
    pub charge_request: Option<RequestSource>,
    pub stop_request: Option<RequestSource>,
    pub meter: MeterSample,
}
