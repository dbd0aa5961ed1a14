use crate::controller::{ControllerSnapshot, RequestResult, RequestSource};
use crate::hardware::SimInputs;
use crate::session::ChargingSession;
use crate::transaction::TransactionStatus;
use serde::Serialize;
use tokio::sync::oneshot;

/// Main driver state
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is running normally
    Running,
    /// Driver is shutting down
    ShuttingDown,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Initializing => "Initializing",
            DriverState::Running => "Running",
            DriverState::ShuttingDown => "ShuttingDown",
        }
    }
}

/// Status published after every step
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: String,
    pub driver_state: String,
    #[serde(flatten)]
    pub controller: ControllerSnapshot,
    pub session: serde_json::Value,
    pub lifetime_energy_kwh: f64,
    pub total_steps: u64,
    pub overrun_count: u64,
    pub step_interval_ms: u64,
}

/// Commands accepted by the driver from external components (web, etc.)
#[derive(Debug)]
pub enum DriverCommand {
    SetEnabled(bool),
    SetCurrentLimit {
        amps: i32,
        reply: oneshot::Sender<i32>,
    },
    StartCharging {
        source: RequestSource,
        reply: oneshot::Sender<RequestResult>,
    },
    StartChargingRemote {
        source: RequestSource,
        limit_amps: Option<i32>,
        reply: oneshot::Sender<RequestResult>,
    },
    StopCharging {
        source: RequestSource,
        reply: oneshot::Sender<RequestResult>,
    },
    AcknowledgeFault {
        reply: oneshot::Sender<RequestResult>,
    },
    Transaction(TransactionStatus),
    Simulate(SimInputs),
    GetSessions {
        reply: oneshot::Sender<Vec<ChargingSession>>,
    },
    Shutdown,
}
