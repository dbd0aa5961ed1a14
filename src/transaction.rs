//! Remote transaction bridge
//!
//! A remote charging protocol client reports its transaction state here.
//! The bridge watches for edges and turns them into controller calls: a
//! transaction becoming active starts charging directly, a transaction
//! ending or charge permission being revoked requests a stop.

use crate::controller::{EvseController, EvseState, RequestResult, RequestSource};
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};

/// Current offered on a remote start that carries no limit
pub const DEFAULT_REMOTE_START_AMPS: i32 = 16;

/// Transaction state reported by the remote protocol client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    /// A transaction is running
    pub active: bool,
    /// The backend allows energy to flow
    pub permits_charge: bool,
    #[serde(default)]
    pub transaction_id: Option<i64>,
}

/// What an observation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    /// First observation, baseline recorded
    Initialized,
    RemoteStart(RequestResult),
    Stop(RequestResult),
    None,
}

/// Edge detector between a transaction client and the controller
pub struct TransactionBridge {
    last: Option<TransactionStatus>,
    logger: StructuredLogger,
}

impl Default for TransactionBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBridge {
    pub fn new() -> Self {
        Self {
            last: None,
            logger: get_logger("transaction"),
        }
    }

    /// Feed the latest status; acts only on changes since the previous call
    pub fn observe(
        &mut self,
        status: TransactionStatus,
        ctl: &mut EvseController,
    ) -> BridgeAction {
        let Some(prev) = self.last.replace(status.clone()) else {
            self.logger.info(&format!(
                "Initial transaction state: {}",
                if status.active { "active" } else { "none" }
            ));
            return BridgeAction::Initialized;
        };

        let mut action = BridgeAction::None;

        if status.active && !prev.active {
            if ctl.state() != EvseState::Charging {
                self.logger.info(&format!(
                    "Remote transaction {:?} started, starting charger",
                    status.transaction_id
                ));
                action =
                    BridgeAction::RemoteStart(ctl.start_charging_remote(RequestSource::Remote));
            }
        } else if !status.active && prev.active {
            self.logger
                .info("Transaction stopped, stopping charger");
            action = BridgeAction::Stop(ctl.stop_charging_request(RequestSource::Remote));
        }

        if !status.permits_charge && prev.permits_charge {
            self.logger
                .warn("Charge permission revoked, stopping charger");
            let result = ctl.stop_charging_request(RequestSource::Remote);
            if action == BridgeAction::None {
                action = BridgeAction::Stop(result);
            }
        }

        action
    }

    /// Remote start command, optionally carrying a current limit
    pub fn on_remote_start(
        &self,
        limit_amps: Option<i32>,
        ctl: &mut EvseController,
    ) -> RequestResult {
        let amps = ctl.set_current_limit(limit_amps.unwrap_or(DEFAULT_REMOTE_START_AMPS));
        self.logger
            .info(&format!("Remote start received, limit {} A", amps));
        ctl.start_charging_remote(RequestSource::Remote)
    }

    /// Remote stop command
    pub fn on_remote_stop(&self, ctl: &mut EvseController) -> RequestResult {
        self.logger.info("Remote stop received");
        ctl.stop_charging_request(RequestSource::Remote)
    }
}
