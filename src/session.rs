//! Charging session ledger
//!
//! The controller only delimits sessions (entry into and exit from
//! Charging). This module keeps the record of each one: when it started,
//! how it was entered, how it ended, energy delivered and peak power.

use crate::controller::{ChargeEntry, SessionEndReason};
use crate::error::{EvseError, Result};
use crate::logging::{LogContext, get_logger, get_logger_with_context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One charging session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChargingSession {
    /// Unique session ID
    pub id: String,

    /// Start time of the session
    pub start_time: DateTime<Utc>,

    /// End time of the session (if completed)
    pub end_time: Option<DateTime<Utc>>,

    /// How the session was entered
    pub entry: ChargeEntry,

    /// Total energy delivered in this session
    pub energy_delivered_kwh: f64,

    /// Peak power recorded during session
    pub peak_power_w: f64,

    /// Why the session ended
    pub end_reason: Option<SessionEndReason>,

    /// Session status
    pub status: SessionStatus,
}

impl ChargingSession {
    pub fn duration_secs(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_seconds()
    }
}

/// Session status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session is currently active
    Active,

    /// Ended by a stop request or unplug
    Completed,

    /// Ended by a fault or an override
    Interrupted,
}

impl From<SessionEndReason> for SessionStatus {
    fn from(reason: SessionEndReason) -> Self {
        match reason {
            SessionEndReason::StopRequested(_) | SessionEndReason::VehicleDisconnected => {
                SessionStatus::Completed
            }
            SessionEndReason::SafetyFault(_)
            | SessionEndReason::Disabled
            | SessionEndReason::Reenabled => SessionStatus::Interrupted,
        }
    }
}

/// Serialized form of the ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    current: Option<ChargingSession>,
    #[serde(default)]
    history: Vec<ChargingSession>,
}

/// Session manager for tracking charging sessions
pub struct ChargingSessionManager {
    /// Current active session
    pub current_session: Option<ChargingSession>,

    /// Completed sessions, oldest first
    session_history: VecDeque<ChargingSession>,

    /// Maximum history size
    max_history_size: usize,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl ChargingSessionManager {
    /// Create a new session manager
    pub fn new(max_history_size: usize) -> Self {
        Self {
            current_session: None,
            session_history: VecDeque::with_capacity(max_history_size.min(1024)),
            max_history_size,
            logger: get_logger("session"),
        }
    }

    /// Start a new charging session
    pub fn start_session(&mut self, entry: ChargeEntry) -> Result<&ChargingSession> {
        if self.current_session.is_some() {
            return Err(EvseError::generic("Session already active"));
        }

        let session = ChargingSession {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            end_time: None,
            entry,
            energy_delivered_kwh: 0.0,
            peak_power_w: 0.0,
            end_reason: None,
            status: SessionStatus::Active,
        };

        get_logger_with_context(
            LogContext::new("session")
                .with_session_id(session.id.clone())
                .with_field("entry", format!("{:?}", entry)),
        )
        .info("Started charging session");
        Ok(&*self.current_session.insert(session))
    }

    /// Update current session with power and energy data
    pub fn update(&mut self, power_w: f64, energy_kwh: f64) {
        if let Some(ref mut session) = self.current_session {
            session.energy_delivered_kwh = session.energy_delivered_kwh.max(energy_kwh);
            if power_w > session.peak_power_w {
                session.peak_power_w = power_w;
            }
        }
    }

    /// End the current session
    pub fn end_session(
        &mut self,
        reason: SessionEndReason,
        energy_kwh: f64,
    ) -> Result<ChargingSession> {
        let Some(mut session) = self.current_session.take() else {
            return Err(EvseError::generic("No active session to end"));
        };

        session.end_time = Some(Utc::now());
        session.energy_delivered_kwh = session.energy_delivered_kwh.max(energy_kwh);
        session.end_reason = Some(reason);
        session.status = SessionStatus::from(reason);

        self.session_history.push_back(session.clone());
        while self.session_history.len() > self.max_history_size {
            self.session_history.pop_front();
        }

        get_logger_with_context(
            LogContext::new("session").with_session_id(session.id.clone()),
        )
        .info(&format!(
            "Ended charging session ({:?}), delivered {:.3} kWh, peak {:.0} W",
            reason, session.energy_delivered_kwh, session.peak_power_w
        ));

        Ok(session)
    }

    pub fn last_session(&self) -> Option<&ChargingSession> {
        self.session_history.back()
    }

    /// Completed sessions, newest first
    pub fn history(&self) -> Vec<ChargingSession> {
        self.session_history.iter().rev().cloned().collect()
    }

    /// Get session statistics
    pub fn get_session_stats(&self) -> serde_json::Value {
        match self.current_session {
            Some(ref session) => serde_json::json!({
                "session_active": true,
                "session_id": session.id,
                "session_duration_min": session.duration_secs() / 60,
                "energy_delivered_kwh": session.energy_delivered_kwh,
                "peak_power_w": session.peak_power_w,
            }),
            None => serde_json::json!({
                "session_active": false,
                "session_id": null,
                "session_duration_min": null,
                "energy_delivered_kwh": null,
                "peak_power_w": null,
            }),
        }
    }

    /// Get session state for persistence
    pub fn get_state(&self) -> serde_json::Value {
        let state = LedgerState {
            current: self.current_session.clone(),
            history: self.session_history.iter().cloned().collect(),
        };
        serde_json::to_value(state).unwrap_or(serde_json::Value::Null)
    }

    /// Restore session state from persistence.
    ///
    /// A session that was active when the state was saved cannot still be
    /// running after a restart (no auto-start), so it is closed as
    /// interrupted and returned.
    pub fn restore_state(
        &mut self,
        state: serde_json::Value,
    ) -> Result<Option<ChargingSession>> {
        if state.is_null() {
            return Ok(None);
        }
        let restored: LedgerState = serde_json::from_value(state)?;

        self.session_history = restored.history.into_iter().collect();
        let interrupted = restored.current.map(|mut stale| {
            self.logger.warn(&format!(
                "Closing session {} left open by previous run ({:.3} kWh)",
                stale.id, stale.energy_delivered_kwh
            ));
            stale.end_time = Some(Utc::now());
            stale.status = SessionStatus::Interrupted;
            self.session_history.push_back(stale.clone());
            stale
        });
        while self.session_history.len() > self.max_history_size {
            self.session_history.pop_front();
        }
        self.current_session = None;

        self.logger.info(&format!(
            "Restored {} sessions from persistent state",
            self.session_history.len()
        ));
        Ok(interrupted)
    }
}

impl Default for ChargingSessionManager {
    fn default() -> Self {
        Self::new(100) // Default history size of 100 sessions
    }
}
