//! Persistence layer for controller state
//!
//! This module handles saving and loading the operator settings (enabled
//! flag, current limit), lifetime energy and the session ledger across
//! restarts. Pending charge requests are never persisted.

use crate::error::Result;
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent state structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistentState {
    /// Operator enable flag
    pub enabled: bool,

    /// Last current limit set by an operator, if any
    pub current_limit_amps: Option<i32>,

    /// Energy delivered over all sessions (kWh)
    pub lifetime_energy_kwh: f64,

    /// Session ledger data
    pub sessions: serde_json::Value,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            enabled: true,
            current_limit_amps: None,
            lifetime_energy_kwh: 0.0,
            sessions: serde_json::Value::Null,
        }
    }
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: PathBuf,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    /// Load state from disk
    pub fn load(&mut self) -> Result<()> {
        let path = self.file_path.as_path();

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded persistent state from {}",
            self.file_path.display()
        ));

        Ok(())
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    /// Record the enable flag; saves when it changed
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.state.enabled == enabled {
            return Ok(());
        }
        self.state.enabled = enabled;
        self.save()
    }

    /// Record the current limit; saves when it changed
    pub fn set_current_limit(&mut self, amps: i32) -> Result<()> {
        if self.state.current_limit_amps == Some(amps) {
            return Ok(());
        }
        self.state.current_limit_amps = Some(amps);
        self.save()
    }

    /// Save the ledger while a session is still running
    pub fn save_sessions(&mut self, sessions: serde_json::Value) -> Result<()> {
        self.state.sessions = sessions;
        self.save()
    }

    /// Book a finished session and save
    pub fn record_session(&mut self, energy_kwh: f64, sessions: serde_json::Value) -> Result<()> {
        if energy_kwh.is_finite() && energy_kwh > 0.0 {
            self.state.lifetime_energy_kwh += energy_kwh;
        }
        self.state.sessions = sessions;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_settings_do_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut pm = PersistenceManager::new(&path);
        pm.set_enabled(true).unwrap();
        assert!(!path.exists());
        pm.set_enabled(false).unwrap();
        assert!(path.exists());
    }
}
