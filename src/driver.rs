//! Driver: composition root of the charge point
//!
//! The driver owns the controller and everything around it (buttons,
//! remote transaction bridge, session ledger, persistence) and runs the
//! fixed-period step loop. External components talk to it through
//! [`DriverCommand`]s and observe it through a `watch` channel of
//! [`StatusSnapshot`]s.

use crate::buttons::ManualButtons;
use crate::config::Config;
use crate::controller::{ControllerEvent, EvseController};
use crate::error::Result;
use crate::hardware::{Clock, EvseHardware, SimHandle};
use crate::logging::{StructuredLogger, get_logger};
use crate::meter::MeterSource;
use crate::persistence::PersistenceManager;
use crate::session::ChargingSessionManager;
use crate::transaction::TransactionBridge;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};

mod commands;
mod types;

pub use types::{DriverCommand, DriverState, StatusSnapshot};

/// Main driver for the charge point
pub struct EvseDriver {
    /// Configuration
    config: Config,

    /// Charging state machine
    controller: EvseController,

    /// Time source shared with the controller
    clock: Arc<dyn Clock>,

    /// Input handle when running on simulated hardware
    sim: Option<SimHandle>,

    buttons: ManualButtons,
    bridge: TransactionBridge,
    sessions: ChargingSessionManager,
    persistence: PersistenceManager,

    /// Current driver state
    state: watch::Sender<DriverState>,

    /// Latest status for consumers (web, etc.)
    snapshot_tx: watch::Sender<Arc<StatusSnapshot>>,
    snapshot_rx: watch::Receiver<Arc<StatusSnapshot>>,

    /// Command receiver for external control
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,

    last_status_log: Duration,
    total_steps: u64,
    overrun_count: u64,

    /// Logger with context
    logger: StructuredLogger,
}

impl EvseDriver {
    /// Create a new driver instance. Persisted state is loaded best-effort.
    pub fn new(
        config: Config,
        hardware: Box<dyn EvseHardware>,
        meter: Box<dyn MeterSource>,
        clock: Arc<dyn Clock>,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    ) -> Self {
        let logger = get_logger("driver");
        logger.info("Initializing EVSE driver");

        let mut persistence = PersistenceManager::new(&config.state_file);
        if let Err(e) = persistence.load() {
            logger.warn(&format!("Ignoring unreadable state file: {}", e));
        }

        let mut sessions = ChargingSessionManager::new(config.session_history_size);
        match sessions.restore_state(persistence.state().sessions.clone()) {
            Ok(Some(interrupted)) => {
                if let Err(e) = persistence
                    .record_session(interrupted.energy_delivered_kwh, sessions.get_state())
                {
                    logger.warn(&format!("Failed to book interrupted session: {}", e));
                }
            }
            Ok(None) => {}
            Err(e) => logger.warn(&format!("Failed to restore session history: {}", e)),
        }

        let controller = EvseController::new(&config, hardware, meter, Arc::clone(&clock));
        let (state_tx, _) = watch::channel(DriverState::Initializing);

        let initial = Arc::new(StatusSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: DriverState::Initializing.as_str().to_string(),
            controller: controller.snapshot(),
            session: sessions.get_session_stats(),
            lifetime_energy_kwh: persistence.state().lifetime_energy_kwh,
            total_steps: 0,
            overrun_count: 0,
            step_interval_ms: config.step_interval_ms,
        });
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        Self {
            buttons: ManualButtons::new(&config.buttons),
            config,
            controller,
            clock,
            sim: None,
            bridge: TransactionBridge::new(),
            sessions,
            persistence,
            state: state_tx,
            snapshot_tx,
            snapshot_rx,
            commands_rx,
            last_status_log: Duration::ZERO,
            total_steps: 0,
            overrun_count: 0,
            logger,
        }
    }

    /// Route `Simulate` commands to this simulated board
    pub fn with_simulator(mut self, sim: SimHandle) -> Self {
        self.sim = Some(sim);
        self
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    pub fn controller(&self) -> &EvseController {
        &self.controller
    }

    pub fn sessions(&self) -> &ChargingSessionManager {
        &self.sessions
    }

    /// Initialise the hardware and restore operator settings
    pub fn start(&mut self) {
        self.controller.begin();

        let persisted = self.persistence.state().clone();
        if let Some(amps) = persisted.current_limit_amps {
            let applied = self.controller.set_current_limit(amps);
            self.logger
                .info(&format!("Restored current limit {} A", applied));
        }
        if !(self.config.start_enabled && persisted.enabled) {
            self.logger.info("Starting disabled");
            self.controller.set_enabled(false);
        }

        self.last_status_log = self.clock.now();
        self.state.send_replace(DriverState::Running);
        self.process_events();
        self.publish_snapshot();
    }

    /// One loop iteration: buttons, state machine step, bookkeeping
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.buttons.poll(&mut self.controller, now);
        self.controller.step();
        self.process_events();

        let sample = self.controller.meter_sample();
        self.sessions.update(sample.power, sample.energy_kwh);

        self.total_steps = self.total_steps.saturating_add(1);
        self.publish_snapshot();

        let status_every = Duration::from_millis(self.config.status_interval_ms);
        if now.saturating_sub(self.last_status_log) >= status_every {
            self.last_status_log = now;
            self.log_status();
            if self.sessions.current_session.is_some() {
                self.save_sessions();
            }
        }
    }

    /// Run the driver main loop until a `Shutdown` command arrives
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting EVSE driver main loop");
        self.start();

        let period = Duration::from_millis(self.config.step_interval_ms);
        let mut step_interval = interval(period);
        step_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = step_interval.tick() => {
                    let started = std::time::Instant::now();
                    self.tick();
                    if started.elapsed() > period {
                        self.overrun_count = self.overrun_count.saturating_add(1);
                    }
                }
                Some(cmd) = self.commands_rx.recv() => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Leave the outputs safe
    fn shutdown(&mut self) {
        self.state.send_replace(DriverState::ShuttingDown);
        self.logger.info("Shutting down driver");
        self.controller.set_enabled(false);
        self.process_events();
        self.publish_snapshot();
        self.logger.info("Driver shutdown complete");
    }

    /// Feed controller events into the session ledger and persistence
    fn process_events(&mut self) {
        for event in self.controller.drain_events() {
            match event {
                ControllerEvent::SessionStarted { entry } => {
                    match self.sessions.start_session(entry) {
                        Ok(_) => self.save_sessions(),
                        Err(e) => self
                            .logger
                            .warn(&format!("Could not open session record: {}", e)),
                    }
                }
                ControllerEvent::SessionEnded { reason, energy_kwh } => {
                    match self.sessions.end_session(reason, energy_kwh) {
                        Ok(session) => {
                            let ledger = self.sessions.get_state();
                            if let Err(e) = self
                                .persistence
                                .record_session(session.energy_delivered_kwh, ledger)
                            {
                                self.logger
                                    .warn(&format!("Failed to persist session: {}", e));
                            }
                        }
                        Err(e) => self
                            .logger
                            .warn(&format!("Could not close session record: {}", e)),
                    }
                }
                ControllerEvent::FaultRaised { cause, latched } => {
                    self.logger.warn(&format!(
                        "Fault raised: {}{}",
                        cause,
                        if latched {
                            ", acknowledgement required"
                        } else {
                            ""
                        }
                    ));
                }
                ControllerEvent::FaultCleared { cause } => {
                    self.logger.info(&format!("Fault cleared: {}", cause));
                }
                ControllerEvent::StateChanged { from, to } => {
                    self.logger.debug(&format!("Event: {} -> {}", from, to));
                }
            }
        }
    }

    /// Write the ledger including the running session
    fn save_sessions(&mut self) {
        if let Err(e) = self.persistence.save_sessions(self.sessions.get_state()) {
            self.logger
                .warn(&format!("Failed to save session ledger: {}", e));
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = StatusSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: self.state.borrow().as_str().to_string(),
            controller: self.controller.snapshot(),
            session: self.sessions.get_session_stats(),
            lifetime_energy_kwh: self.persistence.state().lifetime_energy_kwh,
            total_steps: self.total_steps,
            overrun_count: self.overrun_count,
            step_interval_ms: self.config.step_interval_ms,
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    fn log_status(&self) {
        let m = self.controller.meter_sample();
        self.logger.info(&format!(
            "State={} | CP={} ({:.2} V) | Offered={} A | V={:.1} I={:.2} P={:.0} W | E={:.3} kWh",
            self.controller.state(),
            self.controller.cp_state().as_str(),
            self.controller.cp_voltage(),
            self.controller.offered_current(),
            m.voltage,
            m.current,
            m.power,
            m.energy_kwh
        ));
    }
}
