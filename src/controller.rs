//! Charging state machine
//!
//! [`EvseController`] owns every piece of charging state. An outer loop calls
//! [`EvseController::step`] at a short fixed period; each step samples the
//! pilot and safety inputs, performs at most one transition, keeps the
//! contactor consistent with the state and lets the meter sampler run when
//! its interval has elapsed.
//!
//! Collaborators (buttons, remote protocol, HTTP) only go through the public
//! operations. Requests are recorded in one slot per kind and consumed by the
//! transition that acts on them; rejected requests return a [`Rejection`] and
//! leave state untouched.

use crate::config::{Config, CurrentConfig};
use crate::hardware::{Clock, EvseHardware};
use crate::logging::{StructuredLogger, get_logger};
use crate::meter::{MeterSample, MeterSampler, MeterSource};
use crate::pilot::{CpState, CpThresholds, adc_to_volts};
use crate::pwm::DutyEncoder;
use std::collections::VecDeque;
use std::sync::Arc;

mod types;

use types::ActiveFault;
pub use types::{
    ChargeEntry, ControllerEvent, ControllerSnapshot, EvseState, FaultCause, Rejection,
    RequestResult, RequestSource, SessionEndReason,
};

/// Events kept for the next drain; the oldest are dropped beyond this
pub const MAX_PENDING_EVENTS: usize = 256;

/// The charging state machine
pub struct EvseController {
    hw: Box<dyn EvseHardware>,
    clock: Arc<dyn Clock>,
    thresholds: CpThresholds,
    adc_to_voltage: f64,
    encoder: DutyEncoder,
    sampler: MeterSampler,
    current: CurrentConfig,
    latched_causes: Vec<FaultCause>,

    state: EvseState,
    offered_current: i32,
    duty_percent: f64,
    contactor_closed: bool,
    cp_voltage: f64,
    cp_state: CpState,
    fault: Option<ActiveFault>,
    charge_request: Option<RequestSource>,
    stop_request: Option<RequestSource>,
    events: VecDeque<ControllerEvent>,

    logger: StructuredLogger,
}

impl EvseController {
    /// Build a controller in the `Disabled` state. Call [`begin`](Self::begin)
    /// before the first step.
    pub fn new(
        config: &Config,
        hw: Box<dyn EvseHardware>,
        meter: Box<dyn MeterSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let current = config.current.clone();
        let offered_current = current
            .default_amps
            .clamp(current.min_amps, current.max_amps);
        Self {
            hw,
            clock,
            thresholds: CpThresholds::from(&config.pilot),
            adc_to_voltage: config.pilot.adc_to_voltage,
            encoder: DutyEncoder::new(&config.pwm, current.min_amps),
            sampler: MeterSampler::new(&config.meter, meter),
            current,
            latched_causes: config.faults.latched.clone(),
            state: EvseState::Disabled,
            offered_current,
            duty_percent: 0.0,
            contactor_closed: false,
            cp_voltage: 0.0,
            cp_state: CpState::StateA,
            fault: None,
            charge_request: None,
            stop_request: None,
            events: VecDeque::new(),
            logger: get_logger("controller"),
        }
    }

    /// One-time hardware setup; leaves the machine enabled in `Idle`
    pub fn begin(&mut self) {
        self.encoder.configure(self.hw.as_mut());
        self.open_contactor();
        self.sampler.reset_timers(self.clock.now());
        self.sample_pilot();
        self.logger.info(&format!(
            "Controller initialised (CP {:.2} V, state {})",
            self.cp_voltage,
            self.cp_state.as_str()
        ));
        self.set_enabled(true);
    }

    /// Advance the machine by one tick
    pub fn step(&mut self) {
        self.sample_pilot();

        match self.state {
            EvseState::Disabled => {
                self.open_contactor();
                self.encoder.silence(self.hw.as_mut());
                self.duty_percent = 0.0;
            }
            EvseState::Idle | EvseState::WaitingForCar => {
                self.open_contactor();
                if let Some(cause) = self.safety_fault() {
                    self.enter_fault(cause);
                } else if let Some(source) = self.charge_request.take() {
                    self.logger.info(&format!(
                        "Charge requested ({:?}), waiting for authorization",
                        source
                    ));
                    self.transition(EvseState::WaitingForAuth);
                }
            }
            EvseState::WaitingForAuth => {
                if let Some(cause) = self.safety_fault() {
                    self.enter_fault(cause);
                } else if !self.cp_state.is_car_connected() {
                    self.charge_request = None;
                    self.logger
                        .info("Vehicle disconnected while waiting for authorization");
                    self.transition(EvseState::Idle);
                } else if let Some(source) = self.charge_request.take() {
                    match self.charge_preconditions() {
                        Ok(()) => {
                            self.logger
                                .info(&format!("Charging authorized ({:?})", source));
                            self.enter_charging(ChargeEntry::Manual);
                        }
                        Err(r) => self
                            .logger
                            .warn(&format!("Authorization dropped: {}", r)),
                    }
                }
            }
            EvseState::Charging => {
                if let Some(cause) = self.safety_fault() {
                    self.enter_fault(cause);
                } else if !self.cp_state.is_car_connected() {
                    self.leave_charging(SessionEndReason::VehicleDisconnected, EvseState::Idle);
                } else if let Some(source) = self.stop_request.take() {
                    self.leave_charging(SessionEndReason::StopRequested(source), EvseState::Idle);
                }
            }
            EvseState::Fault => {
                self.open_contactor();
                self.step_fault();
            }
        }

        let now = self.clock.now();
        self.sampler.poll(now, self.state == EvseState::Charging);
    }

    /// Hard override usable from any state
    pub fn set_enabled(&mut self, enabled: bool) {
        let target = if enabled {
            EvseState::Idle
        } else {
            EvseState::Disabled
        };

        if self.state == EvseState::Charging {
            let reason = if enabled {
                SessionEndReason::Reenabled
            } else {
                SessionEndReason::Disabled
            };
            self.end_session(reason);
        }
        if let Some(f) = self.fault.take() {
            self.logger
                .info(&format!("Fault '{}' cleared by enable override", f.cause));
            self.push_event(ControllerEvent::FaultCleared { cause: f.cause });
        }

        self.charge_request = None;
        self.stop_request = None;
        self.open_contactor();

        if enabled {
            self.apply_pwm();
        } else {
            self.encoder.silence(self.hw.as_mut());
            self.duty_percent = 0.0;
        }

        self.logger.info(&format!(
            "Controller {}",
            if enabled { "enabled" } else { "disabled" }
        ));
        self.transition(target);
    }

    /// Clamp and apply a new offered current; returns the value in effect
    pub fn set_current_limit(&mut self, amps: i32) -> i32 {
        let clamped = amps.clamp(self.current.min_amps, self.current.max_amps);
        if clamped != amps {
            self.logger.debug(&format!(
                "Current limit {} A clamped to {} A",
                amps, clamped
            ));
        }
        if clamped != self.offered_current {
            self.logger.info(&format!(
                "Offered current {} A -> {} A",
                self.offered_current, clamped
            ));
        }
        self.offered_current = clamped;
        // Disabled keeps the pilot at 0 % until re-enabled
        if self.state != EvseState::Disabled {
            self.apply_pwm();
        }
        clamped
    }

    /// First press asks for authorization, a second press while
    /// `WaitingForAuth` grants it
    pub fn start_charging_request(&mut self, source: RequestSource) -> RequestResult {
        self.reject_start()?;
        self.logger
            .debug(&format!("Charge request from {:?} recorded", source));
        self.charge_request = Some(source);
        Ok(())
    }

    /// Enter Charging immediately, skipping the authorization step
    pub fn start_charging_remote(&mut self, source: RequestSource) -> RequestResult {
        self.reject_start()?;
        self.sample_pilot();
        if let Err(r) = self.charge_preconditions() {
            self.logger
                .warn(&format!("Remote start from {:?} rejected: {}", source, r));
            return Err(r);
        }
        self.logger
            .info(&format!("Remote start from {:?} accepted", source));
        self.enter_charging(ChargeEntry::Remote);
        Ok(())
    }

    /// Ask the current session to end on the next step
    pub fn stop_charging_request(&mut self, source: RequestSource) -> RequestResult {
        if self.state != EvseState::Charging {
            return Err(Rejection::NotCharging);
        }
        self.logger
            .debug(&format!("Stop request from {:?} recorded", source));
        self.stop_request = Some(source);
        Ok(())
    }

    /// Release a latched fault once its cause is gone; recovery still needs
    /// the vehicle unplugged
    pub fn acknowledge_fault(&mut self) -> RequestResult {
        if self.state != EvseState::Fault || self.fault.is_none() {
            return Err(Rejection::NotFaulted);
        }
        self.sample_pilot();
        if let Some(cause) = self.safety_fault() {
            self.logger
                .warn(&format!("Fault acknowledge refused, {} still present", cause));
            return Err(Rejection::SafetyNotOk(cause));
        }
        if let Some(f) = self.fault.as_mut() {
            f.acknowledged = true;
            self.logger
                .info(&format!("Fault '{}' acknowledged", f.cause));
        }
        Ok(())
    }

    pub fn state(&self) -> EvseState {
        self.state
    }

    pub fn offered_current(&self) -> i32 {
        self.offered_current
    }

    pub fn meter_sample(&self) -> &MeterSample {
        self.sampler.latest()
    }

    pub fn cp_state(&self) -> CpState {
        self.cp_state
    }

    pub fn cp_voltage(&self) -> f64 {
        self.cp_voltage
    }

    pub fn fault(&self) -> Option<FaultCause> {
        self.fault.map(|f| f.cause)
    }

    pub fn contactor_closed(&self) -> bool {
        self.contactor_closed
    }

    pub fn duty_percent(&self) -> f64 {
        self.duty_percent
    }

    pub fn current_limits(&self) -> (i32, i32) {
        (self.current.min_amps, self.current.max_amps)
    }

    /// Raw level of the manual start/stop inputs
    pub fn button_levels(&mut self) -> (bool, bool) {
        (self.hw.start_button_level(), self.hw.stop_button_level())
    }

    /// Take the events queued since the last drain, oldest first
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        self.events.drain(..).collect()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            cp_state: self.cp_state,
            cp_voltage: self.cp_voltage,
            car_connected: self.cp_state.is_car_connected(),
            offered_current_amps: self.offered_current,
            duty_percent: self.duty_percent,
            contactor_closed: self.contactor_closed,
            fault: self.fault(),
            fault_latched: self.fault.is_some_and(|f| !f.may_recover()),
            charge_request: self.charge_request,
            stop_request: self.stop_request,
            meter: self.sampler.latest().clone(),
        }
    }

    fn sample_pilot(&mut self) {
        let counts = self.hw.read_cp_adc();
        self.cp_voltage = adc_to_volts(counts, self.adc_to_voltage);
        let decoded = self.thresholds.decode(self.cp_voltage);
        if decoded != self.cp_state {
            self.logger.debug(&format!(
                "CP {} -> {} ({:.2} V)",
                self.cp_state.as_str(),
                decoded.as_str(),
                self.cp_voltage
            ));
        }
        self.cp_state = decoded;
    }

    /// First failing safety check, `None` when safe
    fn safety_fault(&mut self) -> Option<FaultCause> {
        if !self.hw.emergency_stop_released() {
            Some(FaultCause::EmergencyStop)
        } else if !self.hw.rcd_ok() {
            Some(FaultCause::RcdTripped)
        } else {
            self.thresholds.fault_of(self.cp_voltage).map(FaultCause::from)
        }
    }

    /// Conditions both entry paths must meet right before closing the contactor
    fn charge_preconditions(&mut self) -> RequestResult {
        if let Some(cause) = self.safety_fault() {
            return Err(Rejection::SafetyNotOk(cause));
        }
        if !self.cp_state.is_car_connected() {
            return Err(Rejection::VehicleNotConnected);
        }
        Ok(())
    }

    fn reject_start(&self) -> RequestResult {
        match self.state {
            EvseState::Charging => Err(Rejection::AlreadyCharging),
            EvseState::Disabled => Err(Rejection::Disabled),
            EvseState::Fault => Err(Rejection::Faulted),
            _ => Ok(()),
        }
    }

    fn step_fault(&mut self) {
        let Some(mut active) = self.fault else {
            self.transition(EvseState::Idle);
            return;
        };

        match self.safety_fault() {
            Some(cause) => {
                if cause != active.cause {
                    self.logger.warn(&format!(
                        "Fault cause changed: {} -> {}",
                        active.cause, cause
                    ));
                    active.cause = cause;
                    if self.is_latched(cause) {
                        // An earlier acknowledge does not cover the new cause
                        active.latched = true;
                        active.acknowledged = false;
                    }
                    self.fault = Some(active);
                    self.push_event(ControllerEvent::FaultRaised {
                        cause,
                        latched: active.latched,
                    });
                }
            }
            None if self.cp_state.is_car_connected() => {}
            None if !active.may_recover() => {}
            None => {
                self.fault = None;
                self.logger
                    .info(&format!("Fault '{}' cleared", active.cause));
                self.push_event(ControllerEvent::FaultCleared { cause: active.cause });
                self.transition(EvseState::Idle);
            }
        }
    }

    fn is_latched(&self, cause: FaultCause) -> bool {
        self.latched_causes.contains(&cause)
    }

    fn enter_fault(&mut self, cause: FaultCause) {
        if self.state == EvseState::Charging {
            self.end_session(SessionEndReason::SafetyFault(cause));
        }
        self.open_contactor();
        self.charge_request = None;
        self.stop_request = None;

        let latched = self.is_latched(cause);
        self.fault = Some(ActiveFault {
            cause,
            latched,
            acknowledged: false,
        });
        self.logger.error(&format!(
            "Safety fault: {}{}",
            cause,
            if latched { " (latched)" } else { "" }
        ));
        self.push_event(ControllerEvent::FaultRaised { cause, latched });
        self.transition(EvseState::Fault);
    }

    fn enter_charging(&mut self, entry: ChargeEntry) {
        self.charge_request = None;
        self.stop_request = None;
        self.sampler.start_session(self.clock.now());
        self.close_contactor();
        self.push_event(ControllerEvent::SessionStarted { entry });
        self.transition(EvseState::Charging);
    }

    fn leave_charging(&mut self, reason: SessionEndReason, next: EvseState) {
        self.end_session(reason);
        self.transition(next);
    }

    /// Open the contactor and close the books on the running session
    fn end_session(&mut self, reason: SessionEndReason) {
        self.open_contactor();
        self.charge_request = None;
        self.stop_request = None;
        let energy_kwh = self.sampler.latest().energy_kwh;
        self.logger.info(&format!(
            "Charging stopped ({:?}), session energy {:.3} kWh",
            reason, energy_kwh
        ));
        self.push_event(ControllerEvent::SessionEnded { reason, energy_kwh });
    }

    fn push_event(&mut self, event: ControllerEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn transition(&mut self, to: EvseState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.logger.info(&format!("State {} -> {}", from, to));
        self.push_event(ControllerEvent::StateChanged { from, to });
    }

    fn apply_pwm(&mut self) {
        let (pct, count) = self.encoder.apply(self.hw.as_mut(), self.offered_current);
        self.duty_percent = pct;
        self.logger.debug(&format!(
            "PWM duty {:.2} % (count {}) for {} A",
            pct, count, self.offered_current
        ));
    }

    fn open_contactor(&mut self) {
        if self.contactor_closed {
            self.logger.info("Contactor opened");
        }
        self.hw.set_contactor(false);
        self.contactor_closed = false;
    }

    fn close_contactor(&mut self) {
        self.hw.set_contactor(true);
        self.contactor_closed = true;
        self.logger.info("Contactor closed");
    }
}
