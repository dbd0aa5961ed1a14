//! Manual start/stop buttons
//!
//! Button modules differ in polarity, so a press is any level change. A
//! press is accepted only when strictly more than the debounce time has
//! passed since the previous accepted press of the same button.

use crate::config::ButtonsConfig;
use crate::controller::{EvseController, RequestResult, RequestSource};
use crate::logging::{StructuredLogger, get_logger};
use std::time::Duration;

/// Edge detector with minimum inter-press spacing
#[derive(Debug, Clone)]
pub struct Button {
    last_level: bool,
    last_press: Option<Duration>,
    debounce: Duration,
}

impl Button {
    /// Inputs idle high (pull-up)
    pub fn new(debounce: Duration) -> Self {
        Self {
            last_level: true,
            last_press: None,
            debounce,
        }
    }

    /// Feed the current level; returns true on an accepted press
    pub fn update(&mut self, level: bool, now: Duration) -> bool {
        let edge = level != self.last_level;
        self.last_level = level;
        if !edge {
            return false;
        }
        match self.last_press {
            Some(prev) if now.saturating_sub(prev) <= self.debounce => false,
            _ => {
                self.last_press = Some(now);
                true
            }
        }
    }
}

/// Which button produced a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPress {
    Start,
    Stop,
}

/// The start and stop buttons wired to the controller
pub struct ManualButtons {
    start: Button,
    stop: Button,
    logger: StructuredLogger,
}

impl ManualButtons {
    pub fn new(cfg: &ButtonsConfig) -> Self {
        let debounce = Duration::from_millis(cfg.debounce_ms);
        Self {
            start: Button::new(debounce),
            stop: Button::new(debounce),
            logger: get_logger("buttons"),
        }
    }

    /// Sample both inputs and forward accepted presses to the controller
    pub fn poll(
        &mut self,
        ctl: &mut EvseController,
        now: Duration,
    ) -> Vec<(ButtonPress, RequestResult)> {
        let (start_level, stop_level) = ctl.button_levels();
        let mut presses = Vec::new();

        if self.start.update(start_level, now) {
            let result = ctl.start_charging_request(RequestSource::Manual);
            self.log_press(ButtonPress::Start, ctl, &result);
            presses.push((ButtonPress::Start, result));
        }
        if self.stop.update(stop_level, now) {
            let result = ctl.stop_charging_request(RequestSource::Manual);
            self.log_press(ButtonPress::Stop, ctl, &result);
            presses.push((ButtonPress::Stop, result));
        }

        presses
    }

    fn log_press(&self, press: ButtonPress, ctl: &EvseController, result: &RequestResult) {
        match result {
            Ok(()) => self.logger.info(&format!(
                "{:?} button pressed in state {}",
                press,
                ctl.state()
            )),
            Err(r) => self.logger.info(&format!(
                "{:?} button ignored in state {}: {}",
                press,
                ctl.state(),
                r
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn either_edge_is_a_press() {
        let mut b = Button::new(ms(200));
        assert!(!b.update(true, ms(0)));
        assert!(b.update(false, ms(1000)));
        assert!(!b.update(false, ms(1100)));
        assert!(b.update(true, ms(2000)));
    }

    #[test]
    fn presses_closer_than_debounce_are_dropped() {
        let mut b = Button::new(ms(200));
        assert!(b.update(false, ms(1000)));
        assert!(!b.update(true, ms(1100)));
        // Exactly the debounce time is still too close
        assert!(!b.update(false, ms(1200)));
        assert!(b.update(true, ms(1201)));
    }
}
