//! Hardware seams for the charge point
//!
//! The state machine never touches GPIO directly. Everything it drives or
//! samples goes through [`EvseHardware`], and every timestamp comes from a
//! [`Clock`], so the same controller runs against a board or a simulation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

mod sim;

pub use sim::{SimHandle, SimInputs, SimulatedHardware};

/// Physical I/O of a single-outlet charge point.
///
/// Implementations must not block: every call is made from inside one
/// controller step.
pub trait EvseHardware: Send {
    /// One-time setup of the pilot PWM channel
    fn configure_pwm(&mut self, frequency_hz: u32, resolution_bits: u8);

    /// Program the pilot PWM compare value
    fn write_pwm_duty(&mut self, count: u32);

    /// Drive the main AC contactor
    fn set_contactor(&mut self, closed: bool);

    /// Raw ADC counts of the CP sense input
    fn read_cp_adc(&mut self) -> u16;

    /// Residual-current device healthy (not tripped)
    fn rcd_ok(&mut self) -> bool;

    /// Emergency stop not engaged
    fn emergency_stop_released(&mut self) -> bool;

    /// Raw level of the start button input
    fn start_button_level(&mut self) -> bool {
        true
    }

    /// Raw level of the stop button input
    fn stop_button_level(&mut self) -> bool {
        true
    }
}

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        let ms = u64::try_from(at.as_millis()).unwrap_or(u64::MAX);
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
