//! In-memory GPIO backend.
//!
//! Used whenever real hardware cannot be claimed, and by every test. Inputs
//! are injected with [`SimulatedGpio::set_input`]; outputs, PWM duty and
//! step pulse counts can be inspected afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::HalError;
use crate::traits::Gpio;

#[derive(Debug, Default)]
struct Lines {
    inputs: HashMap<u8, bool>,
    outputs: HashMap<u8, bool>,
    duty: HashMap<u8, f32>,
    rising_edges: HashMap<u8, u32>,
    failing: HashSet<u8>,
    released: bool,
}

/// Simulated GPIO lines.
///
/// A single mutex covers every line, which serializes all writes.
///
/// # Example
///
/// ```rust
/// use plinth_controller::hal::SimulatedGpio;
/// use plinth_controller::traits::Gpio;
///
/// let gpio = SimulatedGpio::new();
/// gpio.write_output(23, true).unwrap();
/// gpio.write_output(23, false).unwrap();
/// assert_eq!(gpio.rising_edges(23), 1);
/// assert_eq!(gpio.output(23), Some(false));
/// ```
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    lines: Mutex<Lines>,
}

impl SimulatedGpio {
    /// Creates a simulation with every line low.
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, Lines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the level an input line reports (already active-high).
    pub fn set_input(&self, line: u8, asserted: bool) {
        self.lines().inputs.insert(line, asserted);
    }

    /// Last level written to an output line.
    pub fn output(&self, line: u8) -> Option<bool> {
        self.lines().outputs.get(&line).copied()
    }

    /// Last PWM duty written to a line, in percent.
    pub fn duty(&self, line: u8) -> Option<f32> {
        self.lines().duty.get(&line).copied()
    }

    /// Number of low-to-high transitions written to a line.
    pub fn rising_edges(&self, line: u8) -> u32 {
        self.lines().rising_edges.get(&line).copied().unwrap_or(0)
    }

    /// Make every write to `line` fail until [`Self::clear_failure`].
    pub fn fail_line(&self, line: u8) {
        self.lines().failing.insert(line);
    }

    /// Undo [`Self::fail_line`].
    pub fn clear_failure(&self, line: u8) {
        self.lines().failing.remove(&line);
    }

    /// Whether [`Gpio::shutdown`] has run.
    pub fn is_released(&self) -> bool {
        self.lines().released
    }

    fn check_writable(lines: &Lines, line: u8) -> Result<(), HalError> {
        if lines.released {
            return Err(HalError::Released(line));
        }
        if lines.failing.contains(&line) {
            return Err(HalError::driver(line, "simulated write failure"));
        }
        Ok(())
    }
}

impl Gpio for SimulatedGpio {
    fn read_input(&self, line: u8) -> Result<bool, HalError> {
        let lines = self.lines();
        if lines.released {
            return Err(HalError::Released(line));
        }
        Ok(lines.inputs.get(&line).copied().unwrap_or(false))
    }

    fn write_output(&self, line: u8, high: bool) -> Result<(), HalError> {
        let mut lines = self.lines();
        Self::check_writable(&lines, line)?;
        let previous = lines.outputs.insert(line, high).unwrap_or(false);
        if high && !previous {
            *lines.rising_edges.entry(line).or_insert(0) += 1;
        }
        log::trace!("[SIM] GPIO {} = {}", line, u8::from(high));
        Ok(())
    }

    fn set_pwm_duty(&self, line: u8, percent: f32) -> Result<(), HalError> {
        let mut lines = self.lines();
        Self::check_writable(&lines, line)?;
        let percent = percent.clamp(0.0, 100.0);
        lines.duty.insert(line, percent);
        log::debug!("[SIM] GPIO {} duty = {:.1}%", line, percent);
        Ok(())
    }

    fn shutdown(&self) {
        let mut lines = self.lines();
        if lines.released {
            return;
        }
        for duty in lines.duty.values_mut() {
            *duty = 0.0;
        }
        for level in lines.outputs.values_mut() {
            *level = false;
        }
        lines.released = true;
        log::info!("[SIM] GPIO released");
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
