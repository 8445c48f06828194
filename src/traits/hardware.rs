//! Hardware abstraction traits for digital lines, PWM and time.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Gpio`] | Digital input/output and PWM duty on numbered lines |
//! | [`Clock`] | Monotonic millisecond time source |
//!
//! # Implementation
//!
//! The simulated backend in [`crate::hal::SimulatedGpio`] is used for tests
//! and whenever real hardware cannot be claimed. The Raspberry Pi backend
//! lives in `hal::rpi` (requires the `rpi` feature).
//!
//! # Example
//!
//! ```rust
//! use plinth_controller::hal::SimulatedGpio;
//! use plinth_controller::traits::Gpio;
//!
//! let gpio = SimulatedGpio::new();
//! gpio.set_input(17, true);
//! assert!(gpio.read_input(17).unwrap());
//!
//! gpio.set_pwm_duty(22, 50.0).unwrap();
//! assert_eq!(gpio.duty(22), Some(50.0));
//! ```

use std::time::Instant;

use crate::error::HalError;

/// Digital I/O and PWM on numbered hardware lines.
///
/// All methods take `&self`: backends are shared between the motor loop,
/// the input loop, the command server and the LED animation, so they
/// serialize writes to each line internally.
///
/// # Implementation Notes
///
/// - Inputs are reported as "asserted = true". Active-low wiring is
///   inverted inside the backend, never by callers.
/// - PWM duty is a percentage, 0.0 to 100.0. Values outside are clamped.
/// - `shutdown` must be idempotent. Calls after shutdown return
///   [`HalError::Released`].
pub trait Gpio: Send + Sync {
    /// Read a digital input line.
    fn read_input(&self, line: u8) -> Result<bool, HalError>;

    /// Drive a digital output line.
    fn write_output(&self, line: u8, high: bool) -> Result<(), HalError>;

    /// Set the PWM duty cycle of a line, in percent.
    fn set_pwm_duty(&self, line: u8, percent: f32) -> Result<(), HalError>;

    /// Stop PWM generation and release every claimed line.
    fn shutdown(&self);

    /// Whether this backend is the in-memory simulation.
    fn is_simulated(&self) -> bool;
}

impl<G: Gpio + ?Sized> Gpio for std::sync::Arc<G> {
    fn read_input(&self, line: u8) -> Result<bool, HalError> {
        (**self).read_input(line)
    }

    fn write_output(&self, line: u8, high: bool) -> Result<(), HalError> {
        (**self).write_output(line, high)
    }

    fn set_pwm_duty(&self, line: u8, percent: f32) -> Result<(), HalError> {
        (**self).set_pwm_duty(line, percent)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

/// Convert an 8-bit brightness into a PWM duty percentage.
///
/// ```
/// use plinth_controller::traits::brightness_to_duty;
///
/// assert_eq!(brightness_to_duty(0), 0.0);
/// assert_eq!(brightness_to_duty(255), 100.0);
/// assert!((brightness_to_duty(150) - 58.82).abs() < 0.01);
/// ```
#[inline]
pub fn brightness_to_duty(brightness: u8) -> f32 {
    f32::from(brightness) / 255.0 * 100.0
}

/// Time source in milliseconds.
///
/// Time-dependent logic (debouncing, hold detection) takes `now_ms`
/// explicitly so it can be driven by [`crate::hal::MockClock`] in tests.
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

/// Wall clock based on [`Instant`], counting from its creation.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Start a new clock at zero.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
