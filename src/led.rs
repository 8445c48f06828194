//! Indicator LED output and pulse animation.
//!
//! The LED has exactly one writer at a time: either a direct brightness
//! (command server) or a pulse animation task. Both go through the same
//! lock, and the pulse task re-checks its `active` flag under that lock
//! before every frame, so once [`LedController::cancel_pulse`] or
//! [`LedController::set_brightness`] returns the animation can no longer
//! touch the line.
//!
//! # Pulse Ramp
//!
//! ```text
//! max ┤    /\    /\
//!     │   /  \  /  \
//! min ┤  /    \/    \ ...
//!     └──┴────┴────┴───▶ t
//!        ½T   T
//! ```
//!
//! One half-period rises linearly from `min` to `max`, the next falls back.
//! Frames are `step_ms` apart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use crate::config::LedConfig;
use crate::error::HalError;
use crate::traits::{brightness_to_duty, Gpio};

// ============================================================================
// Pulse Parameters
// ============================================================================

/// Shape of a pulse animation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PulseParams {
    /// Full rise-and-fall cycles per second
    pub frequency_hz: f32,
    /// Floor brightness
    pub min: u8,
    /// Ceiling brightness
    pub max: u8,
    /// Time between frames
    pub step_ms: u64,
}

impl Default for PulseParams {
    fn default() -> Self {
        Self::from_config(&LedConfig::default())
    }
}

impl PulseParams {
    /// Pulse shape configured for the `led/pulse` command.
    pub fn from_config(config: &LedConfig) -> Self {
        Self {
            frequency_hz: config.pulse_frequency_hz,
            min: config.pulse_min,
            max: config.pulse_max,
            step_ms: config.pulse_step_ms,
        }
    }

    /// Frames per half-period, at least one.
    ///
    /// ```
    /// use plinth_controller::led::PulseParams;
    ///
    /// // 2 Hz: 250 ms half-period in 20 ms frames
    /// assert_eq!(PulseParams::default().half_steps(), 12);
    /// ```
    pub fn half_steps(&self) -> u32 {
        if self.frequency_hz <= 0.0 || self.step_ms == 0 {
            return 1;
        }
        let half_ms = 1000.0 / self.frequency_hz / 2.0;
        ((half_ms / self.step_ms as f32) as u32).max(1)
    }

    /// Brightness of frame `index`, counting from the start of the animation.
    pub fn frame(&self, index: u64) -> u8 {
        let steps = self.half_steps();
        let phase = (index % (2 * u64::from(steps))) as u32;
        let min = f32::from(self.min);
        let max = f32::from(self.max);
        let range = max - min;
        let level = if phase < steps {
            min + range * phase as f32 / steps as f32
        } else {
            max - range * (phase - steps) as f32 / steps as f32
        };
        level.clamp(0.0, 255.0) as u8
    }

    /// Frame period.
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms.max(1))
    }
}

// ============================================================================
// LED Controller
// ============================================================================

struct PulseTask {
    active: Arc<AtomicBool>,
    params: PulseParams,
}

struct LedState {
    brightness: u8,
    pulse: Option<PulseTask>,
}

struct Shared<G> {
    gpio: Arc<G>,
    line: u8,
    state: Mutex<LedState>,
}

impl<G: Gpio> Shared<G> {
    fn state(&self) -> MutexGuard<'_, LedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a duty cycle with the state lock already held.
    fn write(&self, state: &mut LedState, brightness: u8) -> Result<(), HalError> {
        self.gpio
            .set_pwm_duty(self.line, brightness_to_duty(brightness))?;
        state.brightness = brightness;
        Ok(())
    }

    /// Write one animation frame, unless the pulse was cancelled.
    fn write_frame(&self, active: &AtomicBool, brightness: u8) -> bool {
        let mut state = self.state();
        if !active.load(Ordering::SeqCst) {
            return false;
        }
        if let Err(e) = self.write(&mut state, brightness) {
            log::error!("Error in LED pulse animation on GPIO {}: {}", self.line, e);
        }
        true
    }
}

/// The indicator LED.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use plinth_controller::config::LedConfig;
/// use plinth_controller::hal::SimulatedGpio;
/// use plinth_controller::led::LedController;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gpio = Arc::new(SimulatedGpio::new());
/// let led = LedController::new(Arc::clone(&gpio), 22, &LedConfig::default(), tokio::runtime::Handle::current());
///
/// led.set_brightness(255).unwrap();
/// assert_eq!(gpio.duty(22), Some(100.0));
///
/// led.start_default_pulse();
/// assert!(led.is_pulsing());
/// led.cancel_pulse();
/// assert!(!led.is_pulsing());
/// assert_eq!(gpio.duty(22), Some(0.0));
/// # }
/// ```
pub struct LedController<G> {
    shared: Arc<Shared<G>>,
    default_pulse: PulseParams,
    indicator: u8,
    runtime: Handle,
}

impl<G: Gpio + 'static> LedController<G> {
    /// Drive the LED on `line`. Pulse tasks are spawned on `runtime`.
    pub fn new(gpio: Arc<G>, line: u8, config: &LedConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                gpio,
                line,
                state: Mutex::new(LedState {
                    brightness: 0,
                    pulse: None,
                }),
            }),
            default_pulse: PulseParams::from_config(config),
            indicator: config.indicator_brightness,
            runtime,
        }
    }

    /// Last brightness written, by either writer.
    pub fn brightness(&self) -> u8 {
        self.shared.state().brightness
    }

    /// Whether a pulse animation owns the LED.
    pub fn is_pulsing(&self) -> bool {
        self.shared.state().pulse.is_some()
    }

    /// Parameters of the running pulse, if any.
    pub fn pulse_params(&self) -> Option<PulseParams> {
        self.shared.state().pulse.as_ref().map(|p| p.params)
    }

    /// Set a direct brightness, cancelling any pulse first.
    pub fn set_brightness(&self, brightness: u8) -> Result<(), HalError> {
        let mut state = self.shared.state();
        if let Some(pulse) = state.pulse.take() {
            pulse.active.store(false, Ordering::SeqCst);
            log::debug!("LED pulse stopped by direct brightness");
        }
        self.shared.write(&mut state, brightness)?;
        log::debug!("LED brightness set to {}", brightness);
        Ok(())
    }

    /// Show the indicator brightness used by the `enable` command.
    pub fn indicate(&self) -> Result<(), HalError> {
        self.set_brightness(self.indicator)
    }

    /// Cancel any pulse and turn the LED off.
    pub fn off(&self) -> Result<(), HalError> {
        self.set_brightness(0)
    }

    /// Stop the running pulse and force the LED to 0.
    ///
    /// Returns whether a pulse was running. Safe to call at any time.
    pub fn cancel_pulse(&self) -> bool {
        let mut state = self.shared.state();
        let Some(pulse) = state.pulse.take() else {
            return false;
        };
        pulse.active.store(false, Ordering::SeqCst);
        if let Err(e) = self.shared.write(&mut state, 0) {
            log::error!("Failed to turn off LED on GPIO {}: {}", self.shared.line, e);
        }
        log::debug!("LED pulse animation stopped");
        true
    }

    /// Start the configured default pulse.
    pub fn start_default_pulse(&self) {
        self.start_pulse(self.default_pulse);
    }

    /// Start a pulse animation, replacing any running one.
    pub fn start_pulse(&self, params: PulseParams) {
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut state = self.shared.state();
            if let Some(old) = state.pulse.take() {
                old.active.store(false, Ordering::SeqCst);
            }
            state.pulse = Some(PulseTask {
                active: Arc::clone(&active),
                params,
            });
        }

        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(params.step());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut index = 0u64;
            loop {
                ticker.tick().await;
                if !shared.write_frame(&active, params.frame(index)) {
                    break;
                }
                index = index.wrapping_add(1);
            }
        });
        log::debug!(
            "LED pulse started (freq={}Hz, min={}, max={})",
            params.frequency_hz,
            params.min,
            params.max
        );
    }
}
