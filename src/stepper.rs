//! Stepper motor state machine for the lid.
//!
//! The controller owns position, target and state behind one mutex. Commands
//! (`open`, `close`, `stop`) only change the target and state; the motor loop
//! calls [`StepperMotor::execute_step`] at a fixed cadence and that is the
//! only place step pulses are produced.
//!
//! # State Machine
//!
//! ```text
//!            open()                       reached STEPS_FULL
//!   Idle ───────────────▶ Opening ─────────────────────────▶ Open
//!   Closed ─────────────▶    │                                 │
//!   Error  ─────────────▶    │ stop()                  close() │
//!                            ▼                                 ▼
//!                          Idle ◀──── stop() ──── Closing ◀────┘
//!                                                    │ reached 0
//!                                                    ▼
//!                                                 Closed
//! ```
//!
//! A hardware write failure during a step moves the motor to `Error`, from
//! which both `open` and `close` are accepted again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{MotorConfig, PinConfig};
use crate::error::HalError;
use crate::traits::Gpio;

/// Lid motor state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MotorState {
    /// Not moving, position unknown or mid-travel
    #[default]
    Idle,
    /// Moving toward the open end-stop
    Opening,
    /// Moving toward the closed end-stop
    Closing,
    /// At the open end-stop
    Open,
    /// At the closed end-stop
    Closed,
    /// A step failed; accepts open/close again
    Error,
}

impl MotorState {
    /// Whether the motor loop has work to do in this state.
    pub fn is_moving(&self) -> bool {
        matches!(self, MotorState::Opening | MotorState::Closing)
    }
}

impl core::fmt::Display for MotorState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            MotorState::Idle => "idle",
            MotorState::Opening => "opening",
            MotorState::Closing => "closing",
            MotorState::Open => "open",
            MotorState::Closed => "closed",
            MotorState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Motion {
    state: MotorState,
    position: u32,
    target: u32,
}

/// Snapshot of the motor for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotorSnapshot {
    /// Current state
    pub state: MotorState,
    /// Current position in steps, 0 = closed
    pub position: u32,
    /// Target position in steps
    pub target: u32,
}

/// Stepper motor driving the lid through STEP/DIR/ENABLE lines.
pub struct StepperMotor<G> {
    gpio: Arc<G>,
    pins: PinConfig,
    steps_full: u32,
    pulse: Duration,
    motion: Mutex<Motion>,
}

impl<G: Gpio> StepperMotor<G> {
    /// Create a motor at position 0 in the `Idle` state.
    pub fn new(gpio: Arc<G>, pins: PinConfig, config: &MotorConfig) -> Self {
        Self {
            gpio,
            pins,
            steps_full: config.steps_full,
            pulse: Duration::from_micros(config.step_pulse_us),
            motion: Mutex::new(Motion {
                state: MotorState::Idle,
                position: 0,
                target: 0,
            }),
        }
    }

    fn motion(&self) -> MutexGuard<'_, Motion> {
        self.motion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> MotorState {
        self.motion().state
    }

    /// Current position in steps.
    pub fn position(&self) -> u32 {
        self.motion().position
    }

    /// Current target in steps.
    pub fn target(&self) -> u32 {
        self.motion().target
    }

    /// Full travel in steps.
    pub fn steps_full(&self) -> u32 {
        self.steps_full
    }

    /// Consistent view of state, position and target.
    pub fn snapshot(&self) -> MotorSnapshot {
        let m = self.motion();
        MotorSnapshot {
            state: m.state,
            position: m.position,
            target: m.target,
        }
    }

    /// Start opening. Accepted from `Idle`, `Closed` and `Error`.
    pub fn open(&self) -> bool {
        let mut m = self.motion();
        match m.state {
            MotorState::Idle | MotorState::Closed | MotorState::Error => {
                m.target = self.steps_full;
                m.state = MotorState::Opening;
                log::info!("Motor opening from position {}", m.position);
                true
            }
            state => {
                log::debug!("Motor open ignored while {}", state);
                false
            }
        }
    }

    /// Start closing. Accepted from `Idle`, `Open` and `Error`.
    pub fn close(&self) -> bool {
        let mut m = self.motion();
        match m.state {
            MotorState::Idle | MotorState::Open | MotorState::Error => {
                m.target = 0;
                m.state = MotorState::Closing;
                log::info!("Motor closing from position {}", m.position);
                true
            }
            state => {
                log::debug!("Motor close ignored while {}", state);
                false
            }
        }
    }

    /// Stop immediately and release the motor. Position is kept.
    pub fn stop(&self) {
        let mut m = self.motion();
        m.state = MotorState::Idle;
        if let Err(e) = self.gpio.write_output(self.pins.enable, false) {
            log::error!("Failed to disable motor on GPIO {}: {}", self.pins.enable, e);
        }
        log::info!("Motor stopped at position {}", m.position);
    }

    /// Advance one step toward the target, if moving.
    ///
    /// The lock is held for the whole step, including the pulse width.
    ///
    /// # Errors
    ///
    /// A failed hardware write moves the motor to [`MotorState::Error`]
    /// and is returned for the caller to log.
    pub fn execute_step(&self) -> Result<(), HalError> {
        let mut m = self.motion();
        if !m.state.is_moving() {
            return Ok(());
        }

        if m.position == m.target {
            // Already at the end-stop the command asked for
            self.finish(&mut m);
            return Ok(());
        }

        let forward = m.position < m.target;
        if let Err(e) = self.pulse_once(forward) {
            m.state = MotorState::Error;
            let _ = self.gpio.write_output(self.pins.enable, false);
            return Err(e);
        }

        if forward {
            m.position += 1;
        } else {
            m.position -= 1;
        }

        if m.position == m.target {
            self.finish(&mut m);
        }
        Ok(())
    }

    fn pulse_once(&self, forward: bool) -> Result<(), HalError> {
        self.gpio.write_output(self.pins.dir, forward)?;
        self.gpio.write_output(self.pins.enable, true)?;
        self.gpio.write_output(self.pins.step, true)?;
        if !self.pulse.is_zero() {
            std::thread::sleep(self.pulse);
        }
        self.gpio.write_output(self.pins.step, false)
    }

    fn finish(&self, m: &mut Motion) {
        m.state = match m.state {
            MotorState::Opening => MotorState::Open,
            _ => MotorState::Closed,
        };
        if let Err(e) = self.gpio.write_output(self.pins.enable, false) {
            log::error!("Failed to disable motor on GPIO {}: {}", self.pins.enable, e);
        }
        log::info!("Motor {} at position {}", m.state, m.position);
    }
}
