//! Shared plinth state used by every loop and the command server.
//!
//! `SharedPlinth` owns the components that more than one context touches:
//! the stepper motor (motor loop + commands + maintenance hold), the LED
//! (commands + pulse task), the messenger (input loop + watchdog) and the
//! coarse [`PlinthState`]. Each component guards itself; there is no lock
//! around the bundle as a whole.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use plinth_controller::config::Config;
//! use plinth_controller::hal::{MockConnector, SimulatedGpio};
//! use plinth_controller::messages::PlinthCommand;
//! use plinth_controller::services::{CommandHandler, PlinthState, SharedPlinth};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gpio = Arc::new(SimulatedGpio::new());
//! let plinth = SharedPlinth::new(
//!     &Config::default(),
//!     Arc::clone(&gpio),
//!     MockConnector::reachable(),
//!     tokio::runtime::Handle::current(),
//! );
//!
//! plinth.apply_command(PlinthCommand::Enable);
//! assert_eq!(plinth.state(), PlinthState::Active);
//! assert_eq!(plinth.led().brightness(), 100);
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;

use crate::config::Config;
use crate::led::LedController;
use crate::messages::{clamp_brightness, PlinthCommand};
use crate::stepper::{MotorState, StepperMotor};
use crate::traits::{Connector, EventSink, Gpio};

use super::messenger::Messenger;

// ============================================================================
// Plinth State
// ============================================================================

/// Coarse operating mode of the plinth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PlinthState {
    /// Started, no command received yet
    #[default]
    Idle,
    /// Enabled by the management node
    Active,
    /// Disabled by the management node
    Disabled,
    /// Entered through a long button hold
    Maintenance,
}

impl PlinthState {
    /// Lowercase name, as reported in status snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlinthState::Idle => "idle",
            PlinthState::Active => "active",
            PlinthState::Disabled => "disabled",
            PlinthState::Maintenance => "maintenance",
        }
    }
}

impl core::fmt::Display for PlinthState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the whole plinth.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PlinthStatus {
    /// Plinth id
    pub id: u16,
    /// Operating mode
    pub state: PlinthState,
    /// Lid motor state
    pub motor_state: MotorState,
    /// Lid position in steps
    pub position: u32,
    /// Lid target in steps
    pub target: u32,
    /// Last LED brightness written
    pub led_brightness: u8,
    /// Whether a pulse animation owns the LED
    pub pulsing: bool,
    /// Whether the outbound link is up
    pub connected: bool,
    /// Consecutive failed reconnects
    pub reconnect_attempts: u32,
    /// Debounced button
    pub button: bool,
    /// Debounced maintenance switch
    pub maintenance: bool,
    /// Whether GPIO is simulated
    pub simulated: bool,
}

// ============================================================================
// Command Handler Trait
// ============================================================================

/// Receiver of parsed inbound commands.
///
/// The command server only knows this trait, so it can be exercised with
/// a recording handler in tests.
pub trait CommandHandler: Send + Sync {
    /// Plinth id that commands must be addressed to.
    fn plinth_id(&self) -> u16;

    /// Carry out one command. Failures are logged, never returned.
    fn apply_command(&self, cmd: PlinthCommand);
}

impl<H: CommandHandler + ?Sized> CommandHandler for Arc<H> {
    fn plinth_id(&self) -> u16 {
        (**self).plinth_id()
    }

    fn apply_command(&self, cmd: PlinthCommand) {
        (**self).apply_command(cmd)
    }
}

// ============================================================================
// Shared Plinth
// ============================================================================

/// Components shared between the loops, the server and the pulse task.
pub struct SharedPlinth<G: Gpio, C: Connector> {
    id: u16,
    gpio: Arc<G>,
    motor: StepperMotor<G>,
    led: LedController<G>,
    messenger: Messenger<C>,
    state: Mutex<PlinthState>,
    button: AtomicBool,
    maintenance: AtomicBool,
}

impl<G: Gpio + 'static, C: Connector> SharedPlinth<G, C> {
    /// Build every shared component from `config`.
    ///
    /// Connects the messenger once; a failure is logged and left to the
    /// watchdog.
    pub fn new(config: &Config, gpio: Arc<G>, connector: C, runtime: Handle) -> Self {
        let id = config.device.id;
        Self {
            id,
            motor: StepperMotor::new(Arc::clone(&gpio), config.pins, &config.motor),
            led: LedController::new(Arc::clone(&gpio), config.pins.led, &config.led, runtime),
            messenger: Messenger::new(id, connector, config.reconnect.max_attempts),
            gpio,
            state: Mutex::new(PlinthState::Idle),
            button: AtomicBool::new(false),
            maintenance: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PlinthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plinth id.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// GPIO backend.
    pub fn gpio(&self) -> &Arc<G> {
        &self.gpio
    }

    /// Lid motor.
    pub fn motor(&self) -> &StepperMotor<G> {
        &self.motor
    }

    /// Indicator LED.
    pub fn led(&self) -> &LedController<G> {
        &self.led
    }

    /// Outbound messenger.
    pub fn messenger(&self) -> &Messenger<C> {
        &self.messenger
    }

    /// Current operating mode.
    pub fn state(&self) -> PlinthState {
        *self.lock_state()
    }

    /// Change the operating mode.
    pub fn set_state(&self, state: PlinthState) {
        let mut current = self.lock_state();
        if *current != state {
            log::info!("Plinth {} state {} -> {}", self.id, *current, state);
            *current = state;
        }
    }

    /// Record the debounced input levels for status reporting.
    pub fn record_inputs(&self, button: bool, maintenance: bool) {
        self.button.store(button, Ordering::Relaxed);
        self.maintenance.store(maintenance, Ordering::Relaxed);
    }

    /// Snapshot of every component.
    pub fn status(&self) -> PlinthStatus {
        let motor = self.motor.snapshot();
        PlinthStatus {
            id: self.id,
            state: self.state(),
            motor_state: motor.state,
            position: motor.position,
            target: motor.target,
            led_brightness: self.led.brightness(),
            pulsing: self.led.is_pulsing(),
            connected: self.messenger.is_connected(),
            reconnect_attempts: self.messenger.reconnect_attempts(),
            button: self.button.load(Ordering::Relaxed),
            maintenance: self.maintenance.load(Ordering::Relaxed),
            simulated: self.gpio.is_simulated(),
        }
    }
}

impl<G: Gpio + 'static, C: Connector> CommandHandler for SharedPlinth<G, C> {
    fn plinth_id(&self) -> u16 {
        self.id
    }

    fn apply_command(&self, cmd: PlinthCommand) {
        log::info!("Received command {:?}", cmd);
        let result = match cmd {
            PlinthCommand::MotorOpen => {
                self.motor.open();
                Ok(())
            }
            PlinthCommand::MotorClose => {
                self.motor.close();
                Ok(())
            }
            PlinthCommand::SetLed(raw) => {
                let brightness = clamp_brightness(raw);
                if i64::from(brightness) != raw {
                    log::debug!("LED brightness {} clamped to {}", raw, brightness);
                }
                self.led.set_brightness(brightness)
            }
            PlinthCommand::LedPulse => {
                self.led.start_default_pulse();
                Ok(())
            }
            PlinthCommand::LedOff => self.led.off(),
            PlinthCommand::Enable => {
                self.set_state(PlinthState::Active);
                self.led.indicate()
            }
            PlinthCommand::Disable => {
                self.set_state(PlinthState::Disabled);
                let result = self.led.off();
                self.motor.stop();
                result
            }
        };
        if let Err(e) = result {
            log::error!("Error handling {:?}: {}", cmd, e);
        }
    }
}

impl<G: Gpio + 'static, C: Connector> EventSink for SharedPlinth<G, C> {
    fn button_pressed(&self) {
        self.messenger.send_button_press();
    }

    fn button_released(&self) {
        self.messenger.send_button_release();
    }

    fn maintenance_changed(&self, active: bool) {
        self.messenger.send_maintenance_state(active);
    }
}
