//! # plinth-controller
//!
//! Per-unit controller for an interactive exhibit plinth: a button, a
//! maintenance switch, an indicator LED and a stepper-driven lid, talking to
//! a management node over OSC/UDP.
//!
//! ## Features
//!
//! - **Hardware abstraction**: GPIO trait with Raspberry Pi and simulated backends
//! - **Debounced inputs**: 3-sample agreement window per input line
//! - **Stepper state machine**: open/close/stop with end-stop detection
//! - **LED animation**: direct brightness or a triangular pulse, never both
//! - **Resilient networking**: best-effort event sends, watchdog reconnect
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and network abstractions
//! - `hal` - Simulated GPIO, test doubles, Raspberry Pi backend
//! - `debounce` - Input debouncing
//! - `stepper` - Lid motor state machine
//! - `led` - LED output and pulse animation
//! - `osc` / `messages` - Wire codec and plinth addresses
//! - `services` - Messenger, command server, input handling
//! - `plinth` - Orchestrator that runs the loops
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use plinth_controller::{
//!     config::{Config, MotorConfig},
//!     hal::SimulatedGpio,
//!     stepper::{MotorState, StepperMotor},
//! };
//!
//! let gpio = Arc::new(SimulatedGpio::new());
//! let config = Config::default().with_motor(MotorConfig::default().with_step_pulse_us(0));
//! let motor = StepperMotor::new(Arc::clone(&gpio), config.pins, &config.motor);
//!
//! assert!(motor.open());
//! for _ in 0..config.motor.steps_full {
//!     motor.execute_step().unwrap();
//! }
//! assert_eq!(motor.state(), MotorState::Open);
//! assert_eq!(gpio.rising_edges(config.pins.step), 1000);
//! ```

#![warn(missing_docs)]

/// Configuration built once at startup.
pub mod config;
/// Error types.
pub mod error;
/// Hardware abstraction layer implementations.
pub mod hal;
/// Core traits for hardware and network abstraction.
pub mod traits;

/// Debounced input lines.
pub mod debounce;
/// Indicator LED and pulse animation.
pub mod led;
/// Lid stepper motor state machine.
pub mod stepper;

/// Plinth command and event addresses.
pub mod messages;
/// OSC 1.0 wire codec.
pub mod osc;

/// Orchestrator that owns the components and runs the loops.
pub mod plinth;
/// Messenger, command server and input handling.
pub mod services;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, HalError, OscError};
pub use messages::{PlinthCommand, PlinthEvent};
pub use plinth::{DefaultController, PlinthController};
pub use services::{PlinthState, PlinthStatus};
pub use stepper::MotorState;
