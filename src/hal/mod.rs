//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `sim`: In-memory GPIO, used for tests and as the hardware fallback
//! - `mock`: Test doubles for the clock, network and event sink
//! - `rpi`: Raspberry Pi GPIO via `rppal` (requires `rpi` feature)
//!
//! [`open_gpio`] picks the backend at startup. Real hardware that fails to
//! initialize is never fatal: the controller keeps running on the
//! simulation.

pub mod mock;
pub mod sim;

#[cfg(feature = "rpi")]
pub mod rpi;

pub use mock::*;
pub use sim::*;

#[cfg(feature = "rpi")]
pub use rpi::RpiGpio;

use crate::config::Config;
use crate::error::HalError;
use crate::traits::Gpio;

/// The GPIO backend selected at startup.
pub enum AnyGpio {
    /// In-memory lines.
    Simulated(SimulatedGpio),
    /// Raspberry Pi lines.
    #[cfg(feature = "rpi")]
    Rpi(RpiGpio),
}

impl AnyGpio {
    fn inner(&self) -> &dyn Gpio {
        match self {
            AnyGpio::Simulated(gpio) => gpio,
            #[cfg(feature = "rpi")]
            AnyGpio::Rpi(gpio) => gpio,
        }
    }

    /// The simulation, if that is the active backend.
    pub fn as_simulated(&self) -> Option<&SimulatedGpio> {
        match self {
            AnyGpio::Simulated(gpio) => Some(gpio),
            #[cfg(feature = "rpi")]
            AnyGpio::Rpi(_) => None,
        }
    }
}

impl Gpio for AnyGpio {
    fn read_input(&self, line: u8) -> Result<bool, HalError> {
        self.inner().read_input(line)
    }

    fn write_output(&self, line: u8, high: bool) -> Result<(), HalError> {
        self.inner().write_output(line, high)
    }

    fn set_pwm_duty(&self, line: u8, percent: f32) -> Result<(), HalError> {
        self.inner().set_pwm_duty(line, percent)
    }

    fn shutdown(&self) {
        self.inner().shutdown()
    }

    fn is_simulated(&self) -> bool {
        self.inner().is_simulated()
    }
}

/// Claim real hardware, or fall back to the simulation.
///
/// Without the `rpi` feature this always returns the simulation.
pub fn open_gpio(config: &Config) -> AnyGpio {
    #[cfg(feature = "rpi")]
    {
        match RpiGpio::new(&config.pins, config.led.pwm_frequency_hz) {
            Ok(gpio) => {
                log::info!("GPIO initialized");
                return AnyGpio::Rpi(gpio);
            }
            Err(e) => {
                log::warn!("GPIO unavailable ({}), running in simulation mode", e);
            }
        }
    }
    #[cfg(not(feature = "rpi"))]
    {
        let _ = config;
        log::warn!("Built without hardware support, running in simulation mode");
    }
    AnyGpio::Simulated(SimulatedGpio::new())
}
