//! Raspberry Pi GPIO backend using `rppal`.
//!
//! Wiring (BCM numbering, defaults from [`PinConfig`]):
//! - GPIO17: button, pulled up, pressed = low
//! - GPIO27: maintenance switch, pulled up, active = low
//! - GPIO22: LED, software PWM
//! - GPIO23/24/25: stepper STEP/DIR/ENABLE
//!
//! Every line sits behind its own mutex, so the motor loop and the LED
//! animation never contend with each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rppal::gpio::{Gpio as RppalGpio, InputPin, OutputPin};

use crate::config::PinConfig;
use crate::error::HalError;
use crate::traits::Gpio;

enum Line {
    Input(InputPin),
    Output(OutputPin),
    Pwm(OutputPin),
}

/// GPIO lines claimed from the Raspberry Pi.
pub struct RpiGpio {
    lines: HashMap<u8, Mutex<Option<Line>>>,
    pwm_frequency_hz: f64,
    released: AtomicBool,
}

impl RpiGpio {
    /// Claim every configured line.
    ///
    /// # Errors
    ///
    /// Fails if the GPIO driver is missing, access is denied, or any line is
    /// already in use. Lines claimed before the failure are released again.
    pub fn new(pins: &PinConfig, pwm_frequency_hz: f64) -> Result<Self, HalError> {
        let gpio = RppalGpio::new().map_err(|e| HalError::Unavailable(e.to_string()))?;
        let claim = |line: u8| gpio.get(line).map_err(|e| HalError::driver(line, e));

        let mut lines = HashMap::new();
        for line in pins.inputs() {
            let pin = claim(line)?.into_input_pullup();
            lines.insert(line, Mutex::new(Some(Line::Input(pin))));
        }
        for line in pins.outputs() {
            let pin = claim(line)?.into_output_low();
            lines.insert(line, Mutex::new(Some(Line::Output(pin))));
        }

        let mut led = claim(pins.led)?.into_output_low();
        led.set_pwm_frequency(pwm_frequency_hz, 0.0)
            .map_err(|e| HalError::driver(pins.led, e))?;
        lines.insert(pins.led, Mutex::new(Some(Line::Pwm(led))));

        Ok(Self {
            lines,
            pwm_frequency_hz,
            released: AtomicBool::new(false),
        })
    }

    fn with_line<R>(
        &self,
        line: u8,
        f: impl FnOnce(&mut Line) -> Result<R, HalError>,
    ) -> Result<R, HalError> {
        let slot = self.lines.get(&line).ok_or(HalError::UnknownLine(line))?;
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(claimed) => f(claimed),
            None => Err(HalError::Released(line)),
        }
    }
}

impl Gpio for RpiGpio {
    fn read_input(&self, line: u8) -> Result<bool, HalError> {
        self.with_line(line, |claimed| match claimed {
            // Active-low: pressed pulls the line to ground
            Line::Input(pin) => Ok(pin.is_low()),
            _ => Err(HalError::driver(line, "not an input")),
        })
    }

    fn write_output(&self, line: u8, high: bool) -> Result<(), HalError> {
        self.with_line(line, |claimed| match claimed {
            Line::Output(pin) => {
                if high {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
                Ok(())
            }
            _ => Err(HalError::driver(line, "not a digital output")),
        })
    }

    fn set_pwm_duty(&self, line: u8, percent: f32) -> Result<(), HalError> {
        let duty = f64::from(percent.clamp(0.0, 100.0)) / 100.0;
        let frequency = self.pwm_frequency_hz;
        self.with_line(line, |claimed| match claimed {
            Line::Pwm(pin) => pin
                .set_pwm_frequency(frequency, duty)
                .map_err(|e| HalError::driver(line, e)),
            _ => Err(HalError::driver(line, "not a PWM output")),
        })
    }

    fn shutdown(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        for (line, slot) in &self.lines {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.take() {
                Some(Line::Pwm(mut pin)) => {
                    if let Err(e) = pin.clear_pwm() {
                        log::error!("Error stopping PWM on GPIO {}: {}", line, e);
                    }
                    pin.set_low();
                }
                Some(Line::Output(mut pin)) => pin.set_low(),
                Some(Line::Input(_)) | None => {}
            }
        }
        log::info!("GPIO cleaned up");
    }

    fn is_simulated(&self) -> bool {
        false
    }
}
