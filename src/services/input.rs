//! Button and maintenance switch handling.
//!
//! [`InputMonitor::poll`] is called by the input loop every tick. It turns
//! debounced edges into events, tracks how long the button has been held
//! and enters maintenance mode once per continuous hold.
//!
//! # Maintenance Hold
//!
//! Holding the button past the threshold sets [`PlinthState::Maintenance`]
//! and toggles the lid: `open()` if it is closed, `close()` otherwise. The
//! trigger is latched until release so a long hold toggles exactly once.

use std::sync::Arc;

use crate::config::InputConfig;
use crate::debounce::Debouncer;
use crate::error::HalError;
use crate::stepper::MotorState;
use crate::traits::{Connector, EventSink, Gpio};

use super::shared::{PlinthState, SharedPlinth};

/// Handler for the physical inputs of one plinth.
pub struct InputMonitor<G: Gpio, C: Connector, E: EventSink> {
    plinth: Arc<SharedPlinth<G, C>>,
    events: E,
    button: Debouncer<G>,
    maintenance: Debouncer<G>,
    hold_ms: u64,
    button_pressed: bool,
    pressed_at_ms: Option<u64>,
    hold_latched: bool,
    maintenance_active: bool,
}

impl<G: Gpio + 'static, C: Connector, E: EventSink> InputMonitor<G, C, E> {
    /// Monitor the button and maintenance lines of `plinth`, reporting to `events`.
    pub fn new(
        plinth: Arc<SharedPlinth<G, C>>,
        events: E,
        button_line: u8,
        maintenance_line: u8,
        config: &InputConfig,
    ) -> Self {
        let gpio = Arc::clone(plinth.gpio());
        Self {
            button: Debouncer::new(Arc::clone(&gpio), button_line, config.debounce_ms),
            maintenance: Debouncer::new(gpio, maintenance_line, config.debounce_ms),
            plinth,
            events,
            hold_ms: config.maintenance_hold_ms,
            button_pressed: false,
            pressed_at_ms: None,
            hold_latched: false,
            maintenance_active: false,
        }
    }

    /// Whether the debounced button is down.
    pub fn button_pressed(&self) -> bool {
        self.button_pressed
    }

    /// Whether the debounced maintenance switch is on.
    pub fn maintenance_active(&self) -> bool {
        self.maintenance_active
    }

    /// How long the button has been held, if it is down.
    pub fn held_ms(&self, now_ms: u64) -> Option<u64> {
        self.pressed_at_ms.map(|t| now_ms.saturating_sub(t))
    }

    /// Sample both inputs and react to changes.
    ///
    /// # Errors
    ///
    /// Returns the first failed read; state is left as it was before it.
    pub fn poll(&mut self, now_ms: u64) -> Result<(), HalError> {
        let button = self.button.sample(now_ms)?;
        if button && !self.button_pressed {
            self.button_pressed = true;
            self.pressed_at_ms = Some(now_ms);
            self.hold_latched = false;
            log::info!("Button pressed");
            self.events.button_pressed();
        } else if !button && self.button_pressed {
            let held = self.held_ms(now_ms).unwrap_or(0);
            self.button_pressed = false;
            self.pressed_at_ms = None;
            self.hold_latched = false;
            log::info!("Button released (held {:.2}s)", held as f64 / 1000.0);
            self.events.button_released();
        }

        if self.button_pressed && !self.hold_latched {
            let held = self.held_ms(now_ms).unwrap_or(0);
            if held > self.hold_ms {
                self.hold_latched = true;
                self.enter_maintenance(held);
            }
        }

        let maintenance = self.maintenance.sample(now_ms)?;
        if maintenance != self.maintenance_active {
            self.maintenance_active = maintenance;
            log::info!("Maintenance switch: {}", maintenance);
            self.events.maintenance_changed(maintenance);
        }

        self.plinth
            .record_inputs(self.button_pressed, self.maintenance_active);
        Ok(())
    }

    fn enter_maintenance(&self, held_ms: u64) {
        log::warn!(
            "Maintenance mode activated (button held {:.2}s)",
            held_ms as f64 / 1000.0
        );
        self.plinth.set_state(PlinthState::Maintenance);
        let motor = self.plinth.motor();
        if motor.state() == MotorState::Closed {
            motor.open();
        } else {
            motor.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MotorConfig};
    use crate::hal::{MockClock, MockConnector, RecordingEvents, SimulatedGpio};
    use crate::messages::PlinthEvent;
    use crate::traits::Clock;
    use tokio::runtime::Handle;

    type Monitor = InputMonitor<SimulatedGpio, MockConnector, Arc<RecordingEvents>>;

    struct Rig {
        gpio: Arc<SimulatedGpio>,
        plinth: Arc<SharedPlinth<SimulatedGpio, MockConnector>>,
        events: Arc<RecordingEvents>,
        monitor: Monitor,
        clock: MockClock,
    }

    impl Rig {
        fn new() -> Self {
            let config =
                Config::default().with_motor(MotorConfig::default().with_step_pulse_us(0));
            let gpio = Arc::new(SimulatedGpio::new());
            let plinth = Arc::new(SharedPlinth::new(
                &config,
                Arc::clone(&gpio),
                MockConnector::reachable(),
                Handle::current(),
            ));
            let events = Arc::new(RecordingEvents::new());
            let monitor = InputMonitor::new(
                Arc::clone(&plinth),
                Arc::clone(&events),
                config.pins.button,
                config.pins.maintenance,
                &config.input,
            );
            Self {
                gpio,
                plinth,
                events,
                monitor,
                clock: MockClock::new(),
            }
        }

        /// Poll every 10 ms for `ms` milliseconds.
        fn run_for(&mut self, ms: u64) {
            for _ in 0..ms / 10 {
                self.monitor.poll(self.clock.now_ms()).unwrap();
                self.clock.advance(10);
            }
        }
    }

    #[tokio::test]
    async fn press_and_release_events() {
        let mut rig = Rig::new();
        rig.gpio.set_input(17, true);
        rig.run_for(200);
        assert!(rig.monitor.button_pressed());
        rig.gpio.set_input(17, false);
        rig.run_for(200);
        assert!(!rig.monitor.button_pressed());
        assert_eq!(
            rig.events.events(),
            vec![PlinthEvent::ButtonPress, PlinthEvent::ButtonRelease]
        );
    }

    #[tokio::test]
    async fn maintenance_switch_changes_reported() {
        let mut rig = Rig::new();
        rig.gpio.set_input(27, true);
        rig.run_for(200);
        rig.gpio.set_input(27, false);
        rig.run_for(200);
        assert_eq!(
            rig.events.events(),
            vec![PlinthEvent::Maintenance(true), PlinthEvent::Maintenance(false)]
        );
        assert!(!rig.plinth.status().maintenance);
    }

    #[tokio::test]
    async fn long_hold_toggles_once() {
        let mut rig = Rig::new();
        rig.gpio.set_input(17, true);
        rig.run_for(6000);
        assert_eq!(rig.plinth.state(), PlinthState::Maintenance);
        // Motor was Idle, so the hold asks it to close
        assert_eq!(rig.plinth.motor().state(), MotorState::Closing);
        assert_eq!(rig.events.events(), vec![PlinthEvent::ButtonPress]);
    }

    #[tokio::test]
    async fn latch_resets_on_release() {
        let mut rig = Rig::new();
        // Close fully so the next holds open then close
        rig.plinth.motor().close();
        rig.plinth.motor().execute_step().unwrap();
        assert_eq!(rig.plinth.motor().state(), MotorState::Closed);

        rig.gpio.set_input(17, true);
        rig.run_for(4500);
        assert_eq!(rig.plinth.motor().state(), MotorState::Opening);
        rig.gpio.set_input(17, false);
        rig.run_for(100);

        rig.plinth.motor().stop();
        rig.gpio.set_input(17, true);
        rig.run_for(4500);
        assert_eq!(rig.plinth.motor().state(), MotorState::Closing);
    }

    #[tokio::test]
    async fn latch_survives_lid_reaching_open() {
        let mut rig = Rig::new();
        rig.plinth.motor().close();
        rig.plinth.motor().execute_step().unwrap();

        rig.gpio.set_input(17, true);
        for _ in 0..800 {
            rig.monitor.poll(rig.clock.now_ms()).unwrap();
            for _ in 0..5 {
                rig.plinth.motor().execute_step().unwrap();
            }
            rig.clock.advance(10);
        }
        assert!(rig.monitor.button_pressed());
        assert_eq!(rig.plinth.motor().state(), MotorState::Open);
    }

    #[tokio::test]
    async fn short_hold_does_nothing() {
        let mut rig = Rig::new();
        rig.gpio.set_input(17, true);
        rig.run_for(3000);
        assert_eq!(rig.plinth.state(), PlinthState::Idle);
        assert_eq!(rig.plinth.motor().state(), MotorState::Idle);
    }

    #[tokio::test]
    async fn read_failure_is_returned() {
        let mut rig = Rig::new();
        rig.gpio.shutdown();
        assert!(rig.monitor.poll(0).is_err());
    }
}
