//! Input debouncing.
//!
//! A [`Debouncer`] turns one noisy input line into a stable signal. Raw
//! readings are taken at most once per interval and pushed into a 3-slot
//! window; the stable value only follows when all three agree.
//!
//! ```text
//! raw:     0 0 1 0 0 1 1 1 1
//! window:  . . 001 010 100 001 011 111 111
//! stable:  0 0 0 0 0 0 0 1 1
//! ```

use std::sync::Arc;

use heapless::Deque;

use crate::error::HalError;
use crate::traits::Gpio;

/// Number of agreeing samples needed before the stable value changes.
pub const WINDOW: usize = 3;

/// Debounced view of one input line.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use plinth_controller::debounce::Debouncer;
/// use plinth_controller::hal::SimulatedGpio;
///
/// let gpio = Arc::new(SimulatedGpio::new());
/// let mut button = Debouncer::new(Arc::clone(&gpio), 17, 20);
///
/// gpio.set_input(17, true);
/// assert!(!button.sample(0).unwrap());
/// assert!(!button.sample(20).unwrap());
/// assert!(button.sample(40).unwrap());
/// ```
pub struct Debouncer<G> {
    gpio: Arc<G>,
    line: u8,
    interval_ms: u64,
    window: Deque<bool, WINDOW>,
    stable: bool,
    last_sample_ms: Option<u64>,
}

impl<G: Gpio> Debouncer<G> {
    /// Debounce `line`, reading it at most once per `interval_ms`.
    pub fn new(gpio: Arc<G>, line: u8, interval_ms: u64) -> Self {
        Self {
            gpio,
            line,
            interval_ms,
            window: Deque::new(),
            stable: false,
            last_sample_ms: None,
        }
    }

    /// Line this debouncer reads.
    pub fn line(&self) -> u8 {
        self.line
    }

    /// Last accepted value, without sampling.
    pub fn stable(&self) -> bool {
        self.stable
    }

    /// Sample the line if the interval has elapsed and return the stable value.
    ///
    /// Calls inside the interval return the previous stable value without
    /// touching hardware. A failed read leaves the window untouched.
    pub fn sample(&mut self, now_ms: u64) -> Result<bool, HalError> {
        if let Some(last) = self.last_sample_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                return Ok(self.stable);
            }
        }
        self.last_sample_ms = Some(now_ms);

        let raw = self.gpio.read_input(self.line)?;
        self.push(raw);
        Ok(self.stable)
    }

    fn push(&mut self, raw: bool) {
        if self.window.is_full() {
            self.window.pop_front();
        }
        // Cannot fail: one slot was just freed
        let _ = self.window.push_back(raw);

        if self.window.is_full() && self.window.iter().all(|&v| v == raw) {
            self.stable = raw;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedGpio;

    const LINE: u8 = 17;

    fn setup() -> (Arc<SimulatedGpio>, Debouncer<SimulatedGpio>) {
        let gpio = Arc::new(SimulatedGpio::new());
        let debouncer = Debouncer::new(Arc::clone(&gpio), LINE, 20);
        (gpio, debouncer)
    }

    /// Feed raw levels at 20 ms spacing, returning the stable value after each.
    fn feed(gpio: &SimulatedGpio, d: &mut Debouncer<SimulatedGpio>, start: u64, raw: &[bool]) -> Vec<bool> {
        raw.iter()
            .enumerate()
            .map(|(i, &level)| {
                gpio.set_input(LINE, level);
                d.sample(start + i as u64 * 20).unwrap()
            })
            .collect()
    }

    #[test]
    fn starts_released() {
        let (_, d) = setup();
        assert!(!d.stable());
    }

    #[test]
    fn needs_three_agreeing_samples() {
        let (gpio, mut d) = setup();
        let out = feed(&gpio, &mut d, 0, &[true, true, true]);
        assert_eq!(out, vec![false, false, true]);
    }

    #[test]
    fn single_glitch_is_rejected() {
        let (gpio, mut d) = setup();
        let out = feed(&gpio, &mut d, 0, &[false, false, false, true, false, false]);
        assert!(out.iter().all(|&v| !v));
    }

    #[test]
    fn glitch_while_pressed_is_rejected() {
        let (gpio, mut d) = setup();
        let out = feed(&gpio, &mut d, 0, &[true, true, true, false, true, true]);
        assert_eq!(out, vec![false, false, true, true, true, true]);
    }

    #[test]
    fn bounce_burst_settles() {
        let (gpio, mut d) = setup();
        let out = feed(&gpio, &mut d, 0, &[true, false, true, false, true, true, true]);
        assert_eq!(out, vec![false, false, false, false, false, false, true]);
    }

    #[test]
    fn samples_inside_interval_are_skipped() {
        let (gpio, mut d) = setup();
        gpio.set_input(LINE, true);
        d.sample(0).unwrap();
        // Inside the interval: no new reading, so the window holds one entry
        for t in [1, 5, 19] {
            assert!(!d.sample(t).unwrap());
        }
        d.sample(20).unwrap();
        assert!(d.sample(40).unwrap());
    }

    #[test]
    fn read_failure_propagates() {
        let (gpio, mut d) = setup();
        gpio.shutdown();
        assert!(matches!(d.sample(0), Err(HalError::Released(LINE))));
    }
}
