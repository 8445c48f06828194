//! Mock implementations for testing without hardware or a network.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockConnector`] | [`Connector`] | Reachability switch, captured datagrams |
//! | [`RecordingEvents`] | [`EventSink`] | Records input-loop events |
//!
//! GPIO has no separate mock: [`SimulatedGpio`](super::SimulatedGpio)
//! already exposes every hook a test needs.
//!
//! # Example
//!
//! ```rust
//! use plinth_controller::hal::MockConnector;
//! use plinth_controller::traits::{Connector, Link};
//!
//! let connector = MockConnector::unreachable();
//! assert!(connector.connect().is_err());
//!
//! connector.set_reachable(true);
//! let link = connector.connect().unwrap();
//! link.send(b"/x\0\0,\0\0\0").unwrap();
//! assert_eq!(connector.sent().len(), 1);
//! assert_eq!(connector.connect_attempts(), 2);
//! ```
//!
//! [`Clock`]: crate::traits::Clock
//! [`Connector`]: crate::traits::Connector
//! [`EventSink`]: crate::traits::EventSink

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::messages::PlinthEvent;
use crate::osc::{decode_packet, OscMessage};
use crate::traits::{Clock, Connector, EventSink, Link};

// ============================================================================
// Clock
// ============================================================================

/// Mock clock for testing time-dependent behavior.
///
/// # Example
///
/// ```rust
/// use plinth_controller::hal::MockClock;
/// use plinth_controller::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances time by the given milliseconds.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Default)]
struct MockNet {
    reachable: bool,
    fail_send: Option<io::ErrorKind>,
    connect_attempts: u32,
    sent: Vec<Vec<u8>>,
}

/// Mock connector with a reachability switch.
///
/// Clones share state, so a test can keep one handle while the
/// [`Messenger`](crate::services::Messenger) owns another.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    net: Arc<Mutex<MockNet>>,
}

impl MockConnector {
    /// A connector whose `connect` succeeds.
    pub fn reachable() -> Self {
        let connector = Self::default();
        connector.set_reachable(true);
        connector
    }

    /// A connector whose `connect` always fails.
    pub fn unreachable() -> Self {
        Self::default()
    }

    fn net(&self) -> MutexGuard<'_, MockNet> {
        lock(&self.net)
    }

    /// Switch reachability for future `connect` calls.
    pub fn set_reachable(&self, reachable: bool) {
        self.net().reachable = reachable;
    }

    /// Make every send fail with `kind`, or succeed again with `None`.
    pub fn fail_sends(&self, kind: Option<io::ErrorKind>) {
        self.net().fail_send = kind;
    }

    /// Number of `connect` calls so far.
    pub fn connect_attempts(&self) -> u32 {
        self.net().connect_attempts
    }

    /// Raw datagrams sent over any link from this connector.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.net().sent.clone()
    }

    /// Sent datagrams decoded as OSC messages. Undecodable ones are skipped.
    pub fn sent_messages(&self) -> Vec<OscMessage> {
        self.net()
            .sent
            .iter()
            .filter_map(|packet| decode_packet(packet).ok())
            .flatten()
            .collect()
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn connect(&self) -> io::Result<MockLink> {
        let mut net = self.net();
        net.connect_attempts += 1;
        if net.reachable {
            Ok(MockLink {
                net: Arc::clone(&self.net),
            })
        } else {
            Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock management node unreachable",
            ))
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Link produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockLink {
    net: Arc<Mutex<MockNet>>,
}

impl Link for MockLink {
    fn send(&self, packet: &[u8]) -> io::Result<()> {
        let mut net = lock(&self.net);
        if let Some(kind) = net.fail_send {
            return Err(io::Error::new(kind, "mock send failure"));
        }
        net.sent.push(packet.to_vec());
        Ok(())
    }
}

// ============================================================================
// Event Sink
// ============================================================================

/// Records every event reported by the input loop.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<PlinthEvent>>,
}

impl RecordingEvents {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events so far, in order.
    pub fn events(&self) -> Vec<PlinthEvent> {
        lock(&self.events).clone()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    fn push(&self, event: PlinthEvent) {
        lock(&self.events).push(event);
    }
}

impl EventSink for RecordingEvents {
    fn button_pressed(&self) {
        self.push(PlinthEvent::ButtonPress);
    }

    fn button_released(&self) {
        self.push(PlinthEvent::ButtonRelease);
    }

    fn maintenance_changed(&self, active: bool) {
        self.push(PlinthEvent::Maintenance(active));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advance() {
        let mut clock = MockClock::new();
        clock.advance(20);
        clock.advance(20);
        assert_eq!(clock.now_ms(), 40);
    }

    #[test]
    fn unreachable_connector_counts_attempts() {
        let connector = MockConnector::unreachable();
        for _ in 0..3 {
            assert!(connector.connect().is_err());
        }
        assert_eq!(connector.connect_attempts(), 3);
    }

    #[test]
    fn send_failure_is_not_recorded() {
        let connector = MockConnector::reachable();
        let link = connector.connect().unwrap();
        connector.fail_sends(Some(io::ErrorKind::TimedOut));
        assert_eq!(
            link.send(b"abc").unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        connector.fail_sends(None);
        link.send(b"abc").unwrap();
        assert_eq!(connector.sent(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn sent_messages_decodes_osc() {
        let connector = MockConnector::reachable();
        let link = connector.connect().unwrap();
        link.send(&PlinthEvent::ButtonPress.to_osc(1).encode().unwrap()).unwrap();
        link.send(b"junk").unwrap();
        let messages = connector.sent_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].addr, "/plinth/1/button/press");
    }

    #[test]
    fn recorder_keeps_order() {
        let events = RecordingEvents::new();
        events.button_pressed();
        events.maintenance_changed(true);
        events.button_released();
        assert_eq!(
            events.events(),
            vec![
                PlinthEvent::ButtonPress,
                PlinthEvent::Maintenance(true),
                PlinthEvent::ButtonRelease
            ]
        );
    }
}
