//! Outbound messenger: plinth events to the management node.
//!
//! Sends never fail from the caller's point of view. Send errors are logged
//! and the link is kept: the socket is unconnected, so a management node
//! that restarts receives the next event. Only a link that never came up
//! (bind or name resolution failed) is retried, by the watchdog through
//! [`Messenger::reconnect`]. There is no per-send retry.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::Config;
use crate::messages::PlinthEvent;
use crate::traits::{Connector, EventSink, Link};

// ============================================================================
// UDP Transport
// ============================================================================

/// Opens a UDP socket addressed to the management node.
#[derive(Clone, Debug)]
pub struct UdpConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl UdpConnector {
    /// Target `host:port` with the given write timeout.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Target this plinth's port on the configured management node.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.network.mgmt_host.as_str(),
            config.mgmt_port(),
            config.network.socket_timeout(),
        )
    }
}

impl Connector for UdpConnector {
    type Link = UdpLink;

    fn connect(&self) -> io::Result<UdpLink> {
        let target = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address for {}", self.host),
                )
            })?;
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(self.timeout))?;
        Ok(UdpLink { socket, target })
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// An unconnected UDP socket plus the resolved management node address.
///
/// Unconnected sends do not pick up ICMP port-unreachable errors, so the
/// management node being down never poisons later sends.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpLink {
    /// Resolved destination of every datagram.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Link for UdpLink {
    fn send(&self, packet: &[u8]) -> io::Result<()> {
        self.socket.send_to(packet, self.target).map(|_| ())
    }
}

// ============================================================================
// Messenger
// ============================================================================

struct LinkState<L> {
    link: Option<L>,
    reconnect_count: u32,
}

/// Event sender with connection-level reconnect.
///
/// # Example
///
/// ```rust
/// use plinth_controller::hal::MockConnector;
/// use plinth_controller::services::Messenger;
///
/// let connector = MockConnector::reachable();
/// let messenger = Messenger::new(1, connector.clone(), 10);
/// assert!(messenger.is_connected());
///
/// messenger.send_button_press();
/// let sent = connector.sent_messages();
/// assert_eq!(sent[0].addr, "/plinth/1/button/press");
/// ```
pub struct Messenger<C: Connector> {
    id: u16,
    connector: C,
    max_attempts: u32,
    state: Mutex<LinkState<C::Link>>,
}

impl<C: Connector> Messenger<C> {
    /// Create a messenger for plinth `id` and try to connect once.
    ///
    /// A failed initial connection is logged; the watchdog retries later.
    pub fn new(id: u16, connector: C, max_attempts: u32) -> Self {
        let link = match connector.connect() {
            Ok(link) => {
                log::info!("Connected to management node at {}", connector.describe());
                Some(link)
            }
            Err(e) => {
                log::error!(
                    "Failed to connect to management node at {}: {}",
                    connector.describe(),
                    e
                );
                None
            }
        };
        Self {
            id,
            connector,
            max_attempts,
            state: Mutex::new(LinkState {
                link,
                reconnect_count: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LinkState<C::Link>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a link is currently held.
    pub fn is_connected(&self) -> bool {
        self.state().link.is_some()
    }

    /// Consecutive failed reconnects since the last success or reset.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state().reconnect_count
    }

    /// Report a button press.
    pub fn send_button_press(&self) {
        self.send(PlinthEvent::ButtonPress);
    }

    /// Report a button release.
    pub fn send_button_release(&self) {
        self.send(PlinthEvent::ButtonRelease);
    }

    /// Report the maintenance switch state.
    pub fn send_maintenance_state(&self, active: bool) {
        self.send(PlinthEvent::Maintenance(active));
    }

    /// Send one event. Failures are logged and swallowed; the link is kept.
    pub fn send(&self, event: PlinthEvent) {
        let msg = event.to_osc(self.id);
        let packet = match msg.encode() {
            Ok(packet) => packet,
            Err(e) => {
                log::error!("Failed to encode {}: {}", msg.addr, e);
                return;
            }
        };
        let state = self.state();
        let Some(link) = state.link.as_ref() else {
            log::debug!("Not connected, dropping {}", msg.addr);
            return;
        };

        match link.send(&packet) {
            Ok(()) => log::debug!("Sent {} {}", msg.addr, event.value()),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                log::warn!("Timed out sending {}: {}", msg.addr, e);
            }
            Err(e) => log::error!("Error sending {}: {}", msg.addr, e),
        }
    }

    /// Try to re-establish the link.
    ///
    /// The attempt counter wraps to 0 after exceeding the ceiling; retries
    /// never stop. Returns whether the link is up afterwards.
    ///
    /// The lock is not held while connecting, so sends and status reads
    /// are never stuck behind a slow name lookup.
    pub fn reconnect(&self) -> bool {
        let attempt = {
            let mut state = self.state();
            state.reconnect_count += 1;
            if state.reconnect_count > self.max_attempts {
                log::warn!(
                    "Max reconnect attempts ({}) reached for {}, continuing to retry",
                    self.max_attempts,
                    self.connector.describe()
                );
                state.reconnect_count = 0;
            }
            state.reconnect_count
        };

        log::info!(
            "Attempting to reconnect to {} (attempt {})",
            self.connector.describe(),
            attempt
        );
        match self.connector.connect() {
            Ok(link) => {
                let mut state = self.state();
                state.link = Some(link);
                state.reconnect_count = 0;
                log::info!("Reconnected to management node at {}", self.connector.describe());
                true
            }
            Err(e) => {
                log::error!("Reconnect to {} failed: {}", self.connector.describe(), e);
                false
            }
        }
    }
}

impl<C: Connector> EventSink for Messenger<C> {
    fn button_pressed(&self) {
        self.send_button_press();
    }

    fn button_released(&self) {
        self.send_button_release();
    }

    fn maintenance_changed(&self, active: bool) {
        self.send_maintenance_state(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockConnector;
    use crate::osc::OscArg;

    #[test]
    fn sends_are_noops_without_link() {
        let connector = MockConnector::unreachable();
        let messenger = Messenger::new(1, connector.clone(), 10);
        assert!(!messenger.is_connected());
        messenger.send_button_press();
        messenger.send_maintenance_state(true);
        assert!(connector.sent().is_empty());
    }

    #[test]
    fn event_payloads_on_the_wire() {
        let connector = MockConnector::reachable();
        let messenger = Messenger::new(3, connector.clone(), 10);
        messenger.send_button_press();
        messenger.send_button_release();
        messenger.send_maintenance_state(true);

        let sent = connector.sent_messages();
        let summary: Vec<_> = sent.iter().map(|m| (m.addr.as_str(), m.args.clone())).collect();
        assert_eq!(
            summary,
            vec![
                ("/plinth/3/button/press", vec![OscArg::Int(1)]),
                ("/plinth/3/button/release", vec![OscArg::Int(0)]),
                ("/plinth/3/maintenance", vec![OscArg::Int(1)]),
            ]
        );
    }

    #[test]
    fn counter_wraps_after_ceiling() {
        let connector = MockConnector::unreachable();
        let messenger = Messenger::new(1, connector.clone(), 10);
        for expected in 1..=10 {
            assert!(!messenger.reconnect());
            assert_eq!(messenger.reconnect_attempts(), expected);
        }
        assert!(!messenger.reconnect());
        assert_eq!(messenger.reconnect_attempts(), 0);

        // Retries keep going after the wrap
        assert!(!messenger.reconnect());
        assert_eq!(messenger.reconnect_attempts(), 1);
        assert_eq!(connector.connect_attempts(), 13);
    }

    #[test]
    fn successful_reconnect_resets_counter() {
        let connector = MockConnector::unreachable();
        let messenger = Messenger::new(1, connector.clone(), 10);
        messenger.reconnect();
        messenger.reconnect();
        connector.set_reachable(true);
        assert!(messenger.reconnect());
        assert!(messenger.is_connected());
        assert_eq!(messenger.reconnect_attempts(), 0);
    }

    #[test]
    fn send_error_keeps_link() {
        let connector = MockConnector::reachable();
        let messenger = Messenger::new(1, connector.clone(), 10);
        connector.fail_sends(Some(io::ErrorKind::ConnectionRefused));
        messenger.send_button_press();
        assert!(messenger.is_connected());

        connector.fail_sends(None);
        messenger.send_button_release();
        let sent = connector.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].addr, "/plinth/1/button/release");
        assert_eq!(connector.connect_attempts(), 1);
    }

    #[test]
    fn timeout_keeps_link() {
        let connector = MockConnector::reachable();
        let messenger = Messenger::new(1, connector.clone(), 10);
        connector.fail_sends(Some(io::ErrorKind::TimedOut));
        messenger.send_button_release();
        assert!(messenger.is_connected());
    }

    #[test]
    fn udp_link_delivers_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let connector = UdpConnector::new("127.0.0.1", port, Duration::from_millis(500));
        let messenger = Messenger::new(1, connector, 10);
        messenger.send_maintenance_state(false);

        let mut buf = [0u8; 512];
        let n = receiver.recv(&mut buf).unwrap();
        let msgs = crate::osc::decode_packet(&buf[..n]).unwrap();
        assert_eq!(msgs[0].addr, "/plinth/1/maintenance");
        assert_eq!(msgs[0].args, vec![OscArg::Int(0)]);
    }

    #[test]
    fn management_node_restart_loses_no_later_events() {
        // Reserve a port, then close it so nothing is listening
        let port = {
            let closed = UdpSocket::bind("127.0.0.1:0").unwrap();
            closed.local_addr().unwrap().port()
        };
        let connector = UdpConnector::new("127.0.0.1", port, Duration::from_millis(500));
        let messenger = Messenger::new(1, connector, 10);

        messenger.send_button_press();
        std::thread::sleep(Duration::from_millis(20));
        messenger.send_button_release();
        std::thread::sleep(Duration::from_millis(20));
        assert!(messenger.is_connected());

        let node = UdpSocket::bind(("127.0.0.1", port)).unwrap();
        node.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        messenger.send_button_press();

        let mut buf = [0u8; 512];
        let n = node.recv(&mut buf).unwrap();
        let msgs = crate::osc::decode_packet(&buf[..n]).unwrap();
        assert_eq!(msgs[0].addr, "/plinth/1/button/press");
    }

    /// Connector whose `connect` blocks until released.
    struct GatedConnector {
        inner: MockConnector,
        gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl Connector for GatedConnector {
        type Link = crate::hal::MockLink;

        fn connect(&self) -> io::Result<Self::Link> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.inner.connect()
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    #[test]
    fn slow_reconnect_does_not_block_sends() {
        let inner = MockConnector::unreachable();
        let messenger = std::sync::Arc::new(Messenger::new(
            1,
            GatedConnector {
                inner: inner.clone(),
                gate: Mutex::new(None),
            },
            10,
        ));
        let (release, gate) = std::sync::mpsc::channel();
        *messenger.connector.gate.lock().unwrap() = Some(gate);
        inner.set_reachable(true);

        let reconnecting = {
            let messenger = std::sync::Arc::clone(&messenger);
            std::thread::spawn(move || messenger.reconnect())
        };
        // Wait until the reconnect is parked inside connect
        while messenger.connector.gate.lock().unwrap().is_some() {
            std::thread::yield_now();
        }

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        {
            let messenger = std::sync::Arc::clone(&messenger);
            std::thread::spawn(move || {
                messenger.send_button_press();
                let _ = done_tx.send(messenger.reconnect_attempts());
            });
        }
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)), Ok(1));

        release.send(()).unwrap();
        assert!(reconnecting.join().unwrap());
        assert!(messenger.is_connected());
    }
}
