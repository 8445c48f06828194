//! End-to-end tests: a running controller driven over real UDP sockets
//!
//! The test plays the management node: it owns the socket the plinth sends
//! events to, and sends commands to the plinth's command port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use plinth_controller::{
    config::{Config, MotorConfig, NetworkConfig, ReconnectConfig},
    hal::SimulatedGpio,
    led::PulseParams,
    osc::{decode_packet, OscArg, OscMessage},
    services::UdpConnector,
    traits::brightness_to_duty,
    MotorState, PlinthController, PlinthState,
};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;

const LED: u8 = 22;
const BUTTON: u8 = 17;
const MAINTENANCE: u8 = 27;

struct Harness {
    gpio: Arc<SimulatedGpio>,
    controller: PlinthController<SimulatedGpio, UdpConnector>,
    mgmt: UdpSocket,
    plinth_addr: SocketAddr,
}

impl Harness {
    async fn start() -> Self {
        let mgmt = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mgmt_port = mgmt.local_addr().unwrap().port();

        let config = Config::default()
            .with_network(
                NetworkConfig::default()
                    .with_mgmt_host("127.0.0.1")
                    .with_mgmt_base_port(mgmt_port)
                    .with_listen_base_port(0),
            )
            .with_motor(
                MotorConfig::default()
                    .with_steps_full(100)
                    .with_step_interval_us(200)
                    .with_step_pulse_us(0),
            )
            .with_reconnect(ReconnectConfig::default().with_watchdog_interval_ms(50));

        let gpio = Arc::new(SimulatedGpio::new());
        let connector = UdpConnector::from_config(&config);
        let mut controller =
            PlinthController::new(config, Arc::clone(&gpio), connector, Handle::current());
        controller.start().await.unwrap();

        let port = controller.server_addr().unwrap().port();
        Self {
            gpio,
            controller,
            mgmt,
            plinth_addr: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }

    async fn send(&self, msg: OscMessage) {
        self.mgmt
            .send_to(&msg.encode().unwrap(), self.plinth_addr)
            .await
            .unwrap();
    }

    async fn recv(&self) -> OscMessage {
        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), self.mgmt.recv_from(&mut buf))
            .await
            .expect("no event from plinth")
            .unwrap();
        decode_packet(&buf[..len]).unwrap().remove(0)
    }

    fn duty(&self) -> f32 {
        self.gpio.duty(LED).unwrap_or(0.0)
    }
}

/// Poll `check` every 5 ms for up to 2 s.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

// ============================================================================
// LED
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn led_brightness_then_pulse() {
    let mut h = Harness::start().await;

    h.send(OscMessage::new("/plinth/1/led").with_arg(OscArg::Int(150))).await;
    assert!(eventually(|| (h.duty() - 58.82).abs() < 0.01).await);
    assert!(!h.controller.plinth().led().is_pulsing());

    h.send(OscMessage::new("/plinth/1/led/pulse")).await;
    assert!(eventually(|| h.controller.plinth().led().is_pulsing()).await);
    assert_eq!(
        h.controller.plinth().led().pulse_params(),
        Some(PulseParams {
            frequency_hz: 2.0,
            min: 50,
            max: 255,
            step_ms: 20,
        })
    );

    // The ramp moves the duty away from the direct value
    assert!(eventually(|| (h.duty() - brightness_to_duty(150)).abs() > 0.5).await);
    let low = brightness_to_duty(50) - 0.01;
    assert!(eventually(|| h.duty() >= low).await);

    h.send(OscMessage::new("/plinth/1/led").with_arg(OscArg::Int(150))).await;
    assert!(eventually(|| !h.controller.plinth().led().is_pulsing()).await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!((h.duty() - 58.82).abs() < 0.01);

    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn led_off_and_out_of_range_payloads() {
    let mut h = Harness::start().await;

    h.send(OscMessage::new("/plinth/1/led").with_arg(OscArg::Float(300.0))).await;
    assert!(eventually(|| h.duty() == 100.0).await);

    h.send(OscMessage::new("/plinth/1/led/pulse")).await;
    assert!(eventually(|| h.controller.plinth().led().is_pulsing()).await);
    h.send(OscMessage::new("/plinth/1/led/off")).await;
    assert!(eventually(|| !h.controller.plinth().led().is_pulsing()).await);
    assert_eq!(h.duty(), 0.0);

    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_for_other_plinths_are_ignored() {
    let mut h = Harness::start().await;

    h.send(OscMessage::new("/plinth/2/led").with_arg(OscArg::Int(200))).await;
    h.send(OscMessage::new("/plinth/1/led").with_arg(OscArg::Int(10))).await;
    assert!(eventually(|| h.controller.plinth().led().brightness() == 10).await);
    assert_eq!(h.controller.plinth().led().brightness(), 10);

    h.controller.shutdown().await;
}

// ============================================================================
// Motor and State
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn motor_open_and_close_over_osc() {
    let mut h = Harness::start().await;

    h.send(OscMessage::new("/plinth/1/motor/open")).await;
    assert!(eventually(|| h.controller.status().motor_state == MotorState::Open).await);
    assert_eq!(h.controller.status().position, 100);

    h.send(OscMessage::new("/plinth/1/motor/close")).await;
    assert!(eventually(|| h.controller.status().motor_state == MotorState::Closed).await);
    assert_eq!(h.controller.status().position, 0);

    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enable_and_disable() {
    let mut h = Harness::start().await;

    h.send(OscMessage::new("/plinth/1/enable")).await;
    assert!(eventually(|| h.controller.status().state == PlinthState::Active).await);
    assert!((h.duty() - brightness_to_duty(100)).abs() < 0.01);

    h.send(OscMessage::new("/plinth/1/motor/open")).await;
    assert!(eventually(|| h.controller.status().position > 0).await);
    h.send(OscMessage::new("/plinth/1/disable")).await;
    assert!(eventually(|| h.controller.status().state == PlinthState::Disabled).await);
    assert_eq!(h.duty(), 0.0);
    assert_eq!(h.controller.status().motor_state, MotorState::Idle);

    h.controller.shutdown().await;
}

// ============================================================================
// Outbound Events
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn button_and_switch_events_reach_management_node() {
    let mut h = Harness::start().await;

    h.gpio.set_input(BUTTON, true);
    let press = h.recv().await;
    assert_eq!(press.addr, "/plinth/1/button/press");
    assert_eq!(press.args, vec![OscArg::Int(1)]);

    h.gpio.set_input(BUTTON, false);
    let release = h.recv().await;
    assert_eq!(release.addr, "/plinth/1/button/release");
    assert_eq!(release.args, vec![OscArg::Int(0)]);

    h.gpio.set_input(MAINTENANCE, true);
    let maintenance = h.recv().await;
    assert_eq!(maintenance.addr, "/plinth/1/maintenance");
    assert_eq!(maintenance.args, vec![OscArg::Int(1)]);

    h.controller.shutdown().await;
    assert!(h.gpio.is_released());
}
