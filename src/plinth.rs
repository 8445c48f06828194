//! Plinth controller: owns the components and runs the loops.
//!
//! # Execution Contexts
//!
//! | Context | Runs on | Cadence | Body |
//! |---------|---------|---------|------|
//! | input loop | OS thread | 10 ms | [`InputMonitor::poll`] |
//! | motor loop | OS thread | 2 ms | [`StepperMotor::execute_step`] |
//! | watchdog | tokio task | 5 s | reconnect when the link is down |
//! | command server | tokio task | per datagram | [`CommandServer::run`] |
//! | LED pulse | tokio task | 20 ms | spawned by [`LedController`] |
//!
//! The two timing-sensitive loops get dedicated threads so message handling
//! can never starve step pulses. Every loop logs a failed iteration, backs
//! off briefly and carries on.
//!
//! # Shutdown Order
//!
//! 1. Clear the running flag and signal the tasks
//! 2. Stop the motor and release its enable line
//! 3. Cancel any pulse (LED forced to 0)
//! 4. Wait for the loops to exit
//! 5. Release the GPIO lines
//!
//! [`StepperMotor::execute_step`]: crate::stepper::StepperMotor::execute_step
//! [`LedController`]: crate::led::LedController

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Config, ReconnectConfig};
use crate::hal::{open_gpio, AnyGpio};
use crate::services::{CommandServer, InputMonitor, PlinthStatus, SharedPlinth, UdpConnector};
use crate::traits::{Clock, Connector, Gpio, SystemClock};

/// Pause after a failed loop iteration.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for each task to finish.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// The production controller: real or simulated GPIO, UDP to the management node.
pub type DefaultController = PlinthController<AnyGpio, UdpConnector>;

/// Top-level controller for one plinth.
///
/// # Example
///
/// ```rust,no_run
/// use plinth_controller::config::Config;
/// use plinth_controller::PlinthController;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let mut controller = PlinthController::from_config(Config::from_env()?, tokio::runtime::Handle::current());
/// controller.start().await?;
/// tokio::signal::ctrl_c().await?;
/// controller.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PlinthController<G: Gpio + 'static, C: Connector + 'static> {
    config: Config,
    plinth: Arc<SharedPlinth<G, C>>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    threads: Vec<thread::JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
    server_addr: Option<SocketAddr>,
    stopped: bool,
}

impl DefaultController {
    /// Claim GPIO (or fall back to simulation) and target the configured
    /// management node.
    pub fn from_config(config: Config, runtime: Handle) -> Self {
        let gpio = Arc::new(open_gpio(&config));
        let connector = UdpConnector::from_config(&config);
        Self::new(config, gpio, connector, runtime)
    }
}

impl<G: Gpio + 'static, C: Connector + 'static> PlinthController<G, C> {
    /// Build the controller. Nothing runs until [`Self::start`].
    pub fn new(config: Config, gpio: Arc<G>, connector: C, runtime: Handle) -> Self {
        let plinth = Arc::new(SharedPlinth::new(&config, gpio, connector, runtime));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            plinth,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            threads: Vec::new(),
            tasks: Vec::new(),
            server_addr: None,
            stopped: false,
        }
    }

    /// Shared components.
    pub fn plinth(&self) -> &Arc<SharedPlinth<G, C>> {
        &self.plinth
    }

    /// Configuration the controller was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address of the command server, if it bound.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    /// Whether the loops are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the whole plinth.
    pub fn status(&self) -> PlinthStatus {
        self.plinth.status()
    }

    /// Start the command server, the loops and the watchdog.
    ///
    /// A command port that cannot be bound is logged and not retried; the
    /// plinth keeps running with outbound events only.
    ///
    /// # Errors
    ///
    /// Fails only if a loop thread cannot be spawned.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!("Starting Plinth {} Controller", self.config.device.id);
        if self.plinth.gpio().is_simulated() {
            log::warn!("Running with simulated GPIO");
        }

        let port = self.config.listen_port();
        match CommandServer::bind(port, Arc::clone(&self.plinth)).await {
            Ok(server) => {
                self.server_addr = server.local_addr().ok();
                let rx = self.shutdown_tx.subscribe();
                self.tasks.push(tokio::spawn(server.run(rx)));
            }
            Err(e) => {
                log::error!("Failed to start OSC server on port {}: {}", port, e);
            }
        }

        self.spawn_input_loop()?;
        self.spawn_motor_loop()?;

        let watchdog = watchdog_loop(
            Arc::clone(&self.plinth),
            self.config.reconnect.clone(),
            self.shutdown_tx.subscribe(),
        );
        self.tasks.push(tokio::spawn(watchdog));

        log::info!("Plinth {} running", self.config.device.id);
        Ok(())
    }

    fn spawn_input_loop(&mut self) -> anyhow::Result<()> {
        let mut monitor = InputMonitor::new(
            Arc::clone(&self.plinth),
            Arc::clone(&self.plinth),
            self.config.pins.button,
            self.config.pins.maintenance,
            &self.config.input,
        );
        let running = Arc::clone(&self.running);
        let interval = Duration::from_millis(self.config.input.poll_interval_ms);

        let handle = thread::Builder::new()
            .name("plinth-input".into())
            .spawn(move || {
                let clock = SystemClock::new();
                while running.load(Ordering::SeqCst) {
                    match monitor.poll(clock.now_ms()) {
                        Ok(()) => thread::sleep(interval),
                        Err(e) => {
                            log::error!("Error in input loop: {}", e);
                            thread::sleep(ERROR_BACKOFF);
                        }
                    }
                }
                log::debug!("Input loop stopped");
            })
            .context("failed to spawn input loop")?;
        self.threads.push(handle);
        Ok(())
    }

    fn spawn_motor_loop(&mut self) -> anyhow::Result<()> {
        let plinth = Arc::clone(&self.plinth);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_micros(self.config.motor.step_interval_us);

        let handle = thread::Builder::new()
            .name("plinth-motor".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match plinth.motor().execute_step() {
                        Ok(()) => thread::sleep(interval),
                        Err(e) => {
                            log::error!("Error in motor loop: {}", e);
                            thread::sleep(ERROR_BACKOFF);
                        }
                    }
                }
                log::debug!("Motor loop stopped");
            })
            .context("failed to spawn motor loop")?;
        self.threads.push(handle);
        Ok(())
    }

    /// Stop everything and release the hardware. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        log::info!("Stopping plinth controller");

        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        self.plinth.motor().stop();
        self.plinth.led().cancel_pulse();

        for task in self.tasks.drain(..) {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Task ended abnormally: {}", e),
                Err(_) => log::warn!("Task did not stop within {:?}", TASK_STOP_TIMEOUT),
            }
        }

        let threads: Vec<_> = self.threads.drain(..).collect();
        let joined = tokio::task::spawn_blocking(move || {
            for handle in threads {
                let name = handle.thread().name().unwrap_or("loop").to_string();
                if handle.join().is_err() {
                    log::error!("{} thread panicked", name);
                }
            }
        })
        .await;
        if let Err(e) = joined {
            log::error!("Failed to join loop threads: {}", e);
        }

        self.plinth.gpio().shutdown();
        log::info!("Plinth {} stopped", self.config.device.id);
    }
}

impl<G: Gpio + 'static, C: Connector + 'static> Drop for PlinthController<G, C> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }
}

/// Resolve once shutdown is signalled or the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn watchdog_loop<G: Gpio + 'static, C: Connector + 'static>(
    plinth: Arc<SharedPlinth<G, C>>,
    config: ReconnectConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(
        config.watchdog_interval_ms.max(1),
    ));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        log_status(&plinth.status());
        if plinth.messenger().is_connected() {
            continue;
        }

        log::warn!("OSC client disconnected; attempting reconnect");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(config.delay_ms)) => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        let target = Arc::clone(&plinth);
        if let Err(e) = tokio::task::spawn_blocking(move || target.messenger().reconnect()).await {
            log::error!("Error in watchdog loop: {}", e);
        }
    }
    log::debug!("Watchdog stopped");
}

#[cfg(feature = "serde")]
fn log_status(status: &PlinthStatus) {
    match serde_json::to_string(status) {
        Ok(json) => log::debug!("Status {}", json),
        Err(e) => log::debug!("Status {:?} ({})", status, e),
    }
}

#[cfg(not(feature = "serde"))]
fn log_status(status: &PlinthStatus) {
    log::debug!("Status {:?}", status);
}
