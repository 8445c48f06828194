//! Plinth configuration, built once at startup and passed to every component.
//!
//! Pin numbers, ports and timing constants all live here. Nothing reads the
//! environment after [`Config::from_env`] returns; components receive the
//! value (or the sub-config they need) through their constructors.
//!
//! # Example
//!
//! ```rust
//! use plinth_controller::config::{Config, DeviceConfig, NetworkConfig};
//!
//! let config = Config::default()
//!     .with_device(DeviceConfig::default().with_id(2))
//!     .with_network(NetworkConfig::default().with_mgmt_host("10.0.0.5"));
//!
//! assert_eq!(config.mgmt_port(), 5001);
//! assert_eq!(config.listen_port(), 6001);
//! ```

use std::time::Duration;

use heapless::String as HString;

use crate::error::ConfigError;

/// Maximum length for short config strings (hostnames)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Environment variable holding the plinth id.
pub const ENV_PLINTH_ID: &str = "PLINTH_ID";
/// Environment variable holding the management node address.
pub const ENV_MGMT_NODE_IP: &str = "MGMT_NODE_IP";
/// Environment variable naming an optional JSON config file.
pub const ENV_CONFIG_FILE: &str = "PLINTH_CONFIG";

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let take = s.len().min(MAX_SHORT_STRING);
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= take)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete plinth configuration
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Plinth identification
    pub device: DeviceConfig,
    /// Management node addressing
    pub network: NetworkConfig,
    /// Hardware line mapping
    pub pins: PinConfig,
    /// Input sampling and hold detection
    pub input: InputConfig,
    /// Stepper motor geometry and timing
    pub motor: MotorConfig,
    /// LED output and pulse animation
    pub led: LedConfig,
    /// Outbound reconnection policy
    pub reconnect: ReconnectConfig,
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// Reads `PLINTH_CONFIG` (a JSON file, `serde` feature only) first, then
    /// applies `PLINTH_ID` and `MGMT_NODE_IP` on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        #[cfg(feature = "serde")]
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        #[cfg(not(feature = "serde"))]
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PLINTH_ID) {
            let id = raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: ENV_PLINTH_ID,
                    value: raw.clone(),
                })?;
            config.device.id = id;
        }

        if let Some(host) = lookup(ENV_MGMT_NODE_IP) {
            let host = host.trim();
            if host.is_empty() || host.len() > MAX_SHORT_STRING {
                return Err(ConfigError::InvalidEnv {
                    name: ENV_MGMT_NODE_IP,
                    value: host.to_string(),
                });
            }
            config.network.mgmt_host = short_string(host);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    #[cfg(feature = "serde")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text. Missing fields take defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the id and the ports derived from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.device.id;
        if id == 0 {
            return Err(ConfigError::InvalidId(id));
        }
        for base in [self.network.mgmt_base_port, self.network.listen_base_port] {
            if base.checked_add(id - 1).is_none() {
                return Err(ConfigError::PortOverflow { base, id });
            }
        }
        Ok(())
    }

    /// UDP port on the management node that receives this plinth's events.
    pub fn mgmt_port(&self) -> u16 {
        self.network.port_for(self.network.mgmt_base_port, self.device.id)
    }

    /// Local UDP port this plinth listens on for commands.
    pub fn listen_port(&self) -> u16 {
        self.network
            .port_for(self.network.listen_base_port, self.device.id)
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Set network configuration
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set pin mapping
    pub fn with_pins(mut self, pins: PinConfig) -> Self {
        self.pins = pins;
        self
    }

    /// Set input configuration
    pub fn with_input(mut self, input: InputConfig) -> Self {
        self.input = input;
        self
    }

    /// Set motor configuration
    pub fn with_motor(mut self, motor: MotorConfig) -> Self {
        self.motor = motor;
        self
    }

    /// Set LED configuration
    pub fn with_led(mut self, led: LedConfig) -> Self {
        self.led = led;
        self
    }

    /// Set reconnect configuration
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Plinth identification
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    /// Plinth identifier, 1..N. Selects the port pair and address scope.
    pub id: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { id: 1 }
    }
}

impl DeviceConfig {
    /// Set the plinth id
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }
}

// ============================================================================
// Network Config
// ============================================================================

/// Management node addressing
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    /// Management node hostname or IP
    pub mgmt_host: ShortString,
    /// Port of plinth 1 on the management node; plinth N uses base + N - 1
    pub mgmt_base_port: u16,
    /// Local command port of plinth 1; plinth N uses base + N - 1
    pub listen_base_port: u16,
    /// Timeout applied to every socket operation, in milliseconds
    pub socket_timeout_ms: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mgmt_host: short_string("192.168.10.1"),
            mgmt_base_port: 5000,
            listen_base_port: 6000,
            socket_timeout_ms: 500,
        }
    }
}

impl NetworkConfig {
    /// Set the management node host
    pub fn with_mgmt_host(mut self, host: &str) -> Self {
        self.mgmt_host = short_string(host);
        self
    }

    /// Set the management node base port
    pub fn with_mgmt_base_port(mut self, port: u16) -> Self {
        self.mgmt_base_port = port;
        self
    }

    /// Set the local listening base port
    pub fn with_listen_base_port(mut self, port: u16) -> Self {
        self.listen_base_port = port;
        self
    }

    /// Set the socket timeout
    pub fn with_socket_timeout_ms(mut self, ms: u32) -> Self {
        self.socket_timeout_ms = ms;
        self
    }

    /// Socket timeout as a [`Duration`]
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.socket_timeout_ms.max(1)))
    }

    fn port_for(&self, base: u16, id: u16) -> u16 {
        base.saturating_add(id.saturating_sub(1))
    }
}

// ============================================================================
// Pin Config
// ============================================================================

/// Hardware line mapping (BCM numbering)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PinConfig {
    /// Button input (active-low)
    pub button: u8,
    /// Maintenance switch input (active-low)
    pub maintenance: u8,
    /// LED PWM output
    pub led: u8,
    /// Stepper STEP output
    pub step: u8,
    /// Stepper DIR output
    pub dir: u8,
    /// Stepper ENABLE output
    pub enable: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            button: 17,
            maintenance: 27,
            led: 22,
            step: 23,
            dir: 24,
            enable: 25,
        }
    }
}

impl PinConfig {
    /// Input lines, in claim order
    pub fn inputs(&self) -> [u8; 2] {
        [self.button, self.maintenance]
    }

    /// Digital output lines, in claim order
    pub fn outputs(&self) -> [u8; 3] {
        [self.step, self.dir, self.enable]
    }
}

// ============================================================================
// Input Config
// ============================================================================

/// Input sampling and hold detection
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InputConfig {
    /// Minimum interval between raw samples of one line
    pub debounce_ms: u64,
    /// Input loop period
    pub poll_interval_ms: u64,
    /// Hold time that triggers maintenance mode
    pub maintenance_hold_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 20,
            poll_interval_ms: 10,
            maintenance_hold_ms: 4000,
        }
    }
}

impl InputConfig {
    /// Set the debounce interval
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set the input loop period
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the maintenance hold threshold
    pub fn with_maintenance_hold_ms(mut self, ms: u64) -> Self {
        self.maintenance_hold_ms = ms;
        self
    }
}

// ============================================================================
// Motor Config
// ============================================================================

/// Stepper motor geometry and timing
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotorConfig {
    /// Steps between the closed and open end-stops
    pub steps_full: u32,
    /// Motor loop period in microseconds
    pub step_interval_us: u64,
    /// Width of the STEP pulse in microseconds
    pub step_pulse_us: u64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            steps_full: 1000,
            step_interval_us: 2000,
            step_pulse_us: 1000,
        }
    }
}

impl MotorConfig {
    /// Set the full travel in steps
    pub fn with_steps_full(mut self, steps: u32) -> Self {
        self.steps_full = steps;
        self
    }

    /// Set the motor loop period
    pub fn with_step_interval_us(mut self, us: u64) -> Self {
        self.step_interval_us = us;
        self
    }

    /// Set the STEP pulse width
    pub fn with_step_pulse_us(mut self, us: u64) -> Self {
        self.step_pulse_us = us;
        self
    }
}

// ============================================================================
// LED Config
// ============================================================================

/// LED output and pulse animation
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LedConfig {
    /// Hardware PWM frequency
    pub pwm_frequency_hz: f64,
    /// Brightness shown by the `enable` command
    pub indicator_brightness: u8,
    /// Pulse frequency used by the `led/pulse` command
    pub pulse_frequency_hz: f32,
    /// Pulse floor
    pub pulse_min: u8,
    /// Pulse ceiling
    pub pulse_max: u8,
    /// Animation step
    pub pulse_step_ms: u64,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 1000.0,
            indicator_brightness: 100,
            pulse_frequency_hz: 2.0,
            pulse_min: 50,
            pulse_max: 255,
            pulse_step_ms: 20,
        }
    }
}

impl LedConfig {
    /// Set the pulse animation step
    pub fn with_pulse_step_ms(mut self, ms: u64) -> Self {
        self.pulse_step_ms = ms;
        self
    }

    /// Set the indicator brightness
    pub fn with_indicator_brightness(mut self, brightness: u8) -> Self {
        self.indicator_brightness = brightness;
        self
    }
}

// ============================================================================
// Reconnect Config
// ============================================================================

/// Outbound reconnection policy
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconnectConfig {
    /// Consecutive failures before a loud warning and counter reset
    pub max_attempts: u32,
    /// Wait after noticing a lost link, before reconnecting
    pub delay_ms: u64,
    /// Watchdog period
    pub watchdog_interval_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_ms: 5000,
            watchdog_interval_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Set the attempt ceiling
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the post-disconnect delay
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Set the watchdog period
    pub fn with_watchdog_interval_ms(mut self, ms: u64) -> Self {
        self.watchdog_interval_ms = ms;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.device.id, 1);
        assert_eq!(config.network.mgmt_host.as_str(), "192.168.10.1");
        assert_eq!(config.mgmt_port(), 5000);
        assert_eq!(config.listen_port(), 6000);
        assert_eq!(config.motor.steps_full, 1000);
        assert_eq!(config.input.maintenance_hold_ms, 4000);
        assert_eq!(config.reconnect.max_attempts, 10);
    }

    #[test]
    fn ports_follow_plinth_id() {
        for id in 1..=3u16 {
            let config = Config::default().with_device(DeviceConfig::default().with_id(id));
            assert_eq!(config.mgmt_port(), 5000 + id - 1);
            assert_eq!(config.listen_port(), 6000 + id - 1);
        }
    }

    #[test]
    fn default_pin_mapping() {
        let pins = PinConfig::default();
        assert_eq!(pins.inputs(), [17, 27]);
        assert_eq!(pins.outputs(), [23, 24, 25]);
        assert_eq!(pins.led, 22);
    }

    #[test]
    fn from_lookup_reads_id_and_host() {
        let config = Config::from_lookup(lookup(&[
            (ENV_PLINTH_ID, "3"),
            (ENV_MGMT_NODE_IP, "10.1.2.3"),
        ]))
        .unwrap();
        assert_eq!(config.device.id, 3);
        assert_eq!(config.network.mgmt_host.as_str(), "10.1.2.3");
        assert_eq!(config.mgmt_port(), 5002);
    }

    #[test]
    fn from_lookup_without_vars_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn from_lookup_rejects_bad_id() {
        let err = Config::from_lookup(lookup(&[(ENV_PLINTH_ID, "one")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: ENV_PLINTH_ID, .. }));

        let err = Config::from_lookup(lookup(&[(ENV_PLINTH_ID, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidId(0)));
    }

    #[test]
    fn validate_catches_port_overflow() {
        let config = Config::default()
            .with_device(DeviceConfig::default().with_id(10))
            .with_network(NetworkConfig::default().with_listen_base_port(65530));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PortOverflow { base: 65530, id: 10 })
        ));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_input(InputConfig::default().with_debounce_ms(5))
            .with_motor(MotorConfig::default().with_steps_full(200).with_step_pulse_us(0))
            .with_reconnect(ReconnectConfig::default().with_max_attempts(3));

        assert_eq!(config.input.debounce_ms, 5);
        assert_eq!(config.motor.steps_full, 200);
        assert_eq!(config.motor.step_pulse_us, 0);
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn socket_timeout_never_zero() {
        let network = NetworkConfig::default().with_socket_timeout_ms(0);
        assert!(network.socket_timeout() > Duration::ZERO);
    }

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn short_string_utf8_boundary() {
        let input = "é".repeat(40); // 80 bytes
        let s = short_string(&input);
        assert!(s.len() <= MAX_SHORT_STRING);
        assert!(core::str::from_utf8(s.as_bytes()).is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_partial_overrides() {
        let config = Config::from_json(
            r#"{"device": {"id": 2}, "motor": {"steps_full": 500}, "network": {"mgmt_host": "mgmt.local"}}"#,
        )
        .unwrap();
        assert_eq!(config.device.id, 2);
        assert_eq!(config.motor.steps_full, 500);
        assert_eq!(config.motor.step_interval_us, 2000);
        assert_eq!(config.network.mgmt_host.as_str(), "mgmt.local");
        assert_eq!(config.pins, PinConfig::default());
    }
}
