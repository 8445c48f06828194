//! Plinth protocol messages.
//!
//! Every address is scoped to one plinth: `/plinth/<id>/...`. Inbound
//! commands are parsed from decoded [`OscMessage`]s; outbound events are
//! rendered into them.
//!
//! # Addresses
//!
//! | Direction | Address | Payload |
//! |-----------|---------|---------|
//! | in  | `/plinth/<id>/motor/open` | - |
//! | in  | `/plinth/<id>/motor/close` | - |
//! | in  | `/plinth/<id>/led` | brightness 0-255 |
//! | in  | `/plinth/<id>/led/pulse` | - |
//! | in  | `/plinth/<id>/led/off` | - |
//! | in  | `/plinth/<id>/enable` | - |
//! | in  | `/plinth/<id>/disable` | - |
//! | out | `/plinth/<id>/button/press` | int 1 |
//! | out | `/plinth/<id>/button/release` | int 0 |
//! | out | `/plinth/<id>/maintenance` | int 0/1 |
//!
//! # Example
//!
//! ```
//! use plinth_controller::messages::{PlinthCommand, PlinthEvent};
//! use plinth_controller::osc::{OscArg, OscMessage};
//!
//! let msg = OscMessage::new("/plinth/2/led").with_arg(OscArg::Int(150));
//! assert_eq!(PlinthCommand::parse(2, &msg), Some(PlinthCommand::SetLed(150)));
//! assert_eq!(PlinthCommand::parse(1, &msg), None);
//!
//! let event = PlinthEvent::Maintenance(true).to_osc(2);
//! assert_eq!(event.addr, "/plinth/2/maintenance");
//! ```

use crate::osc::{OscArg, OscMessage};

// ============================================================================
// Inbound Commands
// ============================================================================

/// A command addressed to this plinth by the management node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlinthCommand {
    /// Open the lid.
    MotorOpen,
    /// Close the lid.
    MotorClose,
    /// Set a direct LED brightness. The raw value is clamped on dispatch.
    SetLed(i64),
    /// Start the default pulse animation.
    LedPulse,
    /// Stop any animation and turn the LED off.
    LedOff,
    /// Show the indicator brightness.
    Enable,
    /// Turn the LED off and stop the motor.
    Disable,
}

impl PlinthCommand {
    /// Parse a message addressed to plinth `id`.
    ///
    /// Returns `None` for other plinths, unknown paths, and `led` messages
    /// whose payload is missing or not numeric.
    pub fn parse(id: u16, msg: &OscMessage) -> Option<Self> {
        let rest = strip_scope(id, &msg.addr)?;
        let command = match rest {
            "motor/open" => PlinthCommand::MotorOpen,
            "motor/close" => PlinthCommand::MotorClose,
            "led" => PlinthCommand::SetLed(msg.first_arg()?.as_i64()?),
            "led/pulse" => PlinthCommand::LedPulse,
            "led/off" => PlinthCommand::LedOff,
            "enable" => PlinthCommand::Enable,
            "disable" => PlinthCommand::Disable,
            _ => return None,
        };
        Some(command)
    }

    /// Address path below `/plinth/<id>/`.
    pub fn path(&self) -> &'static str {
        match self {
            PlinthCommand::MotorOpen => "motor/open",
            PlinthCommand::MotorClose => "motor/close",
            PlinthCommand::SetLed(_) => "led",
            PlinthCommand::LedPulse => "led/pulse",
            PlinthCommand::LedOff => "led/off",
            PlinthCommand::Enable => "enable",
            PlinthCommand::Disable => "disable",
        }
    }

    /// Render as an OSC message for plinth `id`.
    ///
    /// Used by test harnesses standing in for the management node.
    pub fn to_osc(&self, id: u16) -> OscMessage {
        let msg = OscMessage::new(address(id, self.path()));
        match self {
            PlinthCommand::SetLed(b) => match i32::try_from(*b) {
                Ok(v) => msg.with_arg(OscArg::Int(v)),
                Err(_) => msg.with_arg(OscArg::Long(*b)),
            },
            _ => msg,
        }
    }
}

/// Clamp a raw brightness payload to the LED range.
///
/// ```
/// use plinth_controller::messages::clamp_brightness;
///
/// assert_eq!(clamp_brightness(-5), 0);
/// assert_eq!(clamp_brightness(150), 150);
/// assert_eq!(clamp_brightness(300), 255);
/// ```
pub fn clamp_brightness(raw: i64) -> u8 {
    raw.clamp(0, 255) as u8
}

// ============================================================================
// Outbound Events
// ============================================================================

/// An event reported to the management node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlinthEvent {
    /// Debounced button went down.
    ButtonPress,
    /// Debounced button went up.
    ButtonRelease,
    /// Debounced maintenance switch changed.
    Maintenance(bool),
}

impl PlinthEvent {
    /// Address path below `/plinth/<id>/`.
    pub fn path(&self) -> &'static str {
        match self {
            PlinthEvent::ButtonPress => "button/press",
            PlinthEvent::ButtonRelease => "button/release",
            PlinthEvent::Maintenance(_) => "maintenance",
        }
    }

    /// Integer payload carried by the event.
    pub fn value(&self) -> i32 {
        match self {
            PlinthEvent::ButtonPress => 1,
            PlinthEvent::ButtonRelease => 0,
            PlinthEvent::Maintenance(active) => i32::from(*active),
        }
    }

    /// Render as an OSC message for plinth `id`.
    pub fn to_osc(&self, id: u16) -> OscMessage {
        OscMessage::new(address(id, self.path())).with_arg(OscArg::Int(self.value()))
    }

    /// Parse an event sent by plinth `id`.
    pub fn parse(id: u16, msg: &OscMessage) -> Option<Self> {
        match strip_scope(id, &msg.addr)? {
            "button/press" => Some(PlinthEvent::ButtonPress),
            "button/release" => Some(PlinthEvent::ButtonRelease),
            "maintenance" => {
                let active = msg.first_arg().and_then(OscArg::as_i64).unwrap_or(0) != 0;
                Some(PlinthEvent::Maintenance(active))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Full address for `path` on plinth `id`.
pub fn address(id: u16, path: &str) -> String {
    format!("/plinth/{}/{}", id, path)
}

fn strip_scope(id: u16, addr: &str) -> Option<&str> {
    let rest = addr.strip_prefix("/plinth/")?;
    let (scope, path) = rest.split_once('/')?;
    // Exact text match: "01" and "+1" are not plinth 1
    if scope != id.to_string() {
        return None;
    }
    Some(path.trim_end_matches('/'))
}
