//! Open Sound Control 1.0 messages for the plinth protocol.
//!
//! Framing is done by [`rosc`]. This module narrows OSC to the argument
//! types the management node actually sends, flattens bundles into their
//! messages and bounds bundle nesting.
//!
//! # Example
//!
//! ```rust
//! use plinth_controller::osc::{decode_packet, OscArg, OscMessage};
//!
//! let msg = OscMessage::new("/plinth/1/led").with_arg(OscArg::Int(150));
//! let bytes = msg.encode().unwrap();
//! assert_eq!(bytes.len() % 4, 0);
//!
//! let decoded = decode_packet(&bytes).unwrap();
//! assert_eq!(decoded, vec![msg]);
//! ```

use rosc::{OscBundle, OscPacket, OscTime, OscType};

use crate::error::OscError;

const MAX_BUNDLE_DEPTH: usize = 8;

/// OSC "immediately" time tag.
const IMMEDIATE: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// A single OSC argument.
#[derive(Clone, Debug, PartialEq)]
pub enum OscArg {
    /// `i`: 32-bit integer
    Int(i32),
    /// `h`: 64-bit integer
    Long(i64),
    /// `f`: 32-bit float
    Float(f32),
    /// `d`: 64-bit float
    Double(f64),
    /// `s`: string
    Str(String),
    /// `T` / `F`
    Bool(bool),
    /// `N`
    Nil,
}

impl OscArg {
    /// Interpret the argument as an integer.
    ///
    /// Floats are truncated toward zero, booleans map to 0/1 and numeric
    /// strings are parsed. Returns `None` for nil, NaN and non-numeric text.
    ///
    /// ```
    /// use plinth_controller::osc::OscArg;
    ///
    /// assert_eq!(OscArg::Float(150.9).as_i64(), Some(150));
    /// assert_eq!(OscArg::Str(" 42 ".into()).as_i64(), Some(42));
    /// assert_eq!(OscArg::Bool(true).as_i64(), Some(1));
    /// assert_eq!(OscArg::Nil.as_i64(), None);
    /// ```
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OscArg::Int(v) => Some(i64::from(*v)),
            OscArg::Long(v) => Some(*v),
            OscArg::Float(v) => float_to_i64(f64::from(*v)),
            OscArg::Double(v) => float_to_i64(*v),
            OscArg::Bool(v) => Some(i64::from(*v)),
            OscArg::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
            }
            OscArg::Nil => None,
        }
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    if v.is_nan() {
        None
    } else {
        // `as` saturates at the i64 bounds
        Some(v.trunc() as i64)
    }
}

impl From<OscArg> for OscType {
    fn from(arg: OscArg) -> Self {
        match arg {
            OscArg::Int(v) => OscType::Int(v),
            OscArg::Long(v) => OscType::Long(v),
            OscArg::Float(v) => OscType::Float(v),
            OscArg::Double(v) => OscType::Double(v),
            OscArg::Str(s) => OscType::String(s),
            OscArg::Bool(v) => OscType::Bool(v),
            OscArg::Nil => OscType::Nil,
        }
    }
}

impl TryFrom<OscType> for OscArg {
    type Error = OscError;

    fn try_from(value: OscType) -> Result<Self, OscError> {
        Ok(match value {
            OscType::Int(v) => OscArg::Int(v),
            OscType::Long(v) => OscArg::Long(v),
            OscType::Float(v) => OscArg::Float(v),
            OscType::Double(v) => OscArg::Double(v),
            OscType::String(s) => OscArg::Str(s),
            OscType::Bool(v) => OscArg::Bool(v),
            OscType::Nil => OscArg::Nil,
            other => return Err(OscError::UnsupportedType(format!("{:?}", other))),
        })
    }
}

/// An OSC message: address pattern plus arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct OscMessage {
    /// Address pattern, e.g. `/plinth/1/led`
    pub addr: String,
    /// Arguments in order
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Message with no arguments.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    /// First argument, if any.
    pub fn first_arg(&self) -> Option<&OscArg> {
        self.args.first()
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, OscError> {
        encode(&OscPacket::Message(self.clone().into()))
    }
}

impl From<OscMessage> for rosc::OscMessage {
    fn from(msg: OscMessage) -> Self {
        rosc::OscMessage {
            addr: msg.addr,
            args: msg.args.into_iter().map(OscType::from).collect(),
        }
    }
}

impl TryFrom<rosc::OscMessage> for OscMessage {
    type Error = OscError;

    fn try_from(msg: rosc::OscMessage) -> Result<Self, OscError> {
        if !msg.addr.starts_with('/') {
            return Err(OscError::InvalidAddress(msg.addr));
        }
        let args = msg
            .args
            .into_iter()
            .map(OscArg::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            addr: msg.addr,
            args,
        })
    }
}

/// Encode messages as a bundle with the "immediately" time tag.
pub fn encode_bundle(messages: &[OscMessage]) -> Result<Vec<u8>, OscError> {
    encode(&OscPacket::Bundle(OscBundle {
        timetag: IMMEDIATE,
        content: messages
            .iter()
            .map(|m| OscPacket::Message(m.clone().into()))
            .collect(),
    }))
}

fn encode(packet: &OscPacket) -> Result<Vec<u8>, OscError> {
    rosc::encoder::encode(packet).map_err(|e| OscError::Encode(format!("{:?}", e)))
}

/// Decode a packet into the messages it carries, flattening bundles.
///
/// Every message must be well formed and use only [`OscArg`] types; one bad
/// element rejects the whole packet.
pub fn decode_packet(buf: &[u8]) -> Result<Vec<OscMessage>, OscError> {
    let (rest, packet) =
        rosc::decoder::decode_udp(buf).map_err(|e| OscError::Decode(format!("{:?}", e)))?;
    if !rest.is_empty() {
        log::debug!("Ignoring {} trailing bytes after OSC packet", rest.len());
    }
    let mut out = Vec::new();
    flatten(packet, 0, &mut out)?;
    Ok(out)
}

fn flatten(packet: OscPacket, depth: usize, out: &mut Vec<OscMessage>) -> Result<(), OscError> {
    match packet {
        OscPacket::Message(msg) => out.push(msg.try_into()?),
        OscPacket::Bundle(bundle) => {
            if depth >= MAX_BUNDLE_DEPTH {
                return Err(OscError::NestingTooDeep(MAX_BUNDLE_DEPTH));
            }
            // Time tags are ignored; everything runs on receipt
            for element in bundle.content {
                flatten(element, depth + 1, out)?;
            }
        }
    }
    Ok(())
}
