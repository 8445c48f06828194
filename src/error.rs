//! Error types shared across the controller.
//!
//! Every error here is recoverable from the caller's point of view: the
//! loops log them and carry on. Only the binary's top level turns an error
//! into a process exit, after running the orderly shutdown.

use thiserror::Error;

/// Errors raised by a [`Gpio`](crate::traits::Gpio) backend.
#[derive(Debug, Error)]
pub enum HalError {
    /// The line was never claimed by this backend.
    #[error("GPIO {0} is not configured")]
    UnknownLine(u8),

    /// The backend has been shut down and no longer owns its lines.
    #[error("GPIO {0} used after shutdown")]
    Released(u8),

    /// The hardware driver rejected the operation.
    #[error("GPIO {line}: {message}")]
    Driver {
        /// Line the operation targeted.
        line: u8,
        /// Driver-provided detail.
        message: String,
    },

    /// The driver could not be initialized at all.
    #[error("GPIO unavailable: {0}")]
    Unavailable(String),
}

impl HalError {
    /// Build a [`HalError::Driver`] from any displayable driver error.
    pub fn driver(line: u8, err: impl core::fmt::Display) -> Self {
        HalError::Driver {
            line,
            message: err.to_string(),
        }
    }
}

/// Errors raised while encoding or decoding an OSC packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    /// The packet could not be parsed as OSC.
    #[error("malformed OSC packet: {0}")]
    Decode(String),

    /// A message could not be encoded.
    #[error("failed to encode OSC packet: {0}")]
    Encode(String),

    /// The address did not start with `/`.
    #[error("invalid address pattern {0:?}")]
    InvalidAddress(String),

    /// An argument used a type the plinth protocol does not carry.
    #[error("unsupported argument type {0}")]
    UnsupportedType(String),

    /// Bundles were nested deeper than the decoder accepts.
    #[error("bundles nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Errors raised while building a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The plinth id must be at least 1.
    #[error("plinth id must be >= 1, got {0}")]
    InvalidId(u16),

    /// A port computed from the plinth id overflowed.
    #[error("port {base} + plinth {id} is out of range")]
    PortOverflow {
        /// Configured base port.
        base: u16,
        /// Plinth id.
        id: u16,
    },

    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file was not valid JSON for [`Config`](crate::Config).
    #[cfg(feature = "serde")]
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hal_error_display_carries_line() {
        let err = HalError::driver(23, "permission denied");
        assert_eq!(err.to_string(), "GPIO 23: permission denied");
        assert_eq!(HalError::UnknownLine(5).to_string(), "GPIO 5 is not configured");
    }

    #[test]
    fn osc_error_display() {
        assert_eq!(
            OscError::InvalidAddress("plinth".into()).to_string(),
            "invalid address pattern \"plinth\""
        );
        assert_eq!(
            OscError::NestingTooDeep(8).to_string(),
            "bundles nested deeper than 8 levels"
        );
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidEnv {
            name: "PLINTH_ID",
            value: "abc".into(),
        };
        assert!(err.to_string().contains("PLINTH_ID"));
        assert!(err.to_string().contains("abc"));
    }
}
