//! Trait definitions for hardware and network abstraction.
//!
//! This module defines the seams that let the plinth controller:
//! - Run on a Raspberry Pi or entirely in memory
//! - Send events over UDP or into a test recorder
//!
//! # Submodules
//!
//! - `hardware`: GPIO lines, PWM duty, clock
//! - `network`: outbound link and event sink
//!
//! # Hardware Abstraction
//!
//! - [`Gpio`]: digital lines and PWM, backed by real or simulated hardware
//! - [`Clock`]: millisecond time source for debouncing and hold detection
//!
//! # Network Abstraction
//!
//! - [`Connector`] / [`Link`]: reconnectable datagram path
//! - [`EventSink`]: where the input loop reports button and switch changes

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
