//! Network abstraction traits for the outbound event link.
//!
//! # Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Connector`] | Establishes a [`Link`] to the management node |
//! | [`Link`] | Sends one encoded datagram |
//! | [`EventSink`] | Receives plinth events from the input loop |
//!
//! The split between `Connector` and `Link` lets the messenger retry a link
//! that could not be set up without knowing about sockets. Tests swap in
//! [`crate::hal::MockConnector`].

use std::io;

/// An established outbound path to the management node.
pub trait Link: Send + Sync {
    /// Send one datagram. Must return within the configured socket timeout.
    fn send(&self, packet: &[u8]) -> io::Result<()>;
}

/// Factory for [`Link`]s.
pub trait Connector: Send + Sync {
    /// Link type produced by this connector.
    type Link: Link;

    /// Try to establish a link.
    fn connect(&self) -> io::Result<Self::Link>;

    /// Human-readable destination for log messages.
    fn describe(&self) -> String;
}

/// Consumer of the input loop's events.
///
/// Implementations must never fail from the caller's point of view: losing
/// connectivity must not disturb input handling.
pub trait EventSink: Send + Sync {
    /// The button went from released to pressed.
    fn button_pressed(&self);

    /// The button went from pressed to released.
    fn button_released(&self);

    /// The maintenance switch changed to `active`.
    fn maintenance_changed(&self, active: bool);
}

impl<E: EventSink + ?Sized> EventSink for std::sync::Arc<E> {
    fn button_pressed(&self) {
        (**self).button_pressed()
    }

    fn button_released(&self) {
        (**self).button_released()
    }

    fn maintenance_changed(&self, active: bool) {
        (**self).maintenance_changed(active)
    }
}
