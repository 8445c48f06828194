//! Inbound command server.
//!
//! Listens for OSC datagrams from the management node on this plinth's
//! command port and hands every command addressed to this plinth to a
//! [`CommandHandler`]. Malformed datagrams and commands for other plinths
//! are logged and dropped.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use plinth_controller::messages::PlinthCommand;
//! use plinth_controller::osc::OscMessage;
//! use plinth_controller::services::{CommandHandler, CommandServer};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<PlinthCommand>>);
//!
//! impl CommandHandler for Recorder {
//!     fn plinth_id(&self) -> u16 { 1 }
//!     fn apply_command(&self, cmd: PlinthCommand) { self.0.lock().unwrap().push(cmd); }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let recorder = Arc::new(Recorder::default());
//! let server = CommandServer::bind(0, Arc::clone(&recorder)).await.unwrap();
//!
//! let packet = OscMessage::new("/plinth/1/motor/open").encode().unwrap();
//! assert_eq!(server.handle_packet(&packet), 1);
//! assert_eq!(*recorder.0.lock().unwrap(), vec![PlinthCommand::MotorOpen]);
//! # }
//! ```

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::messages::PlinthCommand;
use crate::osc::decode_packet;

use super::shared::CommandHandler;

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 4096;

/// UDP listener dispatching OSC commands.
pub struct CommandServer<H: CommandHandler> {
    socket: UdpSocket,
    handler: H,
}

impl<H: CommandHandler> CommandServer<H> {
    /// Bind `0.0.0.0:port`. Port 0 picks a free port.
    pub async fn bind(port: u16, handler: H) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(Self { socket, handler })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Decode one datagram and dispatch its commands.
    ///
    /// Returns the number of commands applied.
    pub fn handle_packet(&self, packet: &[u8]) -> usize {
        let messages = match decode_packet(packet) {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("Dropping malformed OSC packet ({} bytes): {}", packet.len(), e);
                return 0;
            }
        };

        let id = self.handler.plinth_id();
        let mut applied = 0;
        for msg in &messages {
            match PlinthCommand::parse(id, msg) {
                Some(cmd) => {
                    self.handler.apply_command(cmd);
                    applied += 1;
                }
                None => log::debug!("Ignoring {} {:?}", msg.addr, msg.args),
            }
        }
        applied
    }

    /// Serve until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.local_addr() {
            Ok(addr) => log::info!("OSC server listening on {}", addr),
            Err(e) => log::info!("OSC server listening (address unknown: {})", e),
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                received = self.socket.recv_from(&mut buf) => received,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            match received {
                Ok((len, from)) => {
                    log::trace!("{} bytes from {}", len, from);
                    self.handle_packet(&buf[..len]);
                }
                Err(e) => {
                    log::error!("Error receiving command: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
        log::info!("OSC server stopped");
    }
}
