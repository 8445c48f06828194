//! Services that connect the plinth to the outside world.
//!
//! - `shared`: [`SharedPlinth`], the components every context touches, and
//!   command dispatch through [`CommandHandler`]
//! - `messenger`: outbound events to the management node over UDP
//! - `server`: inbound OSC command listener
//! - `input`: button and maintenance switch handling
//!
//! # Shared State Pattern
//!
//! All services share a single `SharedPlinth` wrapped in `Arc`:
//!
//! ```ignore
//! let plinth = Arc::new(SharedPlinth::new(&config, gpio, connector, handle));
//!
//! let server = CommandServer::bind(config.listen_port(), Arc::clone(&plinth)).await?;
//! let monitor = InputMonitor::new(Arc::clone(&plinth), Arc::clone(&plinth), ...);
//! ```

pub mod input;
pub mod messenger;
pub mod server;
pub mod shared;

pub use input::*;
pub use messenger::*;
pub use server::*;
pub use shared::*;
