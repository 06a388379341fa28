//! Trellis Network Library
//!
//! Client for the Trellis federated inter-game chat network: a game
//! server authenticates to the central relay over one long-lived
//! connection, subscribes to broadcast channels, exchanges presence, and
//! relays player-to-player tells across games.
//!
//! # Architecture
//!
//! - **Session**: connection/auth lifecycle, frame queues, outbound
//!   request builders
//! - **Dispatch**: routes each inbound frame to its handler and yields a
//!   normalized [`RelayEvent`]
//! - **Transport**: non-blocking text-frame seam; TCP bundled, anything
//!   frame-shaped pluggable
//!
//! The embedding host drives everything: it calls the pumps at a fixed
//! pulse rate and nothing in this crate blocks or spawns tasks.
//!
//! # Usage
//!
//! ```ignore
//! let mut session = Session::new(config);
//! session.connect(Box::new(TcpTransport::dial(addr).await?));
//!
//! // Every pulse:
//! if let Some(event) = session.pump_inbound(&roster) {
//!     match event {
//!         RelayEvent::Broadcast { name, game, message, .. } => { /* fan out */ }
//!         RelayEvent::Restart { downtime_secs } => { /* rebuild later */ }
//!         _ => {}
//!     }
//! }
//! session.pump_outbound();
//! ```

pub mod correlation;
pub mod dispatch;
pub mod error;
mod frame;
pub mod presence;
pub mod protocol;
pub mod roster;
pub mod session;
pub mod transport;

pub use correlation::{CorrelationTable, PendingRequest};
pub use dispatch::RelayEvent;
pub use error::{Error, Result};
pub use presence::PresenceCache;
pub use protocol::{Envelope, GameStatusReport, Status, MAX_MESSAGE_LEN};
pub use roster::PlayerRoster;
pub use session::{Session, SessionConfig};
pub use transport::{MemoryTransport, TcpTransport, Transport};
