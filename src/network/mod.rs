//! Network Layer
//!
//! Rooms, sessions and the WebSocket transport.
//! Match rules live in `game/`; this layer only routes.

pub mod directory;
pub mod protocol;
pub mod server;
pub mod session;
pub mod versus;

pub use directory::{Room, RoomFactory, SessionDirectory};
pub use protocol::{ClientMessage, Envelope, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{Session, SessionError};
pub use versus::{versus_factory, MatchOrchestrator, MatchPhase, VERSUS_ROOM};
