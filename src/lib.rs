//! # Skirmish Server
//!
//! Authoritative match server for two-player, turn-based skirmishes on a
//! tile grid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SKIRMISH SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── events.rs   - Named-channel event bus                   │
//! │  └── ids.rs      - Id newtypes and id supply                 │
//! │                                                              │
//! │  game/           - Match rules                               │
//! │  ├── entity.rs   - Entities and the entity store             │
//! │  ├── grid.rs     - Tile grid and occupancy                   │
//! │  ├── pathfind.rs - Bounded reachability                      │
//! │  ├── movement.rs - Traversal rules, move action              │
//! │  └── action.rs   - Action pipeline                           │
//! │                                                              │
//! │  network/        - Rooms and transport                       │
//! │  ├── session.rs  - Membership and leadership                 │
//! │  ├── directory.rs- Room registry and relay                   │
//! │  ├── versus.rs   - Versus match handshake and actions        │
//! │  ├── server.rs   - WebSocket server                          │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The game layer never touches sockets. Rooms emit outbound traffic on
//! their session bus, the directory relays it onto its own bus, and the
//! server delivers it to connections.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::ids::{ClientId, EntityId, RoomId};
pub use game::entity::{Entity, EntityStore};
pub use game::grid::TileGrid;
pub use network::directory::SessionDirectory;
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
