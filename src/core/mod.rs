//! Core primitives shared by the game and network layers.

pub mod events;
pub mod ids;

// Re-export core types
pub use events::{BusEvent, EventBus, SharedEventBus};
pub use ids::{ClientId, EntityId, IdSupply, RoomId};
