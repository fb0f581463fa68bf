//! Game Logic Module
//!
//! Match rules, independent of any transport.
//!
//! ## Module Structure
//!
//! - `component`: Component records and their JSON form
//! - `entity`: Entities, type/trait catalogs, the entity store
//! - `factory`: Building entities from placement records
//! - `grid`: Tile grid, layers and occupancy
//! - `team`: Ally/enemy relations
//! - `pathfind`: Bounded breadth-first reachability
//! - `movement`: Traversal rules and the move action
//! - `action`: Validated, queued action pipeline
//! - `resources`: Resource files and map sources
//! - `context`: State shared by every action handler

pub mod action;
pub mod component;
pub mod context;
pub mod entity;
pub mod factory;
pub mod grid;
pub mod movement;
pub mod pathfind;
pub mod resources;
pub mod team;

// Re-export key types
pub use action::{ActionPipeline, ActionRequest, MoveRequest};
pub use component::{Component, ComponentKind};
pub use context::MatchContext;
pub use entity::{Entity, EntityStore, EntityType};
pub use factory::EntitySetup;
pub use grid::{MapData, Tile, TileGrid};
pub use pathfind::{Frontier, PathStep};
pub use resources::{MatchResources, ResourceLoader};
pub use team::TeamTable;
