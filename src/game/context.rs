//! Match Context
//!
//! The simulation state one match owns. Actions validate against it and
//! mutate it; nothing in it is shared with other matches.

use crate::game::entity::EntityStore;
use crate::game::grid::TileGrid;
use crate::game::resources::VersusSettings;
use crate::game::team::TeamTable;

/// Authoritative state of a single match.
#[derive(Debug, Default)]
pub struct MatchContext {
    pub entities: EntityStore,
    /// Active map, once loaded.
    pub grid: Option<TileGrid>,
    pub teams: TeamTable,
    pub settings: VersusSettings,
}

impl MatchContext {
    pub fn new(entities: EntityStore, teams: TeamTable, settings: VersusSettings) -> Self {
        Self {
            entities,
            grid: None,
            teams,
            settings,
        }
    }

    /// In bounds of the active map and unoccupied.
    pub fn is_tile_empty(&self, x: i32, y: i32) -> bool {
        self.grid.as_ref().is_some_and(|grid| grid.is_empty(x, y))
    }
}
