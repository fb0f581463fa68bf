//! Team Relations
//!
//! Alliance and enmity lookups between team ids.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::ids::ClientId;
use crate::game::entity::Entity;
use crate::game::grid::Tile;

/// Relations of one team. A team is allied with itself only if listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamType {
    pub allies: BTreeSet<String>,
    pub enemies: BTreeSet<String>,
}

/// Team relation table keyed by team id.
#[derive(Debug, Clone, Default)]
pub struct TeamTable {
    teams: BTreeMap<String, TeamType>,
}

impl TeamTable {
    pub fn new(teams: BTreeMap<String, TeamType>) -> Self {
        Self { teams }
    }

    pub fn get(&self, team: &str) -> Option<&TeamType> {
        self.teams.get(team)
    }

    /// Symmetric alliance. Unknown teams are warned about and treated as unrelated.
    pub fn is_allied(&self, a: &str, b: &str) -> bool {
        match (self.teams.get(a), self.teams.get(b)) {
            (Some(team_a), Some(team_b)) => team_a.allies.contains(b) && team_b.allies.contains(a),
            _ => {
                warn!("Team relation {} / {} is undefined", a, b);
                false
            }
        }
    }

    /// Symmetric enmity.
    pub fn is_enemy(&self, a: &str, b: &str) -> bool {
        match (self.teams.get(a), self.teams.get(b)) {
            (Some(team_a), Some(team_b)) => team_a.enemies.contains(b) && team_b.enemies.contains(a),
            _ => {
                warn!("Team relation {} / {} is undefined", a, b);
                false
            }
        }
    }

    /// Does `team` list `other` among its allies. No warning on unknown ids.
    pub fn lists_ally(&self, team: &str, other: &str) -> bool {
        self.teams.get(team).is_some_and(|t| t.allies.contains(other))
    }

    /// Does `team` list `other` among its enemies. No warning on unknown ids.
    pub fn lists_enemy(&self, team: &str, other: &str) -> bool {
        self.teams.get(team).is_some_and(|t| t.enemies.contains(other))
    }

    pub fn is_entity_enemy(&self, a: &Entity, b: &Entity) -> bool {
        match (a.team(), b.team()) {
            (Some(ta), Some(tb)) => self.is_enemy(&ta.team_id, &tb.team_id),
            _ => false,
        }
    }

    pub fn is_entity_friendly(&self, a: &Entity, b: &Entity) -> bool {
        match (a.team(), b.team()) {
            (Some(ta), Some(tb)) => self.is_allied(&ta.team_id, &tb.team_id),
            _ => false,
        }
    }

    /// Is the tile owned by a team allied with the entity.
    pub fn is_tile_friendly(&self, entity: &Entity, tile: &Tile) -> bool {
        entity
            .team()
            .is_some_and(|team| self.is_allied(&team.team_id, &tile.team))
    }
}

/// Is the entity controlled by the given client.
pub fn is_controlled(entity: &Entity, client: &ClientId) -> bool {
    entity
        .team()
        .is_some_and(|team| team.master_id == client.as_str())
}
