//! Entity Factory
//!
//! Builds entities from their static type and a placement setup, and
//! turns live entities back into setups for snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::ids::EntityId;
use crate::game::component::{
    AttackComponent, Component, HealthComponent, MoveComponent, PositionComponent, SizeComponent,
    TeamComponent,
};
use crate::game::entity::EntityStore;

/// Placement description of an entity (also its saved form).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(rename = "type")]
    pub type_id: String,
    pub tile_x: i32,
    pub tile_y: i32,
    pub team: String,
    pub master: String,
    #[serde(default)]
    pub components: BTreeMap<String, Value>,
}

/// Broad entity category; decides which extra components are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Unit,
    Defense,
    Deco,
    Building,
    Construction,
    Hfe,
    Town,
}

impl Archetype {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Unit" => Some(Archetype::Unit),
            "Defense" => Some(Archetype::Defense),
            "Deco" => Some(Archetype::Deco),
            "Building" => Some(Archetype::Building),
            "Construction" => Some(Archetype::Construction),
            "HFE" => Some(Archetype::Hfe),
            "Town" => Some(Archetype::Town),
            _ => None,
        }
    }
}

/// Build an entity from a setup using the given stat mode.
///
/// Returns `None` for unknown types or archetypes. The entity is created
/// disabled and not placed on any grid.
pub fn build_entity(store: &mut EntityStore, setup: &EntitySetup, stat_mode: &str) -> Option<EntityId> {
    let Some(definition) = store.entity_type(&setup.type_id) else {
        warn!("Entity type {} does not exist", setup.type_id);
        return None;
    };
    let Some(archetype) = Archetype::from_name(&definition.archetype) else {
        warn!(
            "Entity type {} has unknown archetype {}",
            setup.type_id, definition.archetype
        );
        return None;
    };
    let stats = match definition.stats.get(stat_mode) {
        Some(stats) => stats.clone(),
        None => {
            warn!("Entity type {} has no {} stats", setup.type_id, stat_mode);
            Default::default()
        }
    };

    let id = store.create(&setup.type_id, setup.id.clone());
    let entity = store.get_mut(&id)?;

    entity.add_component(Component::Position(PositionComponent {
        tile_x: setup.tile_x,
        tile_y: setup.tile_y,
        ..Default::default()
    }));
    entity.add_component(Component::Size(SizeComponent {
        size_x: definition.dim_x.max(1),
        size_y: definition.dim_y.max(1),
    }));
    let health = stats.health.max(1);
    entity.add_component(Component::Health(HealthComponent {
        health,
        max_health: health,
    }));
    entity.add_component(Component::Team(TeamComponent {
        team_id: setup.team.clone(),
        master_id: setup.master.clone(),
    }));

    match archetype {
        Archetype::Unit => {
            entity.add_component(Component::Attack(AttackComponent {
                damage: stats.damage,
                range: stats.attack_range,
            }));
            entity.add_component(Component::Move(MoveComponent {
                range: stats.move_range,
                passability: definition.passability.iter().cloned().collect(),
                ..Default::default()
            }));
        }
        Archetype::Defense => {
            entity.add_component(Component::Attack(AttackComponent {
                damage: stats.damage,
                range: stats.attack_range,
            }));
        }
        Archetype::Deco
        | Archetype::Building
        | Archetype::Construction
        | Archetype::Hfe
        | Archetype::Town => {}
    }

    store.load_traits(&id, &stats.traits);
    if !setup.components.is_empty() {
        store.load_components(&id, &setup.components);
    }

    Some(id)
}

/// Saved form of a live entity.
pub fn save_entity(store: &EntityStore, id: &EntityId) -> Option<EntitySetup> {
    let entity = store.get(id)?;
    let (tile_x, tile_y) = entity
        .position()
        .map(|p| (p.tile_x, p.tile_y))
        .unwrap_or_default();
    let (team, master) = entity
        .team()
        .map(|t| (t.team_id.clone(), t.master_id.clone()))
        .unwrap_or_default();

    Some(EntitySetup {
        id: None,
        type_id: entity.type_id().to_string(),
        tile_x,
        tile_y,
        team,
        master,
        components: store.save_components(entity),
    })
}
