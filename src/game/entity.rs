//! Entity Store
//!
//! Owns every live entity of a match, the entity/trait definitions they
//! are created from, and the enabled/disabled bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::ids::{EntityId, IdSupply};
use crate::game::component::{
    AttackComponent, Component, ComponentKind, ConstructionComponent, HealthComponent,
    MoveComponent, PositionComponent, SizeComponent, TeamComponent,
};

// =============================================================================
// Definitions
// =============================================================================

/// Per-mode stat block of an entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityStats {
    pub health: u32,
    pub damage: u32,
    pub move_range: u32,
    pub attack_range: u32,
    pub traits: Vec<String>,
}

/// Static definition of an entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityType {
    pub archetype: String,
    #[serde(rename = "dimX")]
    pub dim_x: u32,
    #[serde(rename = "dimY")]
    pub dim_y: u32,
    /// Passability classes granted to movers of this type.
    pub passability: Vec<String>,
    /// Stat blocks keyed by mode ("story", ...).
    pub stats: BTreeMap<String, EntityStats>,
}

/// Named bundle of component data applied on top of a new entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitType {
    pub description: String,
    pub components: BTreeMap<String, Value>,
}

// =============================================================================
// Entity
// =============================================================================

/// A live entity: id, type and at most one component per kind.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    type_id: String,
    definition: Arc<EntityType>,
    components: BTreeMap<ComponentKind, Component>,
}

impl Entity {
    fn new(id: EntityId, type_id: String, definition: Arc<EntityType>) -> Self {
        Self {
            id,
            type_id,
            definition,
            components: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Entity type id this entity was created from.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn definition(&self) -> &EntityType {
        &self.definition
    }

    /// Attach a component. Replaces (and returns) any component of the same kind.
    pub fn add_component(&mut self, component: Component) -> Option<Component> {
        self.components.insert(component.kind(), component)
    }

    pub fn remove_component(&mut self, kind: ComponentKind) -> Option<Component> {
        self.components.remove(&kind)
    }

    pub fn has_component(&self, kind: ComponentKind) -> bool {
        self.components.contains_key(&kind)
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(&kind)
    }

    pub fn component_mut(&mut self, kind: ComponentKind) -> Option<&mut Component> {
        self.components.get_mut(&kind)
    }

    /// Components in kind order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }
}

macro_rules! typed_access {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)*) => {
        impl Entity {
            $(
                pub fn $get(&self) -> Option<&$ty> {
                    match self.components.get(&ComponentKind::$variant) {
                        Some(Component::$variant(c)) => Some(c),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                    match self.components.get_mut(&ComponentKind::$variant) {
                        Some(Component::$variant(c)) => Some(c),
                        _ => None,
                    }
                }
            )*
        }
    };
}

typed_access! {
    position, position_mut => Position(PositionComponent);
    movement, movement_mut => Move(MoveComponent);
    team, team_mut => Team(TeamComponent);
    size, size_mut => Size(SizeComponent);
    health, health_mut => Health(HealthComponent);
    attack, attack_mut => Attack(AttackComponent);
    construction, construction_mut => Construction(ConstructionComponent);
}

// =============================================================================
// Entity Store
// =============================================================================

/// Registry of live entities.
#[derive(Debug, Default)]
pub struct EntityStore {
    entity_types: BTreeMap<String, Arc<EntityType>>,
    trait_types: BTreeMap<String, TraitType>,
    loadable: BTreeSet<ComponentKind>,
    saveable: BTreeSet<ComponentKind>,
    ids: IdSupply,
    entities: BTreeMap<EntityId, Entity>,
    active: BTreeSet<EntityId>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install entity type definitions.
    pub fn load_entity_types(&mut self, types: BTreeMap<String, EntityType>) {
        self.entity_types = types.into_iter().map(|(id, t)| (id, Arc::new(t))).collect();
    }

    /// Install trait definitions.
    pub fn load_trait_types(&mut self, traits: BTreeMap<String, TraitType>) {
        self.trait_types = traits;
    }

    /// Restrict which component kinds external data may write.
    pub fn set_loadable_components(&mut self, kinds: impl IntoIterator<Item = ComponentKind>) {
        self.loadable = kinds.into_iter().collect();
    }

    /// Restrict which component kinds appear in saves.
    pub fn set_saveable_components(&mut self, kinds: impl IntoIterator<Item = ComponentKind>) {
        self.saveable = kinds.into_iter().collect();
    }

    /// Definition of an entity type.
    pub fn entity_type(&self, type_id: &str) -> Option<Arc<EntityType>> {
        self.entity_types.get(type_id).cloned()
    }

    /// Create an entity.
    ///
    /// Uses `external_id` when given, otherwise a generated one. New
    /// entities start disabled and without components. An unknown type
    /// yields an entity with an empty definition.
    pub fn create(&mut self, type_id: &str, external_id: Option<EntityId>) -> EntityId {
        let definition = match self.entity_types.get(type_id) {
            Some(definition) => Arc::clone(definition),
            None => {
                warn!("Entity type {} does not exist", type_id);
                Arc::new(EntityType::default())
            }
        };

        let id = external_id.unwrap_or_else(|| EntityId::new(self.ids.next_id()));
        if self.entities.contains_key(&id) {
            warn!("Entity {} already exists and will be replaced", id);
            self.active.remove(&id);
        }

        self.entities
            .insert(id.clone(), Entity::new(id.clone(), type_id.to_string(), definition));
        debug!("Created entity {} of type {}", id, type_id);
        id
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Delete an entity.
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.active.remove(id);
        self.entities.remove(id)
    }

    pub fn enable(&mut self, id: &EntityId) -> bool {
        if !self.entities.contains_key(id) {
            warn!("Cannot enable unknown entity {}", id);
            return false;
        }
        self.active.insert(id.clone());
        true
    }

    pub fn disable(&mut self, id: &EntityId) -> bool {
        if !self.entities.contains_key(id) {
            warn!("Cannot disable unknown entity {}", id);
            return false;
        }
        self.active.remove(id)
    }

    pub fn is_active(&self, id: &EntityId) -> bool {
        self.active.contains(id)
    }

    /// Enabled entities, in id order.
    pub fn active_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.active.iter()
    }

    /// All entities, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Move an entity to a new id. Fails if the new id is taken.
    pub fn overwrite_id(&mut self, old: &EntityId, new: EntityId) -> bool {
        if self.entities.contains_key(&new) {
            warn!("Cannot rename entity {} to {}: id in use", old, new);
            return false;
        }
        let Some(mut entity) = self.entities.remove(old) else {
            return false;
        };

        entity.id = new.clone();
        if self.active.remove(old) {
            self.active.insert(new.clone());
        }
        self.entities.insert(new, entity);
        true
    }

    /// Drop every entity and start ids over.
    pub fn work_end(&mut self) {
        self.entities.clear();
        self.active.clear();
        self.ids.reset();
    }

    /// Apply traits to an entity in order.
    ///
    /// Only loadable component kinds are touched: missing ones are added
    /// default-constructed, then the trait data is loaded. Unknown traits
    /// and non-loadable kinds are warned about and skipped.
    pub fn load_traits(&mut self, id: &EntityId, traits: &[String]) {
        let Some(entity) = self.entities.get_mut(id) else {
            warn!("Cannot load traits on unknown entity {}", id);
            return;
        };

        for trait_id in traits {
            let Some(trait_type) = self.trait_types.get(trait_id) else {
                warn!("Trait {} does not exist", trait_id);
                continue;
            };

            for (name, data) in &trait_type.components {
                let Some(kind) = ComponentKind::from_name(name) else {
                    warn!("Trait {} names unknown component {}", trait_id, name);
                    continue;
                };
                if !self.loadable.contains(&kind) {
                    warn!("Trait {} names non-loadable component {}", trait_id, kind);
                    continue;
                }
                if !entity.has_component(kind) {
                    entity.add_component(Component::default_for(kind));
                }
                if let Some(component) = entity.component_mut(kind) {
                    component.load(data);
                }
            }
        }
    }

    /// Apply saved component data. Only loadable kinds the entity already has are written.
    pub fn load_components(&mut self, id: &EntityId, data: &BTreeMap<String, Value>) {
        let Some(entity) = self.entities.get_mut(id) else {
            warn!("Cannot load components on unknown entity {}", id);
            return;
        };

        for (name, blob) in data {
            let Some(kind) = ComponentKind::from_name(name) else {
                warn!("Component {} is unknown", name);
                continue;
            };
            if !self.loadable.contains(&kind) {
                warn!("Component {} is not loadable", kind);
                continue;
            }
            match entity.component_mut(kind) {
                Some(component) => {
                    component.load(blob);
                }
                None => warn!("Entity {} has no {} component", id, kind),
            }
        }
    }

    /// Saved data of every saveable component present.
    pub fn save_components(&self, entity: &Entity) -> BTreeMap<String, Value> {
        entity
            .components()
            .filter(|c| self.saveable.contains(&c.kind()))
            .map(|c| (c.kind().as_str().to_string(), c.save()))
            .collect()
    }
}
