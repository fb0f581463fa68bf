//! Entity Components
//!
//! Plain data records attached to entities, keyed by [`ComponentKind`].
//! Components save to JSON and load back from partial JSON objects,
//! one field at a time.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::game::pathfind::PathStep;

/// Default travel speed of a moving entity (pixels per second).
pub const DEFAULT_MOVE_SPEED: f32 = 480.0;

/// Distance a moving entity covers per path step before snapping to the next tile.
pub const DEFAULT_MOVE_STEP_DISTANCE: f32 = 96.0;

// =============================================================================
// Component Kinds
// =============================================================================

/// Closed set of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Position,
    Move,
    Team,
    Size,
    Health,
    Attack,
    Construction,
}

impl ComponentKind {
    /// Every kind, in declaration order.
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::Position,
        ComponentKind::Move,
        ComponentKind::Team,
        ComponentKind::Size,
        ComponentKind::Health,
        ComponentKind::Attack,
        ComponentKind::Construction,
    ];

    /// Name used in save data and trait definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Position => "Position",
            ComponentKind::Move => "Move",
            ComponentKind::Team => "Team",
            ComponentKind::Size => "Size",
            ComponentKind::Health => "Health",
            ComponentKind::Attack => "Attack",
            ComponentKind::Construction => "Construction",
        }
    }

    /// Look up a kind by its save-data name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Component Records
// =============================================================================

/// Tile and pixel position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionComponent {
    pub tile_x: i32,
    pub tile_y: i32,
    pub position_x: f32,
    pub position_y: f32,
}

/// Movement capabilities and the in-flight path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveComponent {
    /// Maximum path cost per move.
    pub range: u32,
    /// Remaining path deltas while moving.
    pub path: Vec<PathStep>,
    pub speed: f32,
    pub distance: f32,
    pub max_distance: f32,
    /// Passability classes this entity may enter.
    pub passability: BTreeSet<String>,
    pub is_coward: bool,
    pub is_stealth: bool,
    pub is_cloaked: bool,
    pub is_avian: bool,
}

impl Default for MoveComponent {
    fn default() -> Self {
        Self {
            range: 0,
            path: Vec::new(),
            speed: DEFAULT_MOVE_SPEED,
            distance: 0.0,
            max_distance: DEFAULT_MOVE_STEP_DISTANCE,
            passability: BTreeSet::new(),
            is_coward: false,
            is_stealth: false,
            is_cloaked: false,
            is_avian: false,
        }
    }
}

/// Team membership and controlling client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamComponent {
    #[serde(rename = "teamID")]
    pub team_id: String,
    #[serde(rename = "masterID")]
    pub master_id: String,
}

/// Footprint in tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeComponent {
    pub size_x: u32,
    pub size_y: u32,
}

impl Default for SizeComponent {
    fn default() -> Self {
        Self { size_x: 1, size_y: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponent {
    pub health: u32,
    pub max_health: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackComponent {
    pub damage: u32,
    pub range: u32,
}

fn step_count(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

/// Build progress. Saves as `[stepsRequired, stepsCompleted, isComplete]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructionComponent {
    pub steps_required: u32,
    pub steps_completed: u32,
    pub is_complete: bool,
}

impl ConstructionComponent {
    fn save(&self) -> Value {
        json!([self.steps_required, self.steps_completed, self.is_complete])
    }

    fn load_array(&mut self, items: &[Value]) -> usize {
        let mut applied = 0;

        if let Some(value) = items.first() {
            match step_count(value) {
                Some(steps) => {
                    self.steps_required = steps;
                    applied += 1;
                }
                None => warn!("Construction stepsRequired is not a step count: {}", value),
            }
        }
        if let Some(value) = items.get(1) {
            match step_count(value) {
                Some(steps) => {
                    self.steps_completed = steps;
                    applied += 1;
                }
                None => warn!("Construction stepsCompleted is not a step count: {}", value),
            }
        }
        match items.get(2) {
            Some(Value::Bool(b)) => {
                self.is_complete = *b;
                applied += 1;
            }
            Some(other) => warn!("Construction isComplete has wrong type: {}", other),
            None => {}
        }

        applied
    }
}

// =============================================================================
// Component
// =============================================================================

/// A component attached to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Position(PositionComponent),
    Move(MoveComponent),
    Team(TeamComponent),
    Size(SizeComponent),
    Health(HealthComponent),
    Attack(AttackComponent),
    Construction(ConstructionComponent),
}

impl Component {
    /// Kind of this component.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Position(_) => ComponentKind::Position,
            Component::Move(_) => ComponentKind::Move,
            Component::Team(_) => ComponentKind::Team,
            Component::Size(_) => ComponentKind::Size,
            Component::Health(_) => ComponentKind::Health,
            Component::Attack(_) => ComponentKind::Attack,
            Component::Construction(_) => ComponentKind::Construction,
        }
    }

    /// Default-constructed component of a kind.
    pub fn default_for(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Position => Component::Position(PositionComponent::default()),
            ComponentKind::Move => Component::Move(MoveComponent::default()),
            ComponentKind::Team => Component::Team(TeamComponent::default()),
            ComponentKind::Size => Component::Size(SizeComponent::default()),
            ComponentKind::Health => Component::Health(HealthComponent::default()),
            ComponentKind::Attack => Component::Attack(AttackComponent::default()),
            ComponentKind::Construction => Component::Construction(ConstructionComponent::default()),
        }
    }

    /// Serialized form used in snapshots.
    pub fn save(&self) -> Value {
        match self {
            Component::Position(position) => json!({
                "tileX": position.tile_x,
                "tileY": position.tile_y,
            }),
            Component::Construction(construction) => construction.save(),
            other => other.fields(),
        }
    }

    /// Apply a partial JSON blob field by field.
    ///
    /// Unknown fields and mistyped values are warned about and skipped;
    /// the rest still apply. Returns the number of fields applied.
    pub fn load(&mut self, data: &Value) -> usize {
        if let (Component::Construction(construction), Value::Array(items)) = (&mut *self, data) {
            return construction.load_array(items);
        }

        let Value::Object(incoming) = data else {
            warn!("Component {} expects an object, got {}", self.kind(), data);
            return 0;
        };

        let kind = self.kind();
        let Value::Object(mut current) = self.fields() else {
            return 0;
        };

        let mut applied = 0;
        for (field, value) in incoming {
            let Some(previous) = current.get(field).cloned() else {
                warn!("Field {} does not exist on component {}", field, kind);
                continue;
            };

            current.insert(field.clone(), value.clone());
            match Self::from_fields(kind, &current) {
                Ok(updated) => {
                    *self = updated;
                    applied += 1;
                }
                Err(e) => {
                    warn!("Field {} on component {} rejected: {}", field, kind, e);
                    current.insert(field.clone(), previous);
                }
            }
        }

        applied
    }

    /// Every field as a JSON object.
    fn fields(&self) -> Value {
        let result = match self {
            Component::Position(c) => serde_json::to_value(c),
            Component::Move(c) => serde_json::to_value(c),
            Component::Team(c) => serde_json::to_value(c),
            Component::Size(c) => serde_json::to_value(c),
            Component::Health(c) => serde_json::to_value(c),
            Component::Attack(c) => serde_json::to_value(c),
            Component::Construction(c) => serde_json::to_value(c),
        };
        result.unwrap_or(Value::Null)
    }

    fn from_fields(kind: ComponentKind, fields: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value = Value::Object(fields.clone());
        Ok(match kind {
            ComponentKind::Position => Component::Position(serde_json::from_value(value)?),
            ComponentKind::Move => Component::Move(serde_json::from_value(value)?),
            ComponentKind::Team => Component::Team(serde_json::from_value(value)?),
            ComponentKind::Size => Component::Size(serde_json::from_value(value)?),
            ComponentKind::Health => Component::Health(serde_json::from_value(value)?),
            ComponentKind::Attack => Component::Attack(serde_json::from_value(value)?),
            ComponentKind::Construction => Component::Construction(serde_json::from_value(value)?),
        })
    }
}
