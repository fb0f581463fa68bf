//! Movement and Placement
//!
//! Occupancy writes on the grid, movement range computation and the
//! `MOVE` action handler.

use tracing::{debug, warn};

use crate::core::ids::{ClientId, EntityId};
use crate::game::action::{ActionHandler, ActionRequest};
use crate::game::context::MatchContext;
use crate::game::entity::{Entity, EntityStore};
use crate::game::grid::{GridError, Tile, TileGrid};
use crate::game::pathfind::{self, Frontier, PathStep};
use crate::game::team::{self, TeamTable};

// =============================================================================
// Placement
// =============================================================================

fn footprint(entity: &Entity) -> Option<(i32, i32, u32, u32)> {
    let position = entity.position()?;
    let (size_x, size_y) = entity
        .size()
        .map(|s| (s.size_x, s.size_y))
        .unwrap_or((1, 1));
    Some((position.tile_x, position.tile_y, size_x, size_y))
}

/// Write the entity onto every tile it covers.
pub fn place_entity(grid: &mut TileGrid, entity: &Entity) -> Result<(), GridError> {
    match footprint(entity) {
        Some((x, y, sx, sy)) => grid.set_pointers(x, y, sx, sy, entity.id()),
        None => Ok(()),
    }
}

/// Clear the entity from every tile it covers.
pub fn remove_entity(grid: &mut TileGrid, entity: &Entity) -> Result<(), GridError> {
    match footprint(entity) {
        Some((x, y, sx, sy)) => grid.remove_pointers(x, y, sx, sy, entity.id()),
        None => Ok(()),
    }
}

// =============================================================================
// Move System
// =============================================================================

pub fn begin_move(entity: &mut Entity, path: &[PathStep]) {
    if let Some(movement) = entity.movement_mut() {
        movement.path = path.to_vec();
    }
}

/// Snap to the target tile and clear the path.
pub fn end_move(entity: &mut Entity, target_x: i32, target_y: i32) {
    if let Some(position) = entity.position_mut() {
        position.tile_x = target_x;
        position.tile_y = target_y;
    }
    if let Some(movement) = entity.movement_mut() {
        movement.distance = 0.0;
        movement.path.clear();
    }
}

// =============================================================================
// Movement Range
// =============================================================================

/// Can the mover step from `previous` onto `next`.
fn can_traverse(
    mover: &Entity,
    entities: &EntityStore,
    teams: &TeamTable,
    allow_ally_passing: bool,
    next: &Tile,
    previous: &Tile,
) -> bool {
    let (Some(movement), Some(team)) = (mover.movement(), mover.team()) else {
        return false;
    };

    let Some(class) = &next.passability else {
        return false;
    };
    if !movement.passability.contains(class) {
        return false;
    }

    if !movement.is_stealth && !teams.lists_ally(&team.team_id, &previous.team) {
        return false;
    }

    let Some(occupant_id) = next.first_entity() else {
        return true;
    };
    let Some(occupant) = entities.get(occupant_id) else {
        warn!("Tile points at missing entity {}", occupant_id);
        return false;
    };
    let Some(occupant_team) = occupant.team() else {
        return false;
    };

    if teams.lists_enemy(&team.team_id, &occupant_team.team_id) {
        return movement.is_cloaked;
    }

    if teams.lists_ally(&team.team_id, &occupant_team.team_id) {
        let occupant_avian = occupant.movement().is_some_and(|m| m.is_avian);
        return movement.is_avian && occupant_avian && allow_ally_passing;
    }

    true
}

/// Tiles the entity could move to this turn.
///
/// Empty when the entity, its position/move/team components or the map are missing.
pub fn movement_frontier(context: &MatchContext, entity_id: &EntityId) -> Frontier {
    let (Some(grid), Some(mover)) = (&context.grid, context.entities.get(entity_id)) else {
        return Frontier::default();
    };
    let (Some(position), Some(movement)) = (mover.position(), mover.movement()) else {
        return Frontier::default();
    };

    pathfind::search(grid, position.tile_x, position.tile_y, movement.range, |next, previous| {
        can_traverse(
            mover,
            &context.entities,
            &context.teams,
            context.settings.allow_ally_passing,
            next,
            previous,
        )
    })
}

// =============================================================================
// Move Action
// =============================================================================

/// Handler for `MOVE` requests.
pub struct MoveAction;

impl ActionHandler<MatchContext> for MoveAction {
    fn validate(&self, context: &MatchContext, request: &mut ActionRequest, sender: &ClientId) -> bool {
        let ActionRequest::Move(request) = request;

        let Some(entity) = context.entities.get(&request.entity_id) else {
            debug!("Move rejected: entity {} does not exist", request.entity_id);
            return false;
        };
        if !team::is_controlled(entity, sender) {
            debug!("Move rejected: {} does not control {}", sender, request.entity_id);
            return false;
        }
        if !context.is_tile_empty(request.target_x, request.target_y) {
            debug!(
                "Move rejected: ({}, {}) is not free",
                request.target_x, request.target_y
            );
            return false;
        }

        let frontier = movement_frontier(context, &request.entity_id);
        match frontier.get_path(request.target_x, request.target_y) {
            Some(path) => {
                request.path = path;
                true
            }
            None => {
                debug!(
                    "Move rejected: ({}, {}) unreachable for {}",
                    request.target_x, request.target_y, request.entity_id
                );
                false
            }
        }
    }

    fn on_start(&self, context: &mut MatchContext, request: &ActionRequest) {
        let ActionRequest::Move(request) = request;
        let MatchContext { entities, grid, .. } = context;

        let Some(entity) = entities.get_mut(&request.entity_id) else {
            return;
        };
        begin_move(entity, &request.path);
        if let Some(grid) = grid {
            if let Err(e) = remove_entity(grid, entity) {
                warn!("Failed to lift entity {}: {}", request.entity_id, e);
            }
        }
    }

    fn on_end(&self, context: &mut MatchContext, request: &ActionRequest) {
        let ActionRequest::Move(request) = request;
        let MatchContext { entities, grid, .. } = context;

        let Some(entity) = entities.get_mut(&request.entity_id) else {
            return;
        };
        end_move(entity, request.target_x, request.target_y);
        if let Some(grid) = grid {
            if let Err(e) = place_entity(grid, entity) {
                warn!("Failed to place entity {}: {}", request.entity_id, e);
            }
        }
    }
}
