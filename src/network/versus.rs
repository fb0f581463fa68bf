//! Versus Match Room
//!
//! Two-player match: start handshake (team assignment, map load with
//! compact-then-full fallback, starting units), then relay of validated
//! entity actions through the action pipeline.
//!
//! ```text
//! Lobby --START_INSTANCE (leader, room full)--> Starting --all INSTANCE_MAP acks--> Active
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::core::ids::{ClientId, EntityId};
use crate::game::action::{
    ActionError, ActionEvent, ActionEventKind, ActionKind, ActionPipeline, ActionRequest,
};
use crate::game::component::ComponentKind;
use crate::game::context::MatchContext;
use crate::game::entity::EntityStore;
use crate::game::factory::{self, EntitySetup};
use crate::game::grid::{GridError, MapData, Tile, TileGrid};
use crate::game::movement::{self, MoveAction};
use crate::game::resources::{
    DirectoryMapSource, MapSource, MatchResources, ResourceError, TileType,
};
use crate::game::team::TeamTable;
use crate::network::directory::{Room, RoomFactory};
use crate::network::protocol::{
    self, message_type, ControllerAssignment, EntityBatch, Envelope, MapInstance, MapLoadResult,
    StartInstanceRequest,
};
use crate::network::session::{Session, SessionError, SessionEvent};

/// Registered room type name.
pub const VERSUS_ROOM: &str = "VERSUS";

const VERSUS_SUBSCRIBER: &str = "VERSUS_ROOM";

/// Component kinds placement data may overwrite.
const LOADABLE_COMPONENTS: [ComponentKind; 4] = [
    ComponentKind::Health,
    ComponentKind::Attack,
    ComponentKind::Construction,
    ComponentKind::Move,
];

/// Component kinds written to snapshots.
const SAVEABLE_COMPONENTS: [ComponentKind; 2] = [ComponentKind::Health, ComponentKind::Construction];

/// Match errors.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Room is not full")]
    NotFull,

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("Client {0} controls no team")]
    NoController(ClientId),

    #[error("No map handshake is pending")]
    NoPendingMap,
}

/// Match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Lobby,
    Starting,
    Active,
}

#[derive(Debug, Clone)]
struct Controller {
    team: String,
    map_loaded: bool,
}

/// Transient start state, dropped once every member has the map.
#[derive(Debug, Clone)]
struct Handshake {
    map_id: String,
    entity_batch: Vec<EntitySetup>,
    team_decider: usize,
}

/// A versus match.
pub struct MatchOrchestrator {
    session: Session,
    context: MatchContext,
    pipeline: ActionPipeline<MatchContext>,
    maps: Box<dyn MapSource>,
    tile_types: BTreeMap<String, TileType>,
    controllers: BTreeMap<ClientId, Controller>,
    handshake: Option<Handshake>,
    phase: MatchPhase,
}

impl MatchOrchestrator {
    pub fn new(resources: &MatchResources, maps: Box<dyn MapSource>) -> Self {
        let settings = resources.settings.clone();

        let mut entities = EntityStore::new();
        entities.load_entity_types(resources.entities.clone());
        entities.load_trait_types(resources.traits.clone());
        entities.set_loadable_components(LOADABLE_COMPONENTS);
        entities.set_saveable_components(SAVEABLE_COMPONENTS);

        let session = Session::new(settings.max_clients);

        let mut pipeline = ActionPipeline::new(settings.action_queue_size);
        if let Err(e) = pipeline.register_action(ActionKind::Move, Box::new(MoveAction)) {
            error!("Failed to register move action: {}", e);
        }

        let outbound = session.outbound();
        pipeline
            .events_mut()
            .subscribe(ActionEventKind::Process, VERSUS_SUBSCRIBER, move |event| {
                if let ActionEvent::Process { request } = event {
                    match protocol::entity_action(request) {
                        Ok(message) => {
                            outbound.emit(&SessionEvent::Broadcast { message });
                        }
                        Err(e) => error!("Failed to encode entity action: {}", e),
                    }
                }
            });
        pipeline
            .events_mut()
            .subscribe(ActionEventKind::Invalid, VERSUS_SUBSCRIBER, |event| {
                if let ActionEvent::Invalid { request, sender } = event {
                    debug!(
                        "Rejected {:?} on entity {} from {}",
                        request.kind(),
                        request.entity_id(),
                        sender
                    );
                }
            });

        let teams = TeamTable::new(resources.team_types.clone());

        Self {
            session,
            context: MatchContext::new(entities, teams, settings),
            pipeline,
            maps,
            tile_types: resources.tile_types.clone(),
            controllers: BTreeMap::new(),
            handshake: None,
            phase: MatchPhase::Lobby,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn context(&self) -> &MatchContext {
        &self.context
    }

    pub fn pipeline(&self) -> &ActionPipeline<MatchContext> {
        &self.pipeline
    }

    /// Team a member controls.
    pub fn controller_team(&self, client: &ClientId) -> Option<&str> {
        self.controllers.get(client).map(|c| c.team.as_str())
    }

    /// Saved form of one entity.
    pub fn save_entity(&self, id: &EntityId) -> Option<EntitySetup> {
        factory::save_entity(&self.context.entities, id)
    }

    /// Saved form of every entity, for an external save mechanism.
    pub fn snapshot(&self) -> Vec<EntitySetup> {
        self.context
            .entities
            .iter()
            .filter_map(|entity| self.save_entity(entity.id()))
            .collect()
    }

    // =========================================================================
    // Start Handshake
    // =========================================================================

    /// Begin the match. Leader only, room full, once.
    pub fn start_instance(&mut self, sender: &ClientId, map_id: &str) -> Result<(), MatchError> {
        if !self.session.is_full() {
            return Err(MatchError::NotFull);
        }
        if !self.session.is_leader(sender) {
            return Err(SessionError::NotLeader(sender.clone()).into());
        }
        self.session.start()?;
        self.phase = MatchPhase::Starting;

        self.session
            .send_message(Envelope::new(message_type::START_INSTANCE, json!({})), None);

        let members: Vec<ClientId> = self.session.client_ids().cloned().collect();
        let mut team_decider = 0;
        for member in &members {
            let team = if team_decider % 2 == 0 { "1" } else { "0" };
            self.controllers.insert(
                member.clone(),
                Controller {
                    team: team.to_string(),
                    map_loaded: false,
                },
            );

            let assignment = ControllerAssignment {
                team: team.to_string(),
                master: member.clone(),
            };
            self.session.send_message(
                Envelope::encode(message_type::INSTANCE_CONTROLLER, &assignment)?,
                Some(member),
            );
            team_decider += 1;
        }

        let map_ready = self
            .maps
            .load_map_data(map_id)
            .map_err(MatchError::from)
            .and_then(|data| self.initialize_map(map_id, &data));
        if let Err(e) = map_ready {
            error!("Match on map {} failed to start: {}", map_id, e);
            let notice = MapLoadResult {
                success: false,
                error: Some(e.to_string()),
            };
            self.session.send_message(
                Envelope::encode(message_type::INSTANCE_START_FAILED, &notice)?,
                Some(sender),
            );
            return Err(e);
        }

        let mut entity_batch = Vec::new();
        for unit in self.context.settings.starting_units.clone() {
            let Some(master) = members.get(unit.slot) else {
                warn!("Starting unit {} has no member in slot {}", unit.type_id, unit.slot);
                continue;
            };
            let team = self.controllers.get(master).map(|c| c.team.clone()).unwrap_or_default();

            let mut setup = EntitySetup {
                id: None,
                type_id: unit.type_id.clone(),
                tile_x: unit.tile_x,
                tile_y: unit.tile_y,
                team,
                master: master.to_string(),
                components: BTreeMap::new(),
            };
            if let Some(id) = self.initialize_entity(&setup) {
                setup.id = Some(id);
                entity_batch.push(setup);
            }
        }

        self.handshake = Some(Handshake {
            map_id: map_id.to_string(),
            entity_batch,
            team_decider,
        });

        let compact = MapInstance {
            id: map_id.to_string(),
            data: None,
        };
        self.session
            .send_message(Envelope::encode(message_type::INSTANCE_MAP, &compact)?, None);

        info!("Match starting on map {} with {} members", map_id, members.len());
        Ok(())
    }

    /// Build the grid and its tile metadata, then open the action pipeline.
    fn initialize_map(&mut self, map_id: &str, data: &MapData) -> Result<(), MatchError> {
        let mut grid = TileGrid::from_map_data(map_id, data)?;
        let team_layer = self.context.settings.team_layer.clone();
        let type_layer = self.context.settings.type_layer.clone();

        for layer in [&team_layer, &type_layer] {
            if grid.layer(layer).is_none() {
                warn!("Map {} has no {} layer", map_id, layer);
                grid.add_meta_layer(layer.clone());
            }
        }

        let tile_types = &self.tile_types;
        grid.init_tiles(|grid, x, y| {
            let mut tile = Tile::default();
            tile.team = grid.layer_value(&team_layer, x, y).unwrap_or(0).to_string();

            let kind = grid.layer_value(&type_layer, x, y).unwrap_or(0).to_string();
            if let Some(tile_type) = tile_types.get(&kind) {
                tile.passability = tile_type.passability.clone();
                tile.auto_capture = tile_type.auto_capture;
                tile.has_border = tile_type.has_border;
            }
            tile
        });

        self.context.grid = Some(grid);
        self.pipeline.work_start();
        Ok(())
    }

    /// Build, place and enable an entity.
    fn initialize_entity(&mut self, setup: &EntitySetup) -> Option<EntityId> {
        let stat_mode = self.context.settings.stat_mode.clone();
        let id = factory::build_entity(&mut self.context.entities, setup, &stat_mode)?;

        let MatchContext { entities, grid, .. } = &mut self.context;
        if let (Some(grid), Some(entity)) = (grid.as_mut(), entities.get(&id)) {
            if let Err(e) = movement::place_entity(grid, entity) {
                warn!("Failed to place entity {}: {}", id, e);
            }
        }
        entities.enable(&id);
        Some(id)
    }

    /// A member reports the outcome of materializing the map.
    pub fn map_instance_attempt(&mut self, sender: &ClientId, result: MapLoadResult) -> Result<(), MatchError> {
        let handshake = self.handshake.as_ref().ok_or(MatchError::NoPendingMap)?;

        if !result.success {
            error!(
                "Client {} failed to load map {}: {}; resending full map",
                sender,
                handshake.map_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
            let full = MapInstance {
                id: handshake.map_id.clone(),
                data: Some(self.maps.load_map_data(&handshake.map_id)?),
            };
            self.session.send_message(
                Envelope::encode(message_type::INSTANCE_MAP_FROM_DATA, &full)?,
                Some(sender),
            );
            return Ok(());
        }

        let controller = self
            .controllers
            .get_mut(sender)
            .ok_or_else(|| MatchError::NoController(sender.clone()))?;

        let batch = EntityBatch {
            batch: handshake.entity_batch.clone(),
        };
        self.session.send_message(
            Envelope::encode(message_type::INSTANCE_ENTITY_BATCH, &batch)?,
            Some(sender),
        );
        controller.map_loaded = true;
        debug!("Client {} loaded map {}", sender, handshake.map_id);

        if self.controllers.values().all(|c| c.map_loaded) {
            if let Some(done) = self.handshake.take() {
                debug!("Handshake complete after {} assignments", done.team_decider);
            }
            self.phase = MatchPhase::Active;
            info!("Match active with {} members", self.controllers.len());
        }
        Ok(())
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Validate, queue and execute a member's action request.
    pub fn entity_action(&mut self, sender: &ClientId, mut request: ActionRequest) -> Result<(), MatchError> {
        if !self.pipeline.is_running() {
            return Err(ActionError::NotRunning.into());
        }

        self.pipeline.process_request(sender, &mut request, &self.context)?;
        self.pipeline.queue_action(request)?;
        self.pipeline.update(&mut self.context);
        Ok(())
    }

    fn dispatch(&mut self, sender: &ClientId, message: &Envelope) -> Result<(), MatchError> {
        match message.kind.as_str() {
            message_type::START_INSTANCE => {
                let request: StartInstanceRequest = message.decode()?;
                self.start_instance(sender, &request.map_id)
            }
            message_type::ENTITY_ACTION => {
                let request: ActionRequest = message.decode()?;
                self.entity_action(sender, request)
            }
            message_type::INSTANCE_MAP => {
                let result: MapLoadResult = message.decode()?;
                self.map_instance_attempt(sender, result)
            }
            other => {
                warn!("Message type {} is unknown", other);
                Ok(())
            }
        }
    }
}

impl Room for MatchOrchestrator {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn process_message(&mut self, sender: &ClientId, message: Envelope) {
        if let Err(e) = self.dispatch(sender, &message) {
            warn!("{} from {} ignored: {}", message.kind, sender, e);
        }
    }
}

/// Factory for versus rooms reading maps from `map_root`.
pub fn versus_factory(resources: Arc<MatchResources>, map_root: PathBuf) -> RoomFactory {
    Box::new(move || {
        let maps = DirectoryMapSource::new(
            map_root.clone(),
            resources.maps.clone(),
            resources.settings.map_cache_enabled,
        );
        Box::new(MatchOrchestrator::new(&resources, Box::new(maps))) as Box<dyn Room>
    })
}
