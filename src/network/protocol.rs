//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Transport-level messages are tagged JSON; room traffic travels inside
//! `{type, payload}` envelopes that the room interprets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{ClientId, RoomId};
use crate::game::action::ActionRequest;
use crate::game::factory::EntitySetup;
use crate::game::grid::MapData;

// =============================================================================
// ROOM ENVELOPES
// =============================================================================

/// Envelope `type` values of match traffic.
pub mod message_type {
    pub const START_INSTANCE: &str = "START_INSTANCE";
    pub const ENTITY_ACTION: &str = "ENTITY_ACTION";
    pub const INSTANCE_CONTROLLER: &str = "INSTANCE_CONTROLLER";
    pub const INSTANCE_MAP: &str = "INSTANCE_MAP";
    pub const INSTANCE_MAP_FROM_DATA: &str = "INSTANCE_MAP_FROM_DATA";
    pub const INSTANCE_ENTITY_BATCH: &str = "INSTANCE_ENTITY_BATCH";
    pub const INSTANCE_START_FAILED: &str = "INSTANCE_START_FAILED";
}

/// A room message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Build an envelope from a typed payload.
    pub fn encode<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Shape check for untrusted input: an object with a string `type` and a `payload`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let kind = object.get("type")?.as_str()?;
        let payload = object.get("payload")?;
        Some(Self::new(kind, payload.clone()))
    }

    /// Decode the payload.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// `START_INSTANCE` request from the leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartInstanceRequest {
    #[serde(rename = "mapID")]
    pub map_id: String,
}

/// `INSTANCE_CONTROLLER`: the team a member controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerAssignment {
    pub team: String,
    pub master: ClientId,
}

/// `INSTANCE_MAP` / `INSTANCE_MAP_FROM_DATA`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInstance {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MapData>,
}

/// `INSTANCE_MAP` reply from a client after materializing the map, and
/// `INSTANCE_START_FAILED` notice to the leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLoadResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// `INSTANCE_ENTITY_BATCH`: initial placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBatch {
    pub batch: Vec<EntitySetup>,
}

/// `ENTITY_ACTION` relay of a processed action.
pub fn entity_action(request: &ActionRequest) -> Result<Envelope, serde_json::Error> {
    Envelope::encode(message_type::ENTITY_ACTION, request)
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach a user name to the connection.
    Register { user_id: String },

    /// Open a room of a registered type and join it as leader.
    CreateRoom { room_type: String },

    /// Join an existing room.
    JoinRoom { room_id: RoomId },

    /// Leave the current room.
    LeaveRoom,

    /// Room traffic, `{type, payload}`; shape is checked by the directory.
    RoomMessage { message: Value },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Public room summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub members: Vec<String>,
    pub max_members: usize,
    pub leader: Option<ClientId>,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted.
    Welcome { client_id: ClientId },

    /// Registration acknowledged.
    Registered { user_id: String },

    /// Joined a room (created or existing).
    RoomJoined(RoomInfo),

    /// Left the current room.
    RoomLeft { room_id: RoomId },

    /// Membership of the current room changed.
    RoomUpdate(RoomInfo),

    /// Room traffic.
    RoomMessage { message: Envelope },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// No room with that id.
    RoomNotFound,
    /// Room is full or already contains the client.
    RoomNotJoinable,
    /// No room type with that name.
    UnknownRoomType,
    /// Already in a room.
    AlreadyInRoom,
    /// Not in a room.
    NotInRoom,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
