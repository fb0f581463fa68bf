//! Room Sessions
//!
//! Membership, leadership and outbound message relay shared by every
//! room type. A session never touches sockets: outbound traffic is
//! emitted on its event bus and relayed by the directory.

use tracing::debug;

use crate::core::events::{BusEvent, SharedEventBus};
use crate::core::ids::{ClientId, RoomId};
use crate::network::protocol::Envelope;

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Room does not exist.
    #[error("Room {0} not found")]
    RoomNotFound(RoomId),

    /// Room type was never registered.
    #[error("Room type {0} is not registered")]
    UnknownRoomType(String),

    /// Room is full or already contains the client.
    #[error("Room is not joinable")]
    NotJoinable,

    /// Client is not a member.
    #[error("Client {0} is not in the room")]
    ClientNotInRoom(ClientId),

    /// Only the leader may do this.
    #[error("Client {0} is not the leader")]
    NotLeader(ClientId),

    /// Session already started.
    #[error("Session already started")]
    AlreadyStarted,
}

/// Outbound session traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Deliver to one member.
    Send { message: Envelope, client: ClientId },
    /// Deliver to every member.
    Broadcast { message: Envelope },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionEventKind {
    Send,
    Broadcast,
}

impl BusEvent for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::Send { .. } => SessionEventKind::Send,
            SessionEvent::Broadcast { .. } => SessionEventKind::Broadcast,
        }
    }
}

/// A member of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMember {
    pub id: ClientId,
    /// Display name.
    pub name: String,
    pub is_leader: bool,
}

/// Bounded group of clients in one room.
pub struct Session {
    id: Option<RoomId>,
    /// Join order.
    members: Vec<SessionMember>,
    max_clients: usize,
    started: bool,
    outbound: SharedEventBus<SessionEvent>,
}

impl Session {
    pub fn new(max_clients: usize) -> Self {
        Self {
            id: None,
            members: Vec::new(),
            max_clients,
            started: false,
            outbound: SharedEventBus::with_channels(&[SessionEventKind::Send, SessionEventKind::Broadcast]),
        }
    }

    pub fn id(&self) -> Option<&RoomId> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: RoomId) {
        self.id = Some(id);
    }

    /// Outbound bus handle.
    pub fn outbound(&self) -> SharedEventBus<SessionEvent> {
        self.outbound.clone()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn set_max_clients(&mut self, max_clients: usize) {
        self.max_clients = max_clients;
    }

    pub fn members(&self) -> &[SessionMember] {
        &self.members
    }

    pub fn client_ids(&self) -> impl Iterator<Item = &ClientId> {
        self.members.iter().map(|m| &m.id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_clients
    }

    pub fn has_client(&self, client: &ClientId) -> bool {
        self.members.iter().any(|m| &m.id == client)
    }

    /// Not full and the client is not already a member.
    pub fn is_joinable(&self, client: &ClientId) -> bool {
        !self.is_full() && !self.has_client(client)
    }

    pub fn add_client(&mut self, client: ClientId, name: impl Into<String>) -> Result<(), SessionError> {
        if !self.is_joinable(&client) {
            return Err(SessionError::NotJoinable);
        }
        self.members.push(SessionMember {
            id: client,
            name: name.into(),
            is_leader: false,
        });
        Ok(())
    }

    /// Remove a member. A removed leader leaves the session leaderless.
    pub fn remove_client(&mut self, client: &ClientId) -> Option<SessionMember> {
        let index = self.members.iter().position(|m| &m.id == client)?;
        Some(self.members.remove(index))
    }

    /// Make a member the only leader.
    pub fn set_leader(&mut self, client: &ClientId) -> Result<(), SessionError> {
        if !self.has_client(client) {
            return Err(SessionError::ClientNotInRoom(client.clone()));
        }
        for member in &mut self.members {
            member.is_leader = &member.id == client;
        }
        Ok(())
    }

    pub fn leader(&self) -> Option<&ClientId> {
        self.members.iter().find(|m| m.is_leader).map(|m| &m.id)
    }

    pub fn has_leader(&self) -> bool {
        self.leader().is_some()
    }

    pub fn is_leader(&self, client: &ClientId) -> bool {
        self.leader() == Some(client)
    }

    /// Longest-standing member; successor when the leader leaves.
    pub fn next_client(&self) -> Option<&ClientId> {
        self.members.first().map(|m| &m.id)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// One-way start latch.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }
        self.started = true;
        Ok(())
    }

    /// Send to one member. Broadcasts when `client` is `None` or not a member.
    pub fn send_message(&self, message: Envelope, client: Option<&ClientId>) -> bool {
        match client {
            Some(client) if self.has_client(client) => self.outbound.emit(&SessionEvent::Send {
                message,
                client: client.clone(),
            }),
            Some(client) => {
                debug!("{} is not a member, broadcasting {}", client, message.kind);
                self.outbound.emit(&SessionEvent::Broadcast { message })
            }
            None => self.outbound.emit(&SessionEvent::Broadcast { message }),
        }
    }
}
