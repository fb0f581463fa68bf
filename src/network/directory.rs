//! Session Directory
//!
//! Registry of live rooms. Creates rooms from registered factories,
//! tracks membership and leadership changes, and relays each room's
//! outbound traffic onto one directory-level event bus that the
//! transport subscribes to.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::events::{BusEvent, SharedEventBus};
use crate::core::ids::{ClientId, IdSupply, RoomId};
use crate::network::protocol::{Envelope, RoomInfo};
use crate::network::session::{Session, SessionError, SessionEvent, SessionEventKind};

/// Subscriber name the directory uses on room buses.
const DIRECTORY_SUBSCRIBER: &str = "SESSION_DIRECTORY";

/// A room hosted by the directory.
pub trait Room: Send {
    fn session(&self) -> &Session;

    fn session_mut(&mut self) -> &mut Session;

    /// Handle a well-formed message from a member.
    fn process_message(&mut self, sender: &ClientId, message: Envelope);
}

/// Builds a fresh room of one type.
pub type RoomFactory = Box<dyn Fn() -> Box<dyn Room> + Send>;

/// Directory lifecycle and relay events.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    RoomOpened { room: RoomId },
    RoomClosed { room: RoomId },
    ClientJoined { room: RoomId, client: ClientId },
    ClientLeft { room: RoomId, client: ClientId },
    LeaderAppointed { room: RoomId, client: ClientId },
    MessageReceived { room: RoomId, sender: ClientId, message: Envelope },
    MessageLost { room: RoomId, sender: ClientId, message: Value },
    MessageSend { room: RoomId, client: ClientId, message: Envelope },
    MessageBroadcast { room: RoomId, message: Envelope },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirectoryEventKind {
    RoomOpened,
    RoomClosed,
    ClientJoined,
    ClientLeft,
    LeaderAppointed,
    MessageReceived,
    MessageLost,
    MessageSend,
    MessageBroadcast,
}

impl DirectoryEventKind {
    pub const ALL: [DirectoryEventKind; 9] = [
        DirectoryEventKind::RoomOpened,
        DirectoryEventKind::RoomClosed,
        DirectoryEventKind::ClientJoined,
        DirectoryEventKind::ClientLeft,
        DirectoryEventKind::LeaderAppointed,
        DirectoryEventKind::MessageReceived,
        DirectoryEventKind::MessageLost,
        DirectoryEventKind::MessageSend,
        DirectoryEventKind::MessageBroadcast,
    ];
}

impl BusEvent for DirectoryEvent {
    type Kind = DirectoryEventKind;

    fn kind(&self) -> DirectoryEventKind {
        match self {
            DirectoryEvent::RoomOpened { .. } => DirectoryEventKind::RoomOpened,
            DirectoryEvent::RoomClosed { .. } => DirectoryEventKind::RoomClosed,
            DirectoryEvent::ClientJoined { .. } => DirectoryEventKind::ClientJoined,
            DirectoryEvent::ClientLeft { .. } => DirectoryEventKind::ClientLeft,
            DirectoryEvent::LeaderAppointed { .. } => DirectoryEventKind::LeaderAppointed,
            DirectoryEvent::MessageReceived { .. } => DirectoryEventKind::MessageReceived,
            DirectoryEvent::MessageLost { .. } => DirectoryEventKind::MessageLost,
            DirectoryEvent::MessageSend { .. } => DirectoryEventKind::MessageSend,
            DirectoryEvent::MessageBroadcast { .. } => DirectoryEventKind::MessageBroadcast,
        }
    }
}

/// Registry of rooms.
pub struct SessionDirectory {
    room_types: BTreeMap<String, RoomFactory>,
    rooms: BTreeMap<RoomId, Box<dyn Room>>,
    ids: IdSupply,
    events: SharedEventBus<DirectoryEvent>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            room_types: BTreeMap::new(),
            rooms: BTreeMap::new(),
            ids: IdSupply::new(),
            events: SharedEventBus::with_channels(&DirectoryEventKind::ALL),
        }
    }

    /// Directory event bus.
    pub fn events(&self) -> SharedEventBus<DirectoryEvent> {
        self.events.clone()
    }

    /// Register a room type. Returns false if the name is taken.
    pub fn register_room_type(&mut self, room_type: impl Into<String>, factory: RoomFactory) -> bool {
        let room_type = room_type.into();
        if self.room_types.contains_key(&room_type) {
            warn!("Room type {} is already registered", room_type);
            return false;
        }
        self.room_types.insert(room_type, factory);
        true
    }

    pub fn room(&self, id: &RoomId) -> Option<&dyn Room> {
        self.rooms.get(id).map(|room| &**room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Instantiate a room and wire its outbound traffic to the directory bus.
    pub fn create_room(&mut self, room_type: &str) -> Result<RoomId, SessionError> {
        let factory = self
            .room_types
            .get(room_type)
            .ok_or_else(|| SessionError::UnknownRoomType(room_type.to_string()))?;

        let mut room = factory();
        let id = RoomId::new(self.ids.next_id());
        room.session_mut().set_id(id.clone());

        let outbound = room.session().outbound();
        let relay = self.events.clone();
        let room_id = id.clone();
        outbound.subscribe(SessionEventKind::Send, DIRECTORY_SUBSCRIBER, move |event| {
            if let SessionEvent::Send { message, client } = event {
                relay.emit(&DirectoryEvent::MessageSend {
                    room: room_id.clone(),
                    client: client.clone(),
                    message: message.clone(),
                });
            }
        });
        let relay = self.events.clone();
        let room_id = id.clone();
        outbound.subscribe(SessionEventKind::Broadcast, DIRECTORY_SUBSCRIBER, move |event| {
            if let SessionEvent::Broadcast { message } = event {
                relay.emit(&DirectoryEvent::MessageBroadcast {
                    room: room_id.clone(),
                    message: message.clone(),
                });
            }
        });

        self.rooms.insert(id.clone(), room);
        info!("Opened {} room {}", room_type, id);
        self.events.emit(&DirectoryEvent::RoomOpened { room: id.clone() });
        Ok(id)
    }

    /// Tear a room down.
    pub fn remove_room(&mut self, id: &RoomId) -> bool {
        let Some(room) = self.rooms.remove(id) else {
            return false;
        };

        let outbound = room.session().outbound();
        outbound.unsubscribe(SessionEventKind::Send, DIRECTORY_SUBSCRIBER);
        outbound.unsubscribe(SessionEventKind::Broadcast, DIRECTORY_SUBSCRIBER);

        info!("Closed room {}", id);
        self.events.emit(&DirectoryEvent::RoomClosed { room: id.clone() });

        if self.rooms.is_empty() {
            self.ids.reset();
        }
        true
    }

    pub fn is_room_joinable(&self, room: &RoomId, client: &ClientId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|r| r.session().is_joinable(client))
    }

    pub fn add_client_to_room(
        &mut self,
        client: &ClientId,
        name: &str,
        room_id: &RoomId,
    ) -> Result<(), SessionError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.clone()))?;
        room.session_mut().add_client(client.clone(), name)?;

        info!("Client {} joined room {}", client, room_id);
        self.events.emit(&DirectoryEvent::ClientJoined {
            room: room_id.clone(),
            client: client.clone(),
        });
        Ok(())
    }

    pub fn appoint_leader(&mut self, client: &ClientId, room_id: &RoomId) -> Result<(), SessionError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.clone()))?;
        room.session_mut().set_leader(client)?;

        info!("Client {} leads room {}", client, room_id);
        self.events.emit(&DirectoryEvent::LeaderAppointed {
            room: room_id.clone(),
            client: client.clone(),
        });
        Ok(())
    }

    /// Remove a member. Empty rooms close; a departed leader is replaced
    /// by the longest-standing remaining member.
    pub fn remove_client_from_room(&mut self, client: &ClientId, room_id: &RoomId) -> Result<(), SessionError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SessionError::RoomNotFound(room_id.clone()))?;
        let member = room
            .session_mut()
            .remove_client(client)
            .ok_or_else(|| SessionError::ClientNotInRoom(client.clone()))?;

        info!("Client {} left room {}", client, room_id);
        self.events.emit(&DirectoryEvent::ClientLeft {
            room: room_id.clone(),
            client: client.clone(),
        });

        if room.session().is_empty() {
            self.remove_room(room_id);
            return Ok(());
        }

        if member.is_leader {
            if let Some(successor) = room.session().next_client().cloned() {
                self.appoint_leader(&successor, room_id)?;
            }
        }
        Ok(())
    }

    /// Forward a member's message after checking its shape.
    ///
    /// The room handles the message before `MessageReceived` is emitted.
    /// Malformed or misdirected messages emit `MessageLost`.
    pub fn process_message(&mut self, room_id: &RoomId, sender: &ClientId, message: Value) -> bool {
        let envelope = Envelope::from_value(&message);
        let room = self
            .rooms
            .get_mut(room_id)
            .filter(|room| room.session().has_client(sender));

        let (Some(envelope), Some(room)) = (envelope, room) else {
            debug!("Lost message from {} to room {}", sender, room_id);
            self.events.emit(&DirectoryEvent::MessageLost {
                room: room_id.clone(),
                sender: sender.clone(),
                message,
            });
            return false;
        };

        room.process_message(sender, envelope.clone());
        self.events.emit(&DirectoryEvent::MessageReceived {
            room: room_id.clone(),
            sender: sender.clone(),
            message: envelope,
        });
        true
    }

    /// Public summary of a room.
    pub fn room_information(&self, room_id: &RoomId) -> Option<RoomInfo> {
        let session = self.rooms.get(room_id)?.session();
        Some(RoomInfo {
            id: room_id.clone(),
            members: session.members().iter().map(|m| m.name.clone()).collect(),
            max_members: session.max_clients(),
            leader: session.leader().cloned(),
        })
    }

    /// Members of a room, in join order.
    pub fn room_members(&self, room_id: &RoomId) -> Vec<ClientId> {
        self.rooms
            .get(room_id)
            .map(|room| room.session().client_ids().cloned().collect())
            .unwrap_or_default()
    }

    /// Close every room.
    pub fn on_end(&mut self) {
        let ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for id in ids {
            self.remove_room(&id);
        }
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Echoes every message back to its sender and broadcasts "SEEN".
    struct EchoRoom {
        session: Session,
    }

    impl Room for EchoRoom {
        fn session(&self) -> &Session {
            &self.session
        }

        fn session_mut(&mut self) -> &mut Session {
            &mut self.session
        }

        fn process_message(&mut self, sender: &ClientId, message: Envelope) {
            self.session.send_message(message, Some(sender));
            self.session.send_message(Envelope::new("SEEN", json!({})), None);
        }
    }

    fn directory() -> SessionDirectory {
        let mut directory = SessionDirectory::new();
        directory.register_room_type(
            "ECHO",
            Box::new(|| {
                Box::new(EchoRoom {
                    session: Session::new(3),
                }) as Box<dyn Room>
            }),
        );
        directory
    }

    fn record(directory: &SessionDirectory, kinds: &[DirectoryEventKind]) -> Arc<Mutex<Vec<DirectoryEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in kinds {
            let sink = log.clone();
            directory.events().subscribe(*kind, "test", move |event| {
                sink.lock().unwrap().push(event.clone());
            });
        }
        log
    }

    fn client(id: &str) -> ClientId {
        ClientId::new(id)
    }

    #[test]
    fn test_unknown_room_type() {
        let mut directory = directory();
        assert_eq!(
            directory.create_room("NOPE"),
            Err(SessionError::UnknownRoomType("NOPE".into()))
        );
        assert!(!directory.register_room_type(
            "ECHO",
            Box::new(|| Box::new(EchoRoom { session: Session::new(1) }) as Box<dyn Room>)
        ));
    }

    #[test]
    fn test_room_lifecycle_and_id_reset() {
        let mut directory = directory();
        let log = record(&directory, &[DirectoryEventKind::RoomOpened, DirectoryEventKind::RoomClosed]);

        let first = directory.create_room("ECHO").unwrap();
        let second = directory.create_room("ECHO").unwrap();
        assert_eq!((first.as_str(), second.as_str()), ("1", "2"));

        directory.add_client_to_room(&client("a"), "A", &first).unwrap();
        directory.remove_client_from_room(&client("a"), &first).unwrap();
        assert!(directory.room(&first).is_none());

        // Ids keep counting while a room is still open.
        assert_eq!(directory.create_room("ECHO").unwrap().as_str(), "3");

        directory.on_end();
        assert_eq!(directory.room_count(), 0);
        assert_eq!(directory.create_room("ECHO").unwrap().as_str(), "1");

        let events = log.lock().unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, DirectoryEvent::RoomClosed { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn test_leader_reappointed_on_leave() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        for id in ["a", "b", "c"] {
            directory.add_client_to_room(&client(id), id, &room).unwrap();
        }
        directory.appoint_leader(&client("a"), &room).unwrap();
        let log = record(&directory, &[DirectoryEventKind::LeaderAppointed]);

        directory.remove_client_from_room(&client("a"), &room).unwrap();

        let session = directory.room(&room).unwrap().session();
        assert_eq!(session.members().iter().filter(|m| m.is_leader).count(), 1);
        assert_eq!(session.leader(), Some(&client("b")));
        assert_eq!(
            *log.lock().unwrap(),
            vec![DirectoryEvent::LeaderAppointed {
                room: room.clone(),
                client: client("b")
            }]
        );
    }

    #[test]
    fn test_non_leader_leave_keeps_leader() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        for id in ["a", "b"] {
            directory.add_client_to_room(&client(id), id, &room).unwrap();
        }
        directory.appoint_leader(&client("a"), &room).unwrap();
        directory.remove_client_from_room(&client("b"), &room).unwrap();
        assert_eq!(directory.room(&room).unwrap().session().leader(), Some(&client("a")));
    }

    #[test]
    fn test_join_rules() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        directory.add_client_to_room(&client("a"), "A", &room).unwrap();

        assert!(!directory.is_room_joinable(&room, &client("a")));
        assert!(directory.is_room_joinable(&room, &client("b")));
        assert_eq!(
            directory.add_client_to_room(&client("a"), "A", &room),
            Err(SessionError::NotJoinable)
        );
        assert_eq!(
            directory.add_client_to_room(&client("a"), "A", &RoomId::new("9")),
            Err(SessionError::RoomNotFound(RoomId::new("9")))
        );
        assert_eq!(
            directory.remove_client_from_room(&client("z"), &room),
            Err(SessionError::ClientNotInRoom(client("z")))
        );
    }

    #[test]
    fn test_messages_relayed() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        directory.add_client_to_room(&client("a"), "A", &room).unwrap();
        let log = record(
            &directory,
            &[DirectoryEventKind::MessageSend, DirectoryEventKind::MessageBroadcast],
        );

        assert!(directory.process_message(&room, &client("a"), json!({ "type": "HI", "payload": 1 })));

        let events = log.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                DirectoryEvent::MessageSend {
                    room: room.clone(),
                    client: client("a"),
                    message: Envelope::new("HI", json!(1)),
                },
                DirectoryEvent::MessageBroadcast {
                    room: room.clone(),
                    message: Envelope::new("SEEN", json!({})),
                },
            ]
        );
    }

    #[test]
    fn test_room_replies_precede_received_event() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        directory.add_client_to_room(&client("a"), "A", &room).unwrap();
        let log = record(
            &directory,
            &[
                DirectoryEventKind::MessageReceived,
                DirectoryEventKind::MessageSend,
                DirectoryEventKind::MessageBroadcast,
            ],
        );

        assert!(directory.process_message(&room, &client("a"), json!({ "type": "HI", "payload": 1 })));

        let kinds: Vec<DirectoryEventKind> = log.lock().unwrap().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                DirectoryEventKind::MessageSend,
                DirectoryEventKind::MessageBroadcast,
                DirectoryEventKind::MessageReceived,
            ]
        );
    }

    #[test]
    fn test_malformed_or_misdirected_messages_lost() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        directory.add_client_to_room(&client("a"), "A", &room).unwrap();
        let log = record(&directory, &[DirectoryEventKind::MessageLost]);

        assert!(!directory.process_message(&room, &client("a"), json!({ "type": "HI" })));
        assert!(!directory.process_message(&room, &client("b"), json!({ "type": "HI", "payload": {} })));
        assert!(!directory.process_message(&RoomId::new("9"), &client("a"), json!({ "type": "HI", "payload": {} })));

        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_room_information() {
        let mut directory = directory();
        let room = directory.create_room("ECHO").unwrap();
        directory.add_client_to_room(&client("a"), "Alice", &room).unwrap();
        directory.appoint_leader(&client("a"), &room).unwrap();

        let info = directory.room_information(&room).unwrap();
        assert_eq!(info.members, vec!["Alice"]);
        assert_eq!(info.max_members, 3);
        assert_eq!(info.leader, Some(client("a")));
        assert!(directory.room_information(&RoomId::new("9")).is_none());
    }
}
