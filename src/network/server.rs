//! WebSocket Game Server
//!
//! Async WebSocket transport in front of the session directory.
//! Assigns client ids, routes room traffic, and delivers each room's
//! outbound messages to the member connections.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::ids::{ClientId, RoomId};
use crate::network::directory::{DirectoryEvent, DirectoryEventKind, SessionDirectory};
use crate::network::protocol::{ClientMessage, ErrorCode, RoomInfo, ServerError, ServerMessage};
use crate::network::session::SessionError;

/// Subscriber name the transport uses on the directory bus.
const SERVER_SUBSCRIBER: &str = "GAME_SERVER";

/// Outbound queue depth per connection.
const CLIENT_QUEUE_SIZE: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Directory holding the match resource files.
    pub resource_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            resource_dir: PathBuf::from("resources"),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SKIRMISH_BIND`, `SKIRMISH_MAX_CONNECTIONS`
    /// and `SKIRMISH_RESOURCES`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var("SKIRMISH_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!("Ignoring SKIRMISH_BIND={}: {}", bind, e),
            }
        }
        if let Ok(max) = std::env::var("SKIRMISH_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(max) => config.max_connections = max,
                Err(e) => warn!("Ignoring SKIRMISH_MAX_CONNECTIONS={}: {}", max, e),
            }
        }
        if let Ok(dir) = std::env::var("SKIRMISH_RESOURCES") {
            config.resource_dir = PathBuf::from(dir);
        }
        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Registered user name.
    user_id: Option<String>,
    /// Room the client is in.
    room_id: Option<RoomId>,
    /// Outbound queue drained by the connection's sender task.
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectedClient {
    fn new(sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            user_id: None,
            room_id: None,
            sender,
        }
    }

    fn deliver(&self, id: &ClientId, message: ServerMessage) {
        if let Err(e) = self.sender.try_send(message) {
            warn!("Dropping message for {}: {}", id, e);
        }
    }
}

/// Connected clients. Locked only briefly, never across an await, and
/// always after the directory when both are needed.
type ClientRegistry = Arc<StdMutex<BTreeMap<ClientId, ConnectedClient>>>;

type SharedDirectory = Arc<Mutex<SessionDirectory>>;

fn lock(clients: &ClientRegistry) -> MutexGuard<'_, BTreeMap<ClientId, ConnectedClient>> {
    clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wire error for a directory rejection.
fn session_error(e: &SessionError) -> ServerError {
    let code = match e {
        SessionError::RoomNotFound(_) => ErrorCode::RoomNotFound,
        SessionError::UnknownRoomType(_) => ErrorCode::UnknownRoomType,
        SessionError::NotJoinable => ErrorCode::RoomNotJoinable,
        SessionError::ClientNotInRoom(_) => ErrorCode::NotInRoom,
        SessionError::NotLeader(_) | SessionError::AlreadyStarted => ErrorCode::InternalError,
    };
    ServerError::new(code, e.to_string())
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Rooms.
    directory: SharedDirectory,
    /// Connected clients.
    clients: ClientRegistry,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over a directory with its room types registered.
    pub fn new(config: ServerConfig, directory: SessionDirectory) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let clients: ClientRegistry = Arc::new(StdMutex::new(BTreeMap::new()));

        let events = directory.events();

        let registry = clients.clone();
        events.subscribe(DirectoryEventKind::MessageSend, SERVER_SUBSCRIBER, move |event| {
            if let DirectoryEvent::MessageSend { client, message, .. } = event {
                match lock(&registry).get(client) {
                    Some(connected) => connected.deliver(
                        client,
                        ServerMessage::RoomMessage {
                            message: message.clone(),
                        },
                    ),
                    None => debug!("Client {} is gone, dropping {}", client, message.kind),
                }
            }
        });

        let registry = clients.clone();
        events.subscribe(DirectoryEventKind::MessageBroadcast, SERVER_SUBSCRIBER, move |event| {
            if let DirectoryEvent::MessageBroadcast { room, message } = event {
                let clients = lock(&registry);
                for (id, connected) in clients.iter().filter(|(_, c)| c.room_id.as_ref() == Some(room)) {
                    connected.deliver(
                        id,
                        ServerMessage::RoomMessage {
                            message: message.clone(),
                        },
                    );
                }
            }
        });

        events.subscribe(DirectoryEventKind::MessageLost, SERVER_SUBSCRIBER, |event| {
            if let DirectoryEvent::MessageLost { room, sender, message } = event {
                warn!("Lost message from {} to room {}: {}", sender, room, message);
            }
        });
        events.subscribe(DirectoryEventKind::RoomClosed, SERVER_SUBSCRIBER, |event| {
            if let DirectoryEvent::RoomClosed { room } = event {
                debug!("Room {} closed", room);
            }
        });

        Self {
            config,
            directory: Arc::new(Mutex::new(directory)),
            clients,
            shutdown_tx,
        }
    }

    /// Bind and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count() >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.directory.lock().await.on_end();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let directory = self.directory.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_QUEUE_SIZE);

            let client_id = ClientId::new(Uuid::new_v4().to_string());
            lock(&clients).insert(client_id.clone(), ConnectedClient::new(msg_tx.clone()));
            debug!("Client {} connected from {}", client_id, addr);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let _ = msg_tx
                .send(ServerMessage::Welcome {
                    client_id: client_id.clone(),
                })
                .await;

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", client_id, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    &client_id,
                                    client_msg,
                                    &clients,
                                    &directory,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", client_id);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", client_id, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            Self::disconnect(&client_id, &clients, &directory).await;
            info!("Client {} cleaned up", client_id);
        });
    }

    /// Drop a client and take it out of its room.
    async fn disconnect(client_id: &ClientId, clients: &ClientRegistry, directory: &SharedDirectory) {
        let room_id = lock(clients).get(client_id).and_then(|c| c.room_id.clone());

        if let Some(room_id) = room_id {
            let mut directory = directory.lock().await;
            if let Err(e) = directory.remove_client_from_room(client_id, &room_id) {
                warn!("Failed to remove {} from room {}: {}", client_id, room_id, e);
            }
            lock(clients).remove(client_id);
            if let Some(info) = directory.room_information(&room_id) {
                Self::notify_room(clients, &info);
            }
        } else {
            lock(clients).remove(client_id);
        }
    }

    /// Send `RoomUpdate` to every member of a room.
    fn notify_room(clients: &ClientRegistry, info: &RoomInfo) {
        let clients = lock(clients);
        for (id, connected) in clients.iter().filter(|(_, c)| c.room_id.as_ref() == Some(&info.id)) {
            connected.deliver(id, ServerMessage::RoomUpdate(info.clone()));
        }
    }

    /// Handle a client message.
    async fn handle_client_message(
        client_id: &ClientId,
        msg: ClientMessage,
        clients: &ClientRegistry,
        directory: &SharedDirectory,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let reply = match msg {
            ClientMessage::Register { user_id } => {
                if let Some(client) = lock(clients).get_mut(client_id) {
                    client.user_id = Some(user_id.clone());
                }
                info!("Client {} registered as {}", client_id, user_id);
                ServerMessage::Registered { user_id }
            }
            ClientMessage::CreateRoom { room_type } => {
                Self::handle_create_room(client_id, &room_type, clients, directory).await
            }
            ClientMessage::JoinRoom { room_id } => {
                Self::handle_join_room(client_id, &room_id, clients, directory).await
            }
            ClientMessage::LeaveRoom => Self::handle_leave_room(client_id, clients, directory).await,
            ClientMessage::RoomMessage { message } => {
                let room_id = lock(clients).get(client_id).and_then(|c| c.room_id.clone());
                let Some(room_id) = room_id else {
                    let _ = sender
                        .send(ServerMessage::Error(ServerError::new(
                            ErrorCode::NotInRoom,
                            "Not in a room",
                        )))
                        .await;
                    return;
                };
                directory.lock().await.process_message(&room_id, client_id, message);
                return;
            }
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: now_millis(),
            },
        };

        let _ = sender.send(reply).await;
    }

    fn room_of(client_id: &ClientId, clients: &ClientRegistry) -> Option<RoomId> {
        lock(clients).get(client_id).and_then(|c| c.room_id.clone())
    }

    fn display_name(client_id: &ClientId, clients: &ClientRegistry) -> String {
        lock(clients)
            .get(client_id)
            .and_then(|c| c.user_id.clone())
            .unwrap_or_else(|| client_id.to_string())
    }

    async fn handle_create_room(
        client_id: &ClientId,
        room_type: &str,
        clients: &ClientRegistry,
        directory: &SharedDirectory,
    ) -> ServerMessage {
        if Self::room_of(client_id, clients).is_some() {
            return ServerMessage::Error(ServerError::new(ErrorCode::AlreadyInRoom, "Already in a room"));
        }
        let name = Self::display_name(client_id, clients);

        let mut directory = directory.lock().await;
        let room_id = match directory.create_room(room_type) {
            Ok(room_id) => room_id,
            Err(e) => {
                warn!("Client {} could not create {} room: {}", client_id, room_type, e);
                return ServerMessage::Error(session_error(&e));
            }
        };

        let joined = directory
            .add_client_to_room(client_id, &name, &room_id)
            .and_then(|()| directory.appoint_leader(client_id, &room_id));
        if let Err(e) = joined {
            error!("Client {} could not enter new room {}: {}", client_id, room_id, e);
            directory.remove_room(&room_id);
            return ServerMessage::Error(session_error(&e));
        }

        if let Some(client) = lock(clients).get_mut(client_id) {
            client.room_id = Some(room_id.clone());
        }
        match directory.room_information(&room_id) {
            Some(info) => ServerMessage::RoomJoined(info),
            None => ServerMessage::Error(ServerError::new(ErrorCode::InternalError, "Room vanished")),
        }
    }

    async fn handle_join_room(
        client_id: &ClientId,
        room_id: &RoomId,
        clients: &ClientRegistry,
        directory: &SharedDirectory,
    ) -> ServerMessage {
        if Self::room_of(client_id, clients).is_some() {
            return ServerMessage::Error(ServerError::new(ErrorCode::AlreadyInRoom, "Already in a room"));
        }
        let name = Self::display_name(client_id, clients);

        let mut directory = directory.lock().await;
        if let Err(e) = directory.add_client_to_room(client_id, &name, room_id) {
            debug!("Client {} could not join room {}: {}", client_id, room_id, e);
            return ServerMessage::Error(session_error(&e));
        }

        // Existing members only; the joiner gets RoomJoined instead.
        let info = directory.room_information(room_id);
        if let Some(info) = &info {
            Self::notify_room(clients, info);
        }
        if let Some(client) = lock(clients).get_mut(client_id) {
            client.room_id = Some(room_id.clone());
        }

        match info {
            Some(info) => ServerMessage::RoomJoined(info),
            None => ServerMessage::Error(ServerError::new(ErrorCode::InternalError, "Room vanished")),
        }
    }

    async fn handle_leave_room(
        client_id: &ClientId,
        clients: &ClientRegistry,
        directory: &SharedDirectory,
    ) -> ServerMessage {
        let Some(room_id) = Self::room_of(client_id, clients) else {
            return ServerMessage::Error(ServerError::new(ErrorCode::NotInRoom, "Not in a room"));
        };

        let mut directory = directory.lock().await;
        if let Err(e) = directory.remove_client_from_room(client_id, &room_id) {
            warn!("Failed to remove {} from room {}: {}", client_id, room_id, e);
        }
        if let Some(client) = lock(clients).get_mut(client_id) {
            client.room_id = None;
        }
        if let Some(info) = directory.room_information(&room_id) {
            Self::notify_room(clients, &info);
        }

        ServerMessage::RoomLeft { room_id }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Get open room count.
    pub async fn room_count(&self) -> usize {
        self.directory.lock().await.room_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::directory::Room;
    use crate::network::protocol::Envelope;
    use crate::network::session::Session;
    use serde_json::json;

    /// Broadcasts every message it receives.
    struct RelayRoom {
        session: Session,
    }

    impl Room for RelayRoom {
        fn session(&self) -> &Session {
            &self.session
        }

        fn session_mut(&mut self) -> &mut Session {
            &mut self.session
        }

        fn process_message(&mut self, _sender: &ClientId, message: Envelope) {
            self.session.send_message(message, None);
        }
    }

    fn server() -> GameServer {
        let mut directory = SessionDirectory::new();
        directory.register_room_type(
            "RELAY",
            Box::new(|| {
                Box::new(RelayRoom {
                    session: Session::new(2),
                }) as Box<dyn Room>
            }),
        );
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        GameServer::new(config, directory)
    }

    fn connect(server: &GameServer, id: &str) -> (ClientId, mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_SIZE);
        let id = ClientId::new(id);
        lock(&server.clients).insert(id.clone(), ConnectedClient::new(tx.clone()));
        (id, tx, rx)
    }

    async fn send(server: &GameServer, id: &ClientId, tx: &mpsc::Sender<ServerMessage>, msg: ClientMessage) {
        GameServer::handle_client_message(id, msg, &server.clients, &server.directory, tx).await;
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.resource_dir, PathBuf::from("resources"));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server();
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_join_and_relay() {
        let server = server();
        let (a, a_tx, mut a_rx) = connect(&server, "a");
        let (b, b_tx, mut b_rx) = connect(&server, "b");

        send(&server, &a, &a_tx, ClientMessage::Register { user_id: "alice".into() }).await;
        assert!(matches!(a_rx.recv().await, Some(ServerMessage::Registered { .. })));

        send(&server, &a, &a_tx, ClientMessage::CreateRoom { room_type: "RELAY".into() }).await;
        let Some(ServerMessage::RoomJoined(info)) = a_rx.recv().await else {
            panic!("Expected room_joined");
        };
        assert_eq!(info.members, vec!["alice"]);
        assert_eq!(info.leader, Some(a.clone()));

        send(&server, &b, &b_tx, ClientMessage::JoinRoom { room_id: info.id.clone() }).await;
        assert!(matches!(b_rx.recv().await, Some(ServerMessage::RoomJoined(_))));
        let Some(ServerMessage::RoomUpdate(update)) = a_rx.recv().await else {
            panic!("Expected room_update");
        };
        assert_eq!(update.members, vec!["alice".to_string(), "b".to_string()]);

        let message = json!({ "type": "HELLO", "payload": { "n": 1 } });
        send(&server, &b, &b_tx, ClientMessage::RoomMessage { message }).await;
        for rx in [&mut a_rx, &mut b_rx] {
            let Some(ServerMessage::RoomMessage { message }) = rx.recv().await else {
                panic!("Expected room_message");
            };
            assert_eq!(message.kind, "HELLO");
        }
    }

    #[tokio::test]
    async fn test_room_errors() {
        let server = server();
        let (a, a_tx, mut a_rx) = connect(&server, "a");

        send(&server, &a, &a_tx, ClientMessage::CreateRoom { room_type: "CHESS".into() }).await;
        let Some(ServerMessage::Error(err)) = a_rx.recv().await else {
            panic!("Expected error");
        };
        assert_eq!(err.code, ErrorCode::UnknownRoomType);

        send(&server, &a, &a_tx, ClientMessage::JoinRoom { room_id: RoomId::new("9") }).await;
        let Some(ServerMessage::Error(err)) = a_rx.recv().await else {
            panic!("Expected error");
        };
        assert_eq!(err.code, ErrorCode::RoomNotFound);

        send(&server, &a, &a_tx, ClientMessage::LeaveRoom).await;
        let Some(ServerMessage::Error(err)) = a_rx.recv().await else {
            panic!("Expected error");
        };
        assert_eq!(err.code, ErrorCode::NotInRoom);
    }

    #[tokio::test]
    async fn test_leave_passes_leadership_and_disconnect_closes_room() {
        let server = server();
        let (a, a_tx, mut a_rx) = connect(&server, "a");
        let (b, b_tx, mut b_rx) = connect(&server, "b");

        send(&server, &a, &a_tx, ClientMessage::CreateRoom { room_type: "RELAY".into() }).await;
        let Some(ServerMessage::RoomJoined(info)) = a_rx.recv().await else {
            panic!("Expected room_joined");
        };
        send(&server, &b, &b_tx, ClientMessage::JoinRoom { room_id: info.id.clone() }).await;
        b_rx.recv().await;
        a_rx.recv().await;

        send(&server, &a, &a_tx, ClientMessage::LeaveRoom).await;
        assert!(matches!(a_rx.recv().await, Some(ServerMessage::RoomLeft { .. })));
        let Some(ServerMessage::RoomUpdate(update)) = b_rx.recv().await else {
            panic!("Expected room_update");
        };
        assert_eq!(update.leader, Some(b.clone()));

        GameServer::disconnect(&b, &server.clients, &server.directory).await;
        assert_eq!(server.room_count().await, 0);
        assert_eq!(server.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_ping() {
        let server = server();
        let (a, a_tx, mut a_rx) = connect(&server, "a");
        send(&server, &a, &a_tx, ClientMessage::Ping { timestamp: 42 }).await;
        let Some(ServerMessage::Pong { timestamp, server_time }) = a_rx.recv().await else {
            panic!("Expected pong");
        };
        assert_eq!(timestamp, 42);
        assert!(server_time > 0);
    }

    #[tokio::test]
    async fn test_websocket_welcome() {
        let server = Arc::new(server());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("Expected welcome");
        };
        assert!(matches!(
            ServerMessage::from_json(&text).unwrap(),
            ServerMessage::Welcome { .. }
        ));

        let ping = ClientMessage::Ping { timestamp: 7 }.to_json().unwrap();
        ws.send(Message::Text(ping)).await.unwrap();
        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("Expected pong");
        };
        assert!(matches!(
            ServerMessage::from_json(&text).unwrap(),
            ServerMessage::Pong { timestamp: 7, .. }
        ));

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = server();
        server.shutdown();
        // Should not panic
    }
}
