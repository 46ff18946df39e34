//! Async document rooms: one [`EditorServer`] per document, shared by any
//! number of connections.
//!
//! ```text
//!  connection ──frame──► DocumentRoom::handle_frame
//!                           │  decode (malformed frames stop here)
//!                           ▼
//!                   Mutex<EditorServer>  ── one message at a time
//!                           │  envelopes, encoded once
//!                           ▼
//!                     BroadcastGroup ──► RoomConnection::recv (filters by recipient)
//! ```
//!
//! Envelopes are published while the session lock is held, so every
//! connection observes frames in the order the server produced them.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::broadcast::{AtomicBroadcastStats, BroadcastGroup, BroadcastStats, Frame, PeerInfo};
use crate::error::{CollabError, Result};
use crate::protocol::{ClientId, ClientMessage, Revision};
use crate::server::{EditorServer, Envelope, Server, ServerConfig};

/// Snapshot of a room's health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub revision: Revision,
    pub participants: usize,
    pub broadcast: BroadcastStats,
}

#[derive(Debug)]
pub struct DocumentRoom {
    doc_id: Uuid,
    session: Mutex<EditorServer>,
    group: BroadcastGroup,
    max_peers: usize,
}

impl DocumentRoom {
    /// A room around a fresh document.
    pub fn new(doc_id: Uuid, document: impl Into<String>, config: &ServerConfig) -> Self {
        Self::with_session(EditorServer::new(doc_id, Server::new(document)), config)
    }

    /// A room around an existing session (restored history, custom
    /// permissions).
    pub fn with_session(session: EditorServer, config: &ServerConfig) -> Self {
        Self {
            doc_id: session.doc_id(),
            session: Mutex::new(session),
            group: BroadcastGroup::new(config.broadcast_capacity),
            max_peers: config.max_peers_per_room,
        }
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    /// Join the room. The returned connection's first frame is the `doc`
    /// handshake.
    pub async fn connect(&self, name: Option<&str>) -> Result<RoomConnection> {
        let mut session = self.session.lock().await;
        if self.group.peer_count().await >= self.max_peers {
            warn!("document {} is full, refusing connection", self.doc_id);
            return Err(CollabError::RoomFull {
                capacity: self.max_peers,
            });
        }

        let peer_id = Uuid::new_v4();
        let id: ClientId = peer_id.to_string();
        let receiver = self
            .group
            .add_peer(PeerInfo {
                peer_id,
                name: name.unwrap_or(&id).to_string(),
            })
            .await;

        let mut envelopes = session.add_client(id.clone());
        if let Some(name) = name {
            envelopes.extend(session.handle_message(&id, ClientMessage::SetName(name.to_string()))?);
        }
        self.publish(envelopes)?;

        Ok(RoomConnection {
            id,
            peer_id,
            receiver,
            stats: self.group.stats_handle(),
            lagged: None,
        })
    }

    /// Decode and handle one inbound text frame.
    pub async fn handle_frame(&self, id: &str, frame: &str) -> Result<()> {
        let message = ClientMessage::decode(frame).map_err(|err| {
            warn!("rejected frame from {id}: {err}");
            err
        })?;
        self.handle_message(id, message).await
    }

    /// Handle one inbound message. Rejections are logged and returned; the
    /// room and the connection stay usable.
    pub async fn handle_message(&self, id: &str, message: ClientMessage) -> Result<()> {
        let disconnect = matches!(message, ClientMessage::Disconnect);
        let mut session = self.session.lock().await;

        match session.handle_message(id, message) {
            Ok(envelopes) => {
                self.publish(envelopes)?;
            }
            Err(err @ CollabError::UnauthorizedWrite(_)) => return Err(err),
            Err(err) => {
                warn!("rejected message from {id}: {err}");
                return Err(err);
            }
        }

        if disconnect {
            self.forget_peer(id).await;
        }
        Ok(())
    }

    /// Drop a connection and tell the others.
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        let envelopes = session.remove_client(id);
        self.forget_peer(id).await;
        self.publish(envelopes)
    }

    /// Replace a connection, typically one that lagged, with a fresh one.
    /// The old client leaves the document and the new connection starts
    /// with a `doc` handshake of the current document.
    pub async fn rejoin(&self, connection: RoomConnection, name: Option<&str>) -> Result<RoomConnection> {
        info!("client {} rejoining document {}", connection.id(), self.doc_id);
        self.disconnect(connection.id()).await?;
        self.connect(name).await
    }

    pub async fn document(&self) -> String {
        self.session.lock().await.document().to_string()
    }

    pub async fn revision(&self) -> Revision {
        self.session.lock().await.revision()
    }

    pub async fn peer_count(&self) -> usize {
        self.group.peer_count().await
    }

    pub async fn stats(&self) -> RoomStats {
        let session = self.session.lock().await;
        RoomStats {
            revision: session.revision(),
            participants: session.client_count(),
            broadcast: self.group.stats().await,
        }
    }

    fn publish(&self, envelopes: Vec<Envelope>) -> Result<()> {
        for envelope in envelopes {
            let payload = envelope.message.encode()?;
            debug!(
                "document {} -> {:?}: {}",
                self.doc_id,
                envelope.recipient,
                envelope.message.event_name()
            );
            self.group.broadcast(Frame {
                recipient: envelope.recipient,
                payload,
            });
        }
        Ok(())
    }

    async fn forget_peer(&self, id: &str) {
        if let Ok(peer_id) = Uuid::parse_str(id) {
            self.group.remove_peer(&peer_id).await;
        }
    }
}

/// One participant's view of a room: the frames addressed to it.
///
/// Frames are never skipped. A connection that falls more than
/// `broadcast_capacity` frames behind fails with
/// [`CollabError::ConnectionLagged`] on every later read and must be
/// replaced with [`DocumentRoom::rejoin`].
#[derive(Debug)]
pub struct RoomConnection {
    id: ClientId,
    peer_id: Uuid,
    receiver: broadcast::Receiver<Arc<Frame>>,
    stats: Arc<AtomicBroadcastStats>,
    lagged: Option<u64>,
}

impl RoomConnection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn is_lagged(&self) -> bool {
        self.lagged.is_some()
    }

    /// Next frame for this connection, or `None` once the room is gone.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        self.check_lagged()?;
        loop {
            match self.receiver.recv().await {
                Ok(frame) if frame.recipient.includes(&self.id) => return Ok(Some(frame.payload.clone())),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => return Err(self.lagged(skipped)),
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Like [`recv`](Self::recv) but returns `None` instead of waiting.
    pub fn try_recv(&mut self) -> Result<Option<String>> {
        self.check_lagged()?;
        loop {
            match self.receiver.try_recv() {
                Ok(frame) if frame.recipient.includes(&self.id) => return Ok(Some(frame.payload.clone())),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => return Err(self.lagged(skipped)),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(None),
            }
        }
    }

    fn check_lagged(&self) -> Result<()> {
        match self.lagged {
            Some(skipped) => Err(CollabError::ConnectionLagged { skipped }),
            None => Ok(()),
        }
    }

    fn lagged(&mut self, skipped: u64) -> CollabError {
        warn!("connection {} lagged, {skipped} frames lost; it must rejoin", self.id);
        self.stats.record_dropped(skipped);
        self.lagged = Some(skipped);
        CollabError::ConnectionLagged { skipped }
    }
}

/// Room manager: maps document ids to rooms.
#[derive(Debug)]
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<Uuid, Arc<DocumentRoom>>>>,
    config: ServerConfig,
}

impl RoomManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the room for `doc_id`, creating an empty document if needed.
    pub async fn get_or_create(&self, doc_id: Uuid) -> Arc<DocumentRoom> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(&doc_id) {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(&doc_id) {
            return Arc::clone(room);
        }

        info!("creating room for document {doc_id}");
        let room = Arc::new(DocumentRoom::new(doc_id, "", &self.config));
        rooms.insert(doc_id, Arc::clone(&room));
        room
    }

    /// Register a prepared room. Returns the room it replaced, if any.
    pub async fn insert(&self, room: DocumentRoom) -> Option<Arc<DocumentRoom>> {
        let doc_id = room.doc_id();
        self.rooms.write().await.insert(doc_id, Arc::new(room))
    }

    pub async fn get(&self, doc_id: &Uuid) -> Option<Arc<DocumentRoom>> {
        self.rooms.read().await.get(doc_id).cloned()
    }

    /// Remove a room nobody is connected to.
    pub async fn remove_if_empty(&self, doc_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(doc_id) {
            if room.peer_count().await == 0 {
                rooms.remove(doc_id);
                info!("removed empty room for document {doc_id}");
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_documents(&self) -> Vec<Uuid> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use sharedpen_core::TextOperation;

    fn next(connection: &mut RoomConnection) -> ServerMessage {
        let frame = connection.try_recv().unwrap().expect("a pending frame");
        ServerMessage::decode(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_connect_receives_handshake() {
        let room = DocumentRoom::new(Uuid::new_v4(), "hello", &ServerConfig::default());
        let mut alice = room.connect(None).await.unwrap();

        let ServerMessage::Doc(snapshot) = next(&mut alice) else {
            panic!("expected a handshake");
        };
        assert_eq!(snapshot.document, "hello");
        assert_eq!(snapshot.revision, 0);
        assert_eq!(alice.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn test_join_is_announced_to_others() {
        let room = DocumentRoom::new(Uuid::new_v4(), "", &ServerConfig::default());
        let mut alice = room.connect(Some("Alice")).await.unwrap();
        next(&mut alice);

        let bob = room.connect(Some("Bob")).await.unwrap();
        let ServerMessage::ClientJoin(info) = next(&mut alice) else {
            panic!("expected client_join");
        };
        assert_eq!(info.id, bob.id());
        assert_eq!(
            next(&mut alice),
            ServerMessage::SetName(bob.id().to_string(), "Bob".into())
        );
    }

    #[tokio::test]
    async fn test_operation_round_trip() {
        let room = DocumentRoom::new(Uuid::new_v4(), "", &ServerConfig::default());
        let mut alice = room.connect(None).await.unwrap();
        let mut bob = room.connect(None).await.unwrap();
        while alice.try_recv().unwrap().is_some() {}
        while bob.try_recv().unwrap().is_some() {}

        let frame = ClientMessage::Operation(0, TextOperation::new().insert("Hi"), None)
            .encode()
            .unwrap();
        room.handle_frame(alice.id(), &frame).await.unwrap();

        assert_eq!(next(&mut alice), ServerMessage::Ack);
        assert_eq!(
            next(&mut bob),
            ServerMessage::Operation(alice.id().to_string(), TextOperation::new().insert("Hi"), None)
        );
        assert_eq!(room.document().await, "Hi");
        assert_eq!(room.revision().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_rejected() {
        let room = DocumentRoom::new(Uuid::new_v4(), "abc", &ServerConfig::default());
        let alice = room.connect(None).await.unwrap();

        let err = room
            .handle_frame(alice.id(), r#"{"event":"operation","args":[0,[true]]}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::Ot(_)));
        assert_eq!(room.document().await, "abc");
        assert_eq!(room.revision().await, 0);
    }

    #[tokio::test]
    async fn test_room_full() {
        let config = ServerConfig {
            max_peers_per_room: 1,
            ..ServerConfig::default()
        };
        let room = DocumentRoom::new(Uuid::new_v4(), "", &config);
        let _alice = room.connect(None).await.unwrap();
        let err = room.connect(None).await.unwrap_err();
        assert_eq!(err, CollabError::RoomFull { capacity: 1 });
    }

    #[tokio::test]
    async fn test_disconnect_announces_leave() {
        let room = DocumentRoom::new(Uuid::new_v4(), "", &ServerConfig::default());
        let mut alice = room.connect(None).await.unwrap();
        let bob = room.connect(None).await.unwrap();
        while alice.try_recv().unwrap().is_some() {}

        room.disconnect(bob.id()).await.unwrap();
        assert_eq!(next(&mut alice), ServerMessage::ClientLeft(bob.id().to_string()));
        assert_eq!(room.peer_count().await, 1);
        assert_eq!(room.stats().await.participants, 1);
    }

    #[tokio::test]
    async fn test_lagged_connection_fails_until_rejoin() {
        let config = ServerConfig {
            broadcast_capacity: 2,
            ..ServerConfig::default()
        };
        let room = DocumentRoom::new(Uuid::new_v4(), "", &config);
        let mut alice = room.connect(None).await.unwrap();
        next(&mut alice);
        let bob = room.connect(None).await.unwrap();
        while alice.try_recv().unwrap().is_some() {}

        for (revision, text) in ["a", "b", "c"].into_iter().enumerate() {
            let op = TextOperation::new().retain(revision).insert(text);
            room.handle_message(bob.id(), ClientMessage::Operation(revision as Revision, op, None))
                .await
                .unwrap();
        }

        let err = alice.try_recv().unwrap_err();
        assert!(matches!(err, CollabError::ConnectionLagged { skipped } if skipped > 0));
        assert!(alice.is_lagged());
        assert_eq!(alice.try_recv().unwrap_err(), err);
        assert!(room.stats().await.broadcast.messages_dropped > 0);

        let mut alice = room.rejoin(alice, None).await.unwrap();
        let ServerMessage::Doc(snapshot) = next(&mut alice) else {
            panic!("expected a handshake");
        };
        assert_eq!(snapshot.document, "abc");
        assert_eq!(snapshot.revision, 3);
        assert_eq!(room.stats().await.participants, 2);
    }

    #[tokio::test]
    async fn test_room_manager_get_or_create() {
        let manager = RoomManager::default();
        let doc_id = Uuid::new_v4();

        let room1 = manager.get_or_create(doc_id).await;
        let room2 = manager.get_or_create(doc_id).await;
        assert!(Arc::ptr_eq(&room1, &room2));
        assert_eq!(manager.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_room_manager_multiple_docs() {
        let manager = RoomManager::default();
        let (doc1, doc2) = (Uuid::new_v4(), Uuid::new_v4());
        manager.get_or_create(doc1).await;
        manager.get_or_create(doc2).await;

        let docs = manager.active_documents().await;
        assert_eq!(docs.len(), 2);
        assert!(docs.contains(&doc1));
        assert!(docs.contains(&doc2));
    }

    #[tokio::test]
    async fn test_room_manager_cleanup() {
        let manager = RoomManager::default();
        let doc_id = Uuid::new_v4();
        let room = manager.get_or_create(doc_id).await;
        let alice = room.connect(None).await.unwrap();

        assert!(!manager.remove_if_empty(&doc_id).await);
        room.disconnect(alice.id()).await.unwrap();
        assert!(manager.remove_if_empty(&doc_id).await);
        assert_eq!(manager.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_room_manager_insert_prepared_room() {
        let manager = RoomManager::default();
        let doc_id = Uuid::new_v4();
        let room = DocumentRoom::new(doc_id, "seeded", manager.config());
        assert!(manager.insert(room).await.is_none());
        assert_eq!(manager.get(&doc_id).await.unwrap().document().await, "seeded");
    }
}
