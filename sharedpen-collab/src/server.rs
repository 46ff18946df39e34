//! Authoritative operation history and the per-document session on top.
//!
//! Architecture:
//! ```text
//! Client A ──┐  operation(rev, op, sel)
//!            ├──► EditorServer ──► Server::receive_wrapped
//! Client B ──┘        │               │  rebase op over history[rev..]
//!                     │               ▼
//!                     │           document + history
//!                     ▼
//!        Envelope { recipient, message }
//!          ack ──► sender
//!          operation(id, op', sel') ──► everyone else
//! ```
//!
//! The session never performs I/O; it returns envelopes and leaves delivery
//! to the caller (see [`DocumentRoom`](crate::DocumentRoom)).

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, trace, warn};
use sharedpen_core::{Metadata, Selection, TextOperation, WrappedOperation};
use uuid::Uuid;

use crate::error::{CollabError, Result};
use crate::protocol::{ClientId, ClientInfo, ClientMessage, DocumentSnapshot, Revision, ServerMessage};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum peers per room
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_peers_per_room: 100,
            broadcast_capacity: 256,
        }
    }
}

/// Plain-text document plus every operation ever accepted.
///
/// Any revision of the document can be rebuilt by replaying the history
/// from the original document, so intermediate states are not kept.
#[derive(Debug, Clone, Default)]
pub struct Server {
    document: String,
    operations: Vec<TextOperation>,
}

impl Server {
    pub fn new(document: impl Into<String>) -> Self {
        Self::with_history(document, Vec::new())
    }

    /// Resume from a stored document and the history that produced it.
    pub fn with_history(document: impl Into<String>, operations: Vec<TextOperation>) -> Self {
        Self {
            document: document.into(),
            operations,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn operations(&self) -> &[TextOperation] {
        &self.operations
    }

    pub fn revision(&self) -> Revision {
        self.operations.len() as Revision
    }

    /// Operations accepted after `revision`.
    pub fn history_since(&self, revision: Revision) -> Result<&[TextOperation]> {
        let out_of_range = CollabError::RevisionOutOfRange {
            revision,
            history: self.operations.len(),
        };
        let start = usize::try_from(revision).map_err(|_| out_of_range.clone())?;
        self.operations.get(start..).ok_or(out_of_range)
    }

    /// Accept an operation a client made against `revision`.
    ///
    /// Returns the operation rebased onto the current document, which is
    /// what every other client must apply.
    pub fn receive_operation(&mut self, revision: Revision, operation: TextOperation) -> Result<TextOperation> {
        Ok(self
            .receive_wrapped(revision, WrappedOperation::new(operation, ()))?
            .wrapped)
    }

    /// Like [`receive_operation`](Self::receive_operation), carrying metadata
    /// (such as the sender's selection) through the same rebase.
    ///
    /// Operations already in the history were ordered first and win ties.
    /// Nothing is modified unless the whole rebase succeeds.
    pub fn receive_wrapped<M: Metadata>(
        &mut self,
        revision: Revision,
        mut operation: WrappedOperation<M>,
    ) -> Result<WrappedOperation<M>> {
        for concurrent in self.history_since(revision)? {
            let (concurrent, rebased) = concurrent.transform(&operation.wrapped)?;
            operation = WrappedOperation::new(rebased, operation.meta.transform(&concurrent));
        }

        self.document = operation.wrapped.apply(&self.document)?;
        self.operations.push(operation.wrapped.clone());
        Ok(operation)
    }
}

/// Who should receive a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Client(ClientId),
    /// Everyone in the document except this client.
    Others(ClientId),
    All,
}

impl Recipient {
    pub fn includes(&self, id: &str) -> bool {
        match self {
            Recipient::Client(target) => target == id,
            Recipient::Others(sender) => sender != id,
            Recipient::All => true,
        }
    }
}

/// A message addressed within one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub recipient: Recipient,
    pub message: ServerMessage,
}

impl Envelope {
    pub fn to_client(id: impl Into<ClientId>, message: ServerMessage) -> Self {
        Self {
            recipient: Recipient::Client(id.into()),
            message,
        }
    }

    pub fn to_others(sender: impl Into<ClientId>, message: ServerMessage) -> Self {
        Self {
            recipient: Recipient::Others(sender.into()),
            message,
        }
    }
}

type WritePredicate = Box<dyn Fn(&ClientInfo) -> bool + Send + Sync>;

/// Collaboration session for one document: history, participants and
/// write permission.
pub struct EditorServer {
    doc_id: Uuid,
    server: Server,
    clients: BTreeMap<ClientId, ClientInfo>,
    may_write: WritePredicate,
}

impl fmt::Debug for EditorServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorServer")
            .field("doc_id", &self.doc_id)
            .field("revision", &self.server.revision())
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl EditorServer {
    /// A session in which everyone may write.
    pub fn new(doc_id: Uuid, server: Server) -> Self {
        Self {
            doc_id,
            server,
            clients: BTreeMap::new(),
            may_write: Box::new(|_| true),
        }
    }

    /// Restrict who may send operations and selections.
    pub fn with_may_write(mut self, may_write: impl Fn(&ClientInfo) -> bool + Send + Sync + 'static) -> Self {
        self.may_write = Box::new(may_write);
        self
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn document(&self) -> &str {
        self.server.document()
    }

    pub fn revision(&self) -> Revision {
        self.server.revision()
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn client(&self, id: &str) -> Option<&ClientInfo> {
        self.clients.get(id)
    }

    pub fn clients(&self) -> &BTreeMap<ClientId, ClientInfo> {
        &self.clients
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// What a joining client needs to start editing.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            document: self.server.document().to_string(),
            revision: self.server.revision(),
            clients: self.clients.clone(),
            operations: self.server.operations().to_vec(),
        }
    }

    /// Register a connection. The joiner gets the handshake (which lists
    /// the others but not itself), everyone else a `client_join`.
    pub fn add_client(&mut self, id: impl Into<ClientId>) -> Vec<Envelope> {
        let id = id.into();
        let handshake = Envelope::to_client(id.clone(), ServerMessage::Doc(self.snapshot()));

        let info = ClientInfo::new(id.clone());
        self.clients.insert(id.clone(), info.clone());
        info!("client {id} joined document {}", self.doc_id);

        vec![handshake, Envelope::to_others(id, ServerMessage::ClientJoin(info))]
    }

    /// Unregister a connection and tell the others.
    pub fn remove_client(&mut self, id: &str) -> Vec<Envelope> {
        if self.clients.remove(id).is_none() {
            return Vec::new();
        }
        info!("client {id} left document {}", self.doc_id);
        vec![Envelope::to_others(id, ServerMessage::ClientLeft(id.to_string()))]
    }

    /// Handle one inbound message. A rejected message leaves the session
    /// exactly as it was.
    pub fn handle_message(&mut self, id: &str, message: ClientMessage) -> Result<Vec<Envelope>> {
        match message {
            ClientMessage::Operation(revision, operation, selection) => {
                self.on_operation(id, revision, operation, selection)
            }
            ClientMessage::Selection(selection) => self.on_selection(id, selection),
            ClientMessage::SetName(name) => {
                self.registered_mut(id)?.name = name.clone();
                Ok(vec![Envelope::to_others(id, ServerMessage::SetName(id.to_string(), name))])
            }
            ClientMessage::Disconnect => Ok(self.remove_client(id)),
        }
    }

    fn on_operation(
        &mut self,
        id: &str,
        revision: Revision,
        operation: TextOperation,
        selection: Option<Selection>,
    ) -> Result<Vec<Envelope>> {
        self.authorize(id)?;

        let accepted = self
            .server
            .receive_wrapped(revision, WrappedOperation::new(operation, selection))?;
        debug!(
            "document {} r{}: {} from {id}",
            self.doc_id,
            self.server.revision(),
            accepted.wrapped
        );

        self.registered_mut(id)?.selection = accepted.meta.clone();
        Ok(vec![
            Envelope::to_client(id, ServerMessage::Ack),
            Envelope::to_others(
                id,
                ServerMessage::Operation(id.to_string(), accepted.wrapped, accepted.meta),
            ),
        ])
    }

    fn on_selection(&mut self, id: &str, selection: Option<Selection>) -> Result<Vec<Envelope>> {
        self.authorize(id)?;
        trace!("selection from {id}: {selection:?}");

        if let Some(selection) = &selection {
            self.registered_mut(id)?.selection = Some(selection.clone());
        }
        Ok(vec![Envelope::to_others(
            id,
            ServerMessage::Selection(id.to_string(), selection),
        )])
    }

    fn authorize(&self, id: &str) -> Result<()> {
        let client = self
            .clients
            .get(id)
            .ok_or_else(|| CollabError::UnknownClient(id.to_string()))?;
        if !(self.may_write)(client) {
            info!("client {id} has no write permission");
            return Err(CollabError::UnauthorizedWrite(id.to_string()));
        }
        Ok(())
    }

    fn registered_mut(&mut self, id: &str) -> Result<&mut ClientInfo> {
        self.clients.get_mut(id).ok_or_else(|| {
            warn!("message from unknown client {id}");
            CollabError::UnknownClient(id.to_string())
        })
    }
}
