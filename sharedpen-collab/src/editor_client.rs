//! Editor-facing client: ties an editing surface, the server connection,
//! undo history and remote participants together.
//!
//! ```text
//!  EditorEvent ──► EditorClient ──► Client (state machine) ──► Transport
//!                    │    ▲                 │
//!                    │    └── ServerMessage ┘ (rebased remote ops)
//!                    ▼
//!              UndoManager<SelectionMeta>
//! ```
//!
//! Undo and redo re-enter the same path as typing, so they are sent,
//! buffered and rebased exactly like any other local edit.

use std::collections::BTreeMap;

use log::{debug, info, trace};
use sharedpen_core::{
    EventEmitter, Metadata, OtError, Selection, SelectionMeta, SubscriptionId, TextOperation,
    UndoManager, WrappedOperation, DEFAULT_MAX_ITEMS,
};

use crate::adapter::{EditorAdapter, Transport};
use crate::client::{Client, ClientSink, ClientState};
use crate::error::{ProtocolError, Result};
use crate::presence::{ParticipantInfo, Participants};
use crate::protocol::{ClientId, ClientInfo, DocumentSnapshot, Revision, ServerMessage};

/// Something the user did in the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The contents changed; `inverse` undoes `operation`.
    Change {
        operation: TextOperation,
        inverse: TextOperation,
    },
    SelectionChange,
    Focus,
    Blur,
    Undo,
    Redo,
}

/// Notifications for the surrounding UI.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorClientEvent {
    UndoStatesChanged { can_undo: bool, can_redo: bool },
    ClientsChanged(Vec<ParticipantInfo>),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Undo history depth.
    pub undo_max_items: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            undo_max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

pub struct EditorClient<A: EditorAdapter, T: Transport> {
    client: Client,
    adapter: A,
    transport: T,
    undo: UndoManager<SelectionMeta>,
    selection: Option<Selection>,
    participants: Participants<A::Mark>,
    events: EventEmitter<EditorClientEvent>,
    /// The last change was attribute-only with several ranges selected.
    simultaneous: bool,
}

/// The borrowed pieces a [`Client`] needs while it runs.
struct Link<'a, A, T> {
    adapter: &'a mut A,
    transport: &'a mut T,
    selection: &'a mut Option<Selection>,
    undo: &'a mut UndoManager<SelectionMeta>,
}

impl<A: EditorAdapter, T: Transport> ClientSink for Link<'_, A, T> {
    fn send_operation(&mut self, revision: Revision, operation: &TextOperation) {
        self.transport
            .send_operation(revision, operation, self.selection.as_ref());
    }

    fn apply_operation(&mut self, operation: &TextOperation) -> std::result::Result<(), OtError> {
        self.adapter.apply_operation(operation)?;
        *self.selection = Some(self.adapter.get_selection());
        self.undo.transform(operation)
    }
}

impl<A: EditorAdapter, T: Transport> EditorClient<A, T> {
    /// Start from the server's `doc` handshake. `adapter` must be empty.
    pub fn new(snapshot: DocumentSnapshot, adapter: A, transport: T) -> Result<Self> {
        Self::with_config(snapshot, adapter, transport, ClientConfig::default())
    }

    pub fn with_config(
        snapshot: DocumentSnapshot,
        mut adapter: A,
        transport: T,
        config: ClientConfig,
    ) -> Result<Self> {
        load_content(&mut adapter, &snapshot)?;

        let mut participants = Participants::new();
        for (id, client) in &snapshot.clients {
            let selection = client
                .selection
                .clone()
                .unwrap_or_else(|| Selection::create_cursor(0));
            participants.join(&mut adapter, id, Some(&client.name), selection);
        }

        let selection = Some(adapter.get_selection());
        Ok(Self {
            client: Client::new(snapshot.revision),
            adapter,
            transport,
            undo: UndoManager::new(config.undo_max_items),
            selection,
            participants,
            events: EventEmitter::new(),
            simultaneous: false,
        })
    }

    pub fn revision(&self) -> Revision {
        self.client.revision()
    }

    pub fn state(&self) -> &ClientState {
        self.client.state()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Direct access for edits; report them through
    /// [`handle_editor_event`](Self::handle_editor_event).
    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn participants(&self) -> &Participants<A::Mark> {
        &self.participants
    }

    /// Last known local selection; `None` while the editor is blurred.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn undo_manager(&self) -> &UndoManager<SelectionMeta> {
        &self.undo
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EditorClientEvent) + Send + 'static) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn handle_editor_event(&mut self, event: EditorEvent) -> Result<()> {
        match event {
            EditorEvent::Change { operation, inverse } => self.on_change(operation, inverse),
            EditorEvent::SelectionChange | EditorEvent::Focus => {
                self.on_selection_change();
                Ok(())
            }
            EditorEvent::Blur => {
                self.selection = None;
                self.send_selection();
                Ok(())
            }
            EditorEvent::Undo => self.undo(),
            EditorEvent::Redo => self.redo(),
        }
    }

    pub fn handle_server_message(&mut self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::Doc(_) => return Err(ProtocolError::InvalidMessageType.into()),
            ServerMessage::ClientJoin(client) => self.on_client_join(client),
            ServerMessage::ClientLeft(id) => self.on_client_left(&id),
            ServerMessage::SetName(id, name) => {
                self.participants
                    .get_or_join(&mut self.adapter, &id)
                    .set_name(&name);
                self.emit_clients();
            }
            ServerMessage::Ack => {
                let (client, mut link) = self.split();
                client.server_ack(&mut link)?;
            }
            ServerMessage::Operation(id, operation, selection) => {
                debug!("remote operation from {id}: {operation}");
                let (client, mut link) = self.split();
                client.apply_server(&mut link, operation)?;
                self.on_remote_selection(&id, selection);
            }
            ServerMessage::Selection(id, selection) => self.on_remote_selection(&id, selection),
            ServerMessage::Clients(clients) => self.on_clients(clients),
            ServerMessage::Reconnect => {
                let (client, mut link) = self.split();
                client.server_reconnect(&mut link)?;
            }
        }
        Ok(())
    }

    /// Revert the latest local edit group. Does nothing if there is none.
    pub fn undo(&mut self) -> Result<()> {
        if !self.undo.can_undo() {
            return Ok(());
        }
        let adapter = &mut self.adapter;
        let entry = self
            .undo
            .perform_undo(|undo, entry| replay(undo, adapter, entry))?;
        self.after_replay(entry)
    }

    pub fn redo(&mut self) -> Result<()> {
        if !self.undo.can_redo() {
            return Ok(());
        }
        let adapter = &mut self.adapter;
        let entry = self
            .undo
            .perform_redo(|undo, entry| replay(undo, adapter, entry))?;
        self.after_replay(entry)
    }

    fn on_change(&mut self, operation: TextOperation, inverse: TextOperation) -> Result<()> {
        let before = self.selection.take();
        let after = self.adapter.get_selection();
        self.selection = Some(after.clone());

        let compose = self
            .undo
            .last_undo()
            .is_some_and(|top| inverse.should_be_composed_with_inverted(&top.wrapped));
        let ranges = after.ranges.len();
        let meta = SelectionMeta::new(after.clone(), before.unwrap_or(after));
        self.undo
            .add(WrappedOperation::new(inverse, meta), compose || self.simultaneous)?;
        self.simultaneous = operation.base_length() == operation.target_length() && ranges >= 2;

        let (client, mut link) = self.split();
        client.apply_client(&mut link, operation)?;
        self.emit_undo_states();
        Ok(())
    }

    fn after_replay(&mut self, entry: WrappedOperation<SelectionMeta>) -> Result<()> {
        let selection = entry.meta.after;
        self.adapter.set_selection(&selection);
        self.selection = Some(selection);

        let (client, mut link) = self.split();
        client.apply_client(&mut link, entry.wrapped)?;
        self.emit_undo_states();
        Ok(())
    }

    fn on_selection_change(&mut self) {
        let selection = self.adapter.get_selection();
        if self.selection.as_ref() == Some(&selection) {
            return;
        }
        self.selection = Some(selection);
        self.send_selection();
    }

    /// The server ignores selections from a client with buffered edits;
    /// the next operation carries the selection anyway.
    fn send_selection(&mut self) {
        if matches!(self.client.state(), ClientState::AwaitingWithBuffer(..)) {
            return;
        }
        self.transport.send_selection(self.selection.as_ref());
    }

    fn on_client_join(&mut self, client: ClientInfo) {
        info!("participant joined: {}", client.id);
        let selection = client
            .selection
            .unwrap_or_else(|| Selection::create_cursor(0));
        self.participants
            .join(&mut self.adapter, &client.id, Some(&client.name), selection);
        self.emit_clients();
    }

    fn on_client_left(&mut self, id: &str) {
        if self.participants.leave(&mut self.adapter, id).is_some() {
            info!("participant left: {id}");
            self.emit_clients();
        }
    }

    fn on_remote_selection(&mut self, id: &str, selection: Option<Selection>) {
        trace!("selection from {id}: {selection:?}");
        match selection {
            Some(selection) => {
                let selection = self.client.transform_selection(&selection);
                self.participants
                    .get_or_join(&mut self.adapter, id)
                    .update_selection(&mut self.adapter, selection);
            }
            None => self
                .participants
                .get_or_join(&mut self.adapter, id)
                .remove_selection(&mut self.adapter),
        }
    }

    fn on_clients(&mut self, clients: BTreeMap<ClientId, ClientInfo>) {
        for id in self.participants.ids() {
            if !clients.contains_key(&id) {
                self.on_client_left(&id);
            }
        }

        for (id, client) in clients {
            let selection = client
                .selection
                .map(|selection| self.client.transform_selection(&selection));
            let participant = self.participants.get_or_join(&mut self.adapter, &id);
            if !client.name.is_empty() {
                participant.set_name(&client.name);
            }
            match selection {
                Some(selection) => participant.update_selection(&mut self.adapter, selection),
                None => participant.remove_selection(&mut self.adapter),
            }
        }
        self.emit_clients();
    }

    fn split(&mut self) -> (&mut Client, Link<'_, A, T>) {
        (
            &mut self.client,
            Link {
                adapter: &mut self.adapter,
                transport: &mut self.transport,
                selection: &mut self.selection,
                undo: &mut self.undo,
            },
        )
    }

    fn emit_undo_states(&mut self) {
        self.events.emit(&EditorClientEvent::UndoStatesChanged {
            can_undo: self.undo.can_undo(),
            can_redo: self.undo.can_redo(),
        });
    }

    fn emit_clients(&mut self) {
        let infos = self.participants.infos();
        self.events.emit(&EditorClientEvent::ClientsChanged(infos));
    }
}

/// Fill an empty editor from the handshake. A history that starts from the
/// empty document is replayed so formatting comes back too.
fn load_content<A: EditorAdapter>(adapter: &mut A, snapshot: &DocumentSnapshot) -> Result<()> {
    match snapshot.operations.first() {
        Some(first) if first.base_length() == 0 => {
            for operation in &snapshot.operations {
                adapter.apply_operation(operation)?;
            }
        }
        _ if !snapshot.document.is_empty() => {
            adapter.apply_operation(&TextOperation::new().insert(snapshot.document.as_str()))?;
        }
        _ => {}
    }
    Ok(())
}

/// Apply an undo or redo entry, recording its inverse on the opposite stack.
fn replay<A: EditorAdapter>(
    undo: &mut UndoManager<SelectionMeta>,
    adapter: &mut A,
    entry: WrappedOperation<SelectionMeta>,
) -> std::result::Result<WrappedOperation<SelectionMeta>, OtError> {
    let inverse = adapter.invert_operation(&entry.wrapped)?;
    adapter.apply_operation(&entry.wrapped)?;
    undo.add(WrappedOperation::new(inverse, entry.meta.invert()), false)?;
    Ok(entry)
}
