//! Client-side synchronization state machine.
//!
//! At most one local operation is in flight to the server. Edits made while
//! waiting for its acknowledgement are composed into a single buffer, which
//! is sent once the ack arrives.
//!
//! ```text
//!                 apply_client              apply_client
//!  Synchronized ───────────────► Awaiting ───────────────► AwaitingWithBuffer
//!       ▲                        Confirm  ◄───────────────       │    ▲
//!       └──────── server_ack ───────┘       server_ack           │    │
//!                                          (sends buffer)        └────┘
//!                                                             apply_client
//!                                                          (composes buffer)
//! ```

use std::fmt;

use log::debug;
use sharedpen_core::{OtError, Selection, TextOperation};

use crate::error::{CollabError, Result};
use crate::protocol::Revision;

/// Where a [`Client`] sends its operations and applies remote ones.
pub trait ClientSink {
    fn send_operation(&mut self, revision: Revision, operation: &TextOperation);

    fn apply_operation(&mut self, operation: &TextOperation) -> std::result::Result<(), OtError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Synchronized,
    /// Waiting for the ack of the contained operation.
    AwaitingConfirm(TextOperation),
    /// Outstanding operation plus local edits made since it was sent.
    AwaitingWithBuffer(TextOperation, TextOperation),
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Synchronized => write!(f, "synchronized"),
            ClientState::AwaitingConfirm(_) => write!(f, "awaiting confirm"),
            ClientState::AwaitingWithBuffer(..) => write!(f, "awaiting with buffer"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    revision: Revision,
    state: ClientState,
}

impl Client {
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            state: ClientState::Synchronized,
        }
    }

    /// Number of server operations this client has seen.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// The user changed the document.
    pub fn apply_client(&mut self, sink: &mut impl ClientSink, operation: TextOperation) -> Result<()> {
        let next = match &self.state {
            ClientState::Synchronized => {
                sink.send_operation(self.revision, &operation);
                ClientState::AwaitingConfirm(operation)
            }
            ClientState::AwaitingConfirm(outstanding) => {
                ClientState::AwaitingWithBuffer(outstanding.clone(), operation)
            }
            ClientState::AwaitingWithBuffer(outstanding, buffer) => {
                ClientState::AwaitingWithBuffer(outstanding.clone(), buffer.compose(&operation)?)
            }
        };
        self.transition(next);
        Ok(())
    }

    /// An operation from another client was accepted by the server.
    ///
    /// The server's operation was ordered first, so it wins insert ties
    /// against whatever this client still has pending.
    pub fn apply_server(&mut self, sink: &mut impl ClientSink, operation: TextOperation) -> Result<()> {
        let (next, local) = match &self.state {
            ClientState::Synchronized => (ClientState::Synchronized, operation),
            ClientState::AwaitingConfirm(outstanding) => {
                let (local, outstanding) = operation.transform(outstanding)?;
                (ClientState::AwaitingConfirm(outstanding), local)
            }
            ClientState::AwaitingWithBuffer(outstanding, buffer) => {
                let (operation, outstanding) = operation.transform(outstanding)?;
                let (local, buffer) = operation.transform(buffer)?;
                (ClientState::AwaitingWithBuffer(outstanding, buffer), local)
            }
        };
        sink.apply_operation(&local)?;
        self.revision += 1;
        self.transition(next);
        Ok(())
    }

    /// The server accepted our outstanding operation.
    pub fn server_ack(&mut self, sink: &mut impl ClientSink) -> Result<()> {
        let next = match &self.state {
            ClientState::Synchronized => return Err(CollabError::NoPendingOperation),
            ClientState::AwaitingConfirm(_) => ClientState::Synchronized,
            ClientState::AwaitingWithBuffer(_, buffer) => {
                sink.send_operation(self.revision + 1, buffer);
                ClientState::AwaitingConfirm(buffer.clone())
            }
        };
        self.revision += 1;
        self.transition(next);
        Ok(())
    }

    /// The connection came back; resend whatever the server may have missed.
    pub fn server_reconnect(&mut self, sink: &mut impl ClientSink) -> Result<()> {
        match &self.state {
            ClientState::Synchronized => {}
            ClientState::AwaitingConfirm(outstanding) => {
                sink.send_operation(self.revision, outstanding);
            }
            ClientState::AwaitingWithBuffer(outstanding, buffer) => {
                let pending = outstanding.compose(buffer)?;
                sink.send_operation(self.revision, &pending);
                self.transition(ClientState::AwaitingConfirm(pending));
            }
        }
        Ok(())
    }

    /// Map a selection reported by the server into local coordinates.
    pub fn transform_selection(&self, selection: &Selection) -> Selection {
        match &self.state {
            ClientState::Synchronized => selection.clone(),
            ClientState::AwaitingConfirm(outstanding) => selection.transform(outstanding),
            ClientState::AwaitingWithBuffer(outstanding, buffer) => {
                selection.transform(outstanding).transform(buffer)
            }
        }
    }

    fn transition(&mut self, next: ClientState) {
        if std::mem::discriminant(&self.state) != std::mem::discriminant(&next) {
            debug!("client r{}: {} -> {}", self.revision, self.state, next);
        }
        self.state = next;
    }
}
