//! # sharedpen-collab — Real-time collaboration layer for sharedpen
//!
//! Client/server synchronisation of a single text document using operational
//! transformation. The server owns the authoritative history; each client
//! keeps at most one operation in flight and buffers the rest.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ClientMessage    ┌──────────────┐
//! │ EditorClient │ ─────────────────► │ DocumentRoom │
//! │  Client FSM  │ ◄───────────────── │ EditorServer │
//! │  UndoManager │   ServerMessage    │ Server (log) │
//! └──────┬───────┘    JSON frames     └──────┬───────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌──────────────┐                   ┌───────────────┐
//! │EditorAdapter │                   │ BroadcastGroup│
//! │ (editor UI)  │                   │ (fan-out)     │
//! └──────────────┘                   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`client`] — three-state client synchronisation machine
//! - [`server`] — revision log, rebase, and per-document session
//! - [`editor_client`] — glue between an editor, the client and a transport
//! - [`protocol`] — `{"event", "args"}` JSON wire messages
//! - [`presence`] — participant names, colours and remote selections
//! - [`broadcast`] / [`room`] — async rooms with per-connection delivery
//! - [`headless`] — in-memory editor adapter

pub mod adapter;
pub mod broadcast;
pub mod client;
pub mod editor_client;
pub mod error;
pub mod headless;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod server;

// Re-exports for convenience
pub use adapter::{EditorAdapter, Transport};
pub use broadcast::{BroadcastGroup, BroadcastStats, Frame, PeerInfo};
pub use client::{Client, ClientSink, ClientState};
pub use editor_client::{ClientConfig, EditorClient, EditorClientEvent, EditorEvent};
pub use error::{CollabError, ProtocolError, Result};
pub use headless::{HeadlessEditor, HeadlessMark, RemoteSelection};
pub use presence::{hsl_to_hex, hue_from_name, Participant, ParticipantInfo, Participants};
pub use protocol::{ClientId, ClientInfo, ClientMessage, DocumentSnapshot, Revision, ServerMessage};
pub use room::{DocumentRoom, RoomConnection, RoomManager, RoomStats};
pub use server::{EditorServer, Envelope, Recipient, Server, ServerConfig};
