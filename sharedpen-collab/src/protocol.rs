//! JSON wire protocol between editor clients and the document server.
//!
//! Every frame is one socket-style event: a name plus positional arguments.
//! ```text
//! {"event": "operation", "args": [3, [5, "x", -1], {"ranges": [...]}]}
//! {"event": "ack", "args": []}
//! ```
//! Operations travel in their compact array form (positive retain, string
//! insert, negative delete, attribute objects in front of the step they
//! apply to). Missing trailing arguments decode as `null`.

use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sharedpen_core::{Selection, TextOperation};

use crate::error::{ProtocolError, Result};

/// Connection identifier assigned by the server.
pub type ClientId = String;

/// Index into the server's operation history.
pub type Revision = i64;

/// What the server knows about one connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub selection: Option<Selection>,
}

impl ClientInfo {
    /// A fresh participant: named after its id, cursor at the start.
    pub fn new(id: impl Into<ClientId>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            selection: Some(Selection::create_cursor(0)),
        }
    }
}

/// Handshake payload sent to a client when it joins.
///
/// `document` is plain text; replaying `operations` from the empty document
/// reproduces it along with its formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub document: String,
    pub revision: Revision,
    #[serde(default)]
    pub clients: BTreeMap<ClientId, ClientInfo>,
    #[serde(default)]
    pub operations: Vec<TextOperation>,
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Doc(DocumentSnapshot),
    ClientJoin(ClientInfo),
    ClientLeft(ClientId),
    SetName(ClientId, String),
    /// The recipient's outstanding operation was accepted.
    Ack,
    /// A peer's accepted operation and its selection after it.
    Operation(ClientId, TextOperation, Option<Selection>),
    /// A peer moved its selection; `None` means it lost focus.
    Selection(ClientId, Option<Selection>),
    /// Full participant list, for reconciling after a reconnect.
    Clients(BTreeMap<ClientId, ClientInfo>),
    Reconnect,
}

/// Client → server events.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Operation(Revision, TextOperation, Option<Selection>),
    Selection(Option<Selection>),
    SetName(String),
    Disconnect,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl RawEvent {
    fn new(event: &str, args: Vec<Value>) -> Self {
        Self { event: event.to_string(), args }
    }

    fn parse(frame: &str) -> std::result::Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
    }

    fn into_args(self) -> (String, Args) {
        let args = Args {
            event: self.event.clone(),
            values: self.args.into_iter(),
        };
        (self.event, args)
    }
}

/// Positional argument reader.
struct Args {
    event: String,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    fn next<T: DeserializeOwned>(&mut self) -> std::result::Result<T, ProtocolError> {
        let value = self.values.next().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| ProtocolError::MalformedPayload(format!("{}: {e}", self.event)))
    }

    fn operation(&mut self) -> Result<TextOperation> {
        let value = self.values.next().unwrap_or(Value::Null);
        Ok(TextOperation::from_json(&value)?)
    }
}

fn arg<T: Serialize>(value: T) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Doc(_) => "doc",
            ServerMessage::ClientJoin(_) => "client_join",
            ServerMessage::ClientLeft(_) => "client_left",
            ServerMessage::SetName(..) => "set_name",
            ServerMessage::Ack => "ack",
            ServerMessage::Operation(..) => "operation",
            ServerMessage::Selection(..) => "selection",
            ServerMessage::Clients(_) => "clients",
            ServerMessage::Reconnect => "reconnect",
        }
    }

    fn to_raw(&self) -> serde_json::Result<RawEvent> {
        let args = match self {
            ServerMessage::Doc(snapshot) => vec![arg(snapshot)?],
            ServerMessage::ClientJoin(info) => vec![arg(info)?],
            ServerMessage::ClientLeft(id) => vec![arg(id)?],
            ServerMessage::SetName(id, name) => vec![arg(id)?, arg(name)?],
            ServerMessage::Ack | ServerMessage::Reconnect => Vec::new(),
            ServerMessage::Operation(id, operation, selection) => {
                vec![arg(id)?, operation.to_json(), arg(selection)?]
            }
            ServerMessage::Selection(id, selection) => vec![arg(id)?, arg(selection)?],
            ServerMessage::Clients(clients) => vec![arg(clients)?],
        };
        Ok(RawEvent::new(self.event_name(), args))
    }

    fn from_raw(raw: RawEvent) -> Result<Self> {
        let (event, mut args) = raw.into_args();
        let message = match event.as_str() {
            "doc" => ServerMessage::Doc(args.next()?),
            "client_join" => ServerMessage::ClientJoin(args.next()?),
            "client_left" => ServerMessage::ClientLeft(args.next()?),
            "set_name" => ServerMessage::SetName(args.next()?, args.next()?),
            "ack" => ServerMessage::Ack,
            "operation" => {
                ServerMessage::Operation(args.next()?, args.operation()?, args.next()?)
            }
            "selection" => ServerMessage::Selection(args.next()?, args.next()?),
            "clients" => ServerMessage::Clients(args.next()?),
            "reconnect" => ServerMessage::Reconnect,
            _ => return Err(ProtocolError::InvalidMessageType.into()),
        };
        Ok(message)
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> std::result::Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse a JSON text frame. Undecodable operations surface as
    /// `MalformedOperation`.
    pub fn decode(frame: &str) -> Result<Self> {
        Self::from_raw(RawEvent::parse(frame)?)
    }
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Operation(..) => "operation",
            ClientMessage::Selection(_) => "selection",
            ClientMessage::SetName(_) => "set_name",
            ClientMessage::Disconnect => "disconnect",
        }
    }

    fn to_raw(&self) -> serde_json::Result<RawEvent> {
        let args = match self {
            ClientMessage::Operation(revision, operation, selection) => {
                vec![arg(revision)?, operation.to_json(), arg(selection)?]
            }
            ClientMessage::Selection(selection) => vec![arg(selection)?],
            ClientMessage::SetName(name) => vec![arg(name)?],
            ClientMessage::Disconnect => Vec::new(),
        };
        Ok(RawEvent::new(self.event_name(), args))
    }

    fn from_raw(raw: RawEvent) -> Result<Self> {
        let (event, mut args) = raw.into_args();
        let message = match event.as_str() {
            "operation" => {
                ClientMessage::Operation(args.next()?, args.operation()?, args.next()?)
            }
            "selection" => ClientMessage::Selection(args.next()?),
            "set_name" => ClientMessage::SetName(args.next()?),
            "disconnect" => ClientMessage::Disconnect,
            _ => return Err(ProtocolError::InvalidMessageType.into()),
        };
        Ok(message)
    }

    pub fn encode(&self) -> std::result::Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(frame: &str) -> Result<Self> {
        Self::from_raw(RawEvent::parse(frame)?)
    }
}

impl Serialize for ServerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_raw().map_err(S::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEvent::deserialize(deserializer)?;
        ServerMessage::from_raw(raw).map_err(D::Error::custom)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_raw().map_err(S::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEvent::deserialize(deserializer)?;
        ClientMessage::from_raw(raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollabError;
    use serde_json::json;
    use sharedpen_core::{keys, Attributes, OtError, Range};

    fn value(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn test_operation_frame_shape() {
        let op = TextOperation::new()
            .retain(2)
            .insert_with("x", Attributes::new().with(keys::BOLD, true))
            .delete(1);
        let msg = ClientMessage::Operation(4, op, Some(Selection::create_cursor(3)));

        let frame = msg.encode().unwrap();
        assert_eq!(
            value(&frame),
            json!({
                "event": "operation",
                "args": [4, [2, {"b": true}, "x", -1], {"ranges": [{"anchor": 3, "head": 3}]}]
            })
        );
        assert_eq!(ClientMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_ack_has_no_args() {
        let frame = ServerMessage::Ack.encode().unwrap();
        assert_eq!(value(&frame), json!({"event": "ack", "args": []}));
        assert_eq!(ServerMessage::decode(r#"{"event":"ack"}"#).unwrap(), ServerMessage::Ack);
    }

    #[test]
    fn test_selection_null_and_missing() {
        let msg = ServerMessage::decode(r#"{"event":"selection","args":["abc",null]}"#).unwrap();
        assert_eq!(msg, ServerMessage::Selection("abc".into(), None));

        let msg = ClientMessage::decode(r#"{"event":"selection","args":[]}"#).unwrap();
        assert_eq!(msg, ClientMessage::Selection(None));
    }

    #[test]
    fn test_doc_handshake() {
        let mut clients = BTreeMap::new();
        clients.insert("a".to_string(), ClientInfo::new("a"));
        let snapshot = DocumentSnapshot {
            document: "Hi".into(),
            revision: 1,
            clients,
            operations: vec![TextOperation::new().insert("Hi")],
        };

        let frame = ServerMessage::Doc(snapshot.clone()).encode().unwrap();
        assert_eq!(
            value(&frame)["args"][0],
            json!({
                "document": "Hi",
                "revision": 1,
                "clients": {"a": {"id": "a", "name": "a", "selection": {"ranges": [{"anchor": 0, "head": 0}]}}},
                "operations": [["Hi"]]
            })
        );
        assert_eq!(ServerMessage::decode(&frame).unwrap(), ServerMessage::Doc(snapshot));
    }

    #[test]
    fn test_remote_operation_frame() {
        let frame = r#"{"event":"operation","args":["peer",[1,"y"],{"ranges":[{"anchor":2,"head":2}]}]}"#;
        let msg = ServerMessage::decode(frame).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Operation(
                "peer".into(),
                TextOperation::new().retain(1).insert("y"),
                Some(Selection::new(vec![Range::cursor(2)]))
            )
        );
    }

    #[test]
    fn test_malformed_operation_rejected() {
        let err = ClientMessage::decode(r#"{"event":"operation","args":[0,[1.5]]}"#).unwrap_err();
        assert!(matches!(err, CollabError::Ot(OtError::MalformedOperation(_))));
    }

    #[test]
    fn test_bad_frames() {
        let err = ClientMessage::decode("not json").unwrap_err();
        assert!(matches!(err, CollabError::Protocol(ProtocolError::MalformedPayload(_))));

        let err = ClientMessage::decode(r#"{"event":"ping","args":[]}"#).unwrap_err();
        assert_eq!(err, CollabError::Protocol(ProtocolError::InvalidMessageType));

        let err = ClientMessage::decode(r#"{"event":"operation","args":["x",[]]}"#).unwrap_err();
        assert!(matches!(err, CollabError::Protocol(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_set_name_and_disconnect() {
        let msg = ServerMessage::SetName("a".into(), "Alice".into());
        let frame = msg.encode().unwrap();
        assert_eq!(value(&frame), json!({"event": "set_name", "args": ["a", "Alice"]}));

        let frame = ClientMessage::Disconnect.encode().unwrap();
        assert_eq!(ClientMessage::decode(&frame).unwrap(), ClientMessage::Disconnect);
    }

    #[test]
    fn test_client_info_defaults() {
        let info: ClientInfo = serde_json::from_value(json!({"id": "z"})).unwrap();
        assert_eq!(info.name, "");
        assert_eq!(info.selection, None);
    }
}
