//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded, tagged by `type` and use snake_case for
//! field names. Paths look like `schools/{schoolId}[/{group}.{field}]`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Receive the value at a path now and after every write.
    Subscribe {
        path: String,
        /// Request ID for correlating responses
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Stop receiving values for a path.
    Unsubscribe {
        path: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Replace the value at a path.
    Set {
        path: String,
        value: Value,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Write several (possibly dotted) keys below a path.
    Update {
        path: String,
        partial: Map<String, Value>,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current value at a subscribed path. `null` when nothing is stored.
    Value { path: String, value: Value },

    /// A write or subscription change was accepted.
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error {
        /// Error description
        message: String,
        /// Request ID from the original request (if applicable)
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            request_id,
        }
    }

    /// Create a value notification.
    pub fn value(path: impl Into<String>, value: Value) -> Self {
        ServerMessage::Value {
            path: path.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialization() {
        let json = r#"{"type": "subscribe", "path": "schools/abc"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { path, request_id } => {
                assert_eq!(path, "schools/abc");
                assert_eq!(request_id, None);
            }
            _ => panic!("Expected Subscribe message"),
        }

        let json = r#"{
            "type": "update",
            "path": "schools/abc",
            "partial": {"registry.entities": [], "lastSyncTimestamp": 5},
            "request_id": "req-1"
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Update {
                partial,
                request_id,
                ..
            } => {
                assert_eq!(partial.len(), 2);
                assert_eq!(request_id.as_deref(), Some("req-1"));
            }
            _ => panic!("Expected Update message"),
        }

        let json = r#"{"type": "ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::Pong;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let msg = ServerMessage::Ack { request_id: None };
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"type":"ack"}"#);

        let msg = ServerMessage::value("schools/abc", Value::Null);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"value","path":"schools/abc","value":null}"#);

        let msg = ServerMessage::error("test error", Some("req-1".to_string()));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""message":"test error""#));
        assert!(json.contains(r#""request_id":"req-1""#));
    }
}
