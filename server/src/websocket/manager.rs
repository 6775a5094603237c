//! WebSocket connection manager.
//!
//! Tracks active connections and their subscriptions, and fans the current
//! school document out to every subscriber after a write.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use super::ServerMessage;
use crate::document::{get_at, DocPath};

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Client's device ID
    pub device_id: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

#[derive(Debug, Clone)]
struct Subscriber {
    conn_id: String,
    path: DocPath,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Connection IDs per device.
    by_device_id: DashMap<String, Vec<String>>,
    /// Subscribers per school ID.
    subscriptions: DashMap<String, Vec<Subscriber>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, device_id: String, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        let connection = Connection {
            id: conn_id.clone(),
            device_id: device_id.clone(),
            sender,
        };

        self.connections.insert(conn_id.clone(), connection);
        self.by_device_id
            .entry(device_id)
            .or_default()
            .push(conn_id.clone());

        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");

        conn_id
    }

    /// Unregister a connection and drop its subscriptions.
    pub fn unregister(&self, conn_id: &str) {
        if let Some((_, conn)) = self.connections.remove(conn_id) {
            if let Some(mut conn_ids) = self.by_device_id.get_mut(&conn.device_id) {
                conn_ids.retain(|id| id != conn_id);
                if conn_ids.is_empty() {
                    drop(conn_ids);
                    self.by_device_id.remove(&conn.device_id);
                }
            }

            self.subscriptions
                .iter_mut()
                .for_each(|mut subscribers| subscribers.retain(|s| s.conn_id != conn_id));
            self.subscriptions.retain(|_, subscribers| !subscribers.is_empty());

            tracing::info!(conn_id = %conn.id, device_id = %conn.device_id, "WebSocket connection unregistered");
        }
    }

    /// Subscribe a connection to a path. Subscribing twice to the same path
    /// is a no-op.
    pub fn subscribe(&self, conn_id: &str, path: DocPath) {
        let mut subscribers = self.subscriptions.entry(path.school_id.clone()).or_default();
        if subscribers
            .iter()
            .any(|s| s.conn_id == conn_id && s.path == path)
        {
            return;
        }

        tracing::debug!(conn_id = %conn_id, path = %path, "Subscribed");
        subscribers.push(Subscriber {
            conn_id: conn_id.to_string(),
            path,
        });
    }

    /// Remove a connection's subscription to a path.
    pub fn unsubscribe(&self, conn_id: &str, path: &DocPath) {
        if let Some(mut subscribers) = self.subscriptions.get_mut(&path.school_id) {
            subscribers.retain(|s| !(s.conn_id == conn_id && s.path == *path));
            if subscribers.is_empty() {
                drop(subscribers);
                self.subscriptions.remove(&path.school_id);
            }
        }
    }

    /// Send the value at each subscribed path of `school_id` to its
    /// subscriber, the writer included.
    ///
    /// Returns the number of connections that received a message.
    pub fn publish(&self, school_id: &str, document: &Value) -> usize {
        let subscribers = match self.subscriptions.get(school_id) {
            Some(subscribers) => subscribers.value().clone(),
            None => return 0,
        };

        let mut sent_count = 0;
        for subscriber in subscribers {
            let value = get_at(document, &subscriber.path.segments)
                .cloned()
                .unwrap_or(Value::Null);
            let message = ServerMessage::value(subscriber.path.to_string(), value);
            if self.send_to(&subscriber.conn_id, message) {
                sent_count += 1;
            }
        }

        tracing::debug!(
            school_id = %school_id,
            recipients = sent_count,
            "Published school document"
        );

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of unique devices connected.
    pub fn device_count(&self) -> usize {
        self.by_device_id.len()
    }

    /// Get the number of subscriptions across all schools.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().map(|entry| entry.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(path: &str) -> DocPath {
        DocPath::parse(path).unwrap()
    }

    #[test]
    fn test_register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register("device-1".to_string(), tx);
        manager.subscribe(&conn_id, path("schools/abc"));
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.device_count(), 1);
        assert_eq!(manager.subscription_count(), 1);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.device_count(), 0);
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_publish_reaches_writer_and_others() {
        let manager = ConnectionManager::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        let conn1 = manager.register("device-1".to_string(), tx1);
        let conn2 = manager.register("device-2".to_string(), tx2);
        let conn3 = manager.register("device-3".to_string(), tx3);
        manager.subscribe(&conn1, path("schools/abc"));
        manager.subscribe(&conn2, path("schools/abc"));
        manager.subscribe(&conn3, path("schools/other"));

        let document = json!({"metadata": {"schoolName": "Hill"}});
        let sent = manager.publish("abc", &document);
        assert_eq!(sent, 2);

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap() {
                ServerMessage::Value { path, value } => {
                    assert_eq!(path, "schools/abc");
                    assert_eq!(value, document);
                }
                other => panic!("Expected Value message, got {:?}", other),
            }
        }
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_publish_narrows_to_subscribed_field() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = manager.register("device-1".to_string(), tx);
        manager.subscribe(&conn_id, path("schools/abc/timing.timeSlots"));

        manager.publish("abc", &json!({"timing": {"timeSlots": [1]}}));
        manager.publish("abc", &json!({}));

        match rx.try_recv().unwrap() {
            ServerMessage::Value { value, .. } => assert_eq!(value, json!([1])),
            other => panic!("Expected Value message, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            ServerMessage::Value { value, .. } => assert_eq!(value, Value::Null),
            other => panic!("Expected Value message, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_is_idempotent_and_unsubscribe() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn_id = manager.register("device-1".to_string(), tx);

        manager.subscribe(&conn_id, path("schools/abc"));
        manager.subscribe(&conn_id, path("schools/abc"));
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(&conn_id, &path("schools/abc"));
        assert_eq!(manager.subscription_count(), 0);
        assert_eq!(manager.publish("abc", &json!({})), 0);
    }
}
