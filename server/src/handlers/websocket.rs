//! WebSocket handler for realtime subscriptions.
//!
//! Handles WebSocket connections and dispatches reads and writes to the
//! document handlers while managing subscriptions.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::document::{DocPath, Write};
use crate::error::AppError;
use crate::websocket::{ClientMessage, ConnectionManager, ServerMessage};

use super::{handle_read, handle_write};

/// Handle an established WebSocket connection.
///
/// This function:
/// 1. Registers the connection with the manager
/// 2. Spawns a task to forward outgoing messages
/// 3. Processes incoming messages in a loop
/// 4. Cleans up on disconnect
pub async fn handle_websocket_connection(
    socket: WebSocket,
    pool: PgPool,
    conn_manager: Arc<ConnectionManager>,
    device_id: String,
) {
    // Split the socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Register with connection manager
    let conn_id = conn_manager.register(device_id.clone(), tx);

    tracing::info!(
        conn_id = %conn_id,
        device_id = %device_id,
        "WebSocket client connected"
    );

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    // Process incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &pool, &conn_manager, &conn_id).await;
                // Send response via the connection manager channel
                conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Clean up
    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        device_id = %device_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Process a client message and return the direct response.
///
/// Writes additionally publish the new value to every subscriber, this
/// connection included, before the acknowledgement is queued.
async fn process_message(
    text: &str,
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    conn_id: &str,
) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::error(format!("Invalid message format: {}", e), None);
        }
    };

    match client_msg {
        ClientMessage::Subscribe { path, request_id } => {
            let result = async {
                let path = DocPath::parse(&path)?;
                conn_manager.subscribe(conn_id, path.clone());
                let value = handle_read(pool, &path).await?;
                Ok::<_, AppError>(ServerMessage::value(path.to_string(), value))
            }
            .await;

            result.unwrap_or_else(|e| ServerMessage::error(e.to_string(), request_id))
        }

        ClientMessage::Unsubscribe { path, request_id } => match DocPath::parse(&path) {
            Ok(path) => {
                conn_manager.unsubscribe(conn_id, &path);
                ServerMessage::Ack { request_id }
            }
            Err(e) => ServerMessage::error(e.to_string(), request_id),
        },

        ClientMessage::Set {
            path,
            value,
            request_id,
        } => {
            let write = DocPath::parse(&path).map(|path| Write::Set { path, value });
            apply(pool, conn_manager, write, request_id).await
        }

        ClientMessage::Update {
            path,
            partial,
            request_id,
        } => {
            let write = DocPath::parse(&path).map(|path| Write::Update { path, partial });
            apply(pool, conn_manager, write, request_id).await
        }

        ClientMessage::Ping => ServerMessage::Pong,
    }
}

async fn apply(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    write: Result<Write, crate::document::DocumentError>,
    request_id: Option<String>,
) -> ServerMessage {
    let result = match write {
        Ok(write) => handle_write(pool, conn_manager, write).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(_) => ServerMessage::Ack { request_id },
        Err(e) => {
            tracing::warn!(error = %e, "Rejected write");
            ServerMessage::error(e.to_string(), request_id)
        }
    }
}
