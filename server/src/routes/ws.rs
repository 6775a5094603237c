//! WebSocket upgrade route.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::handlers::handle_websocket_connection;
use crate::AppState;

/// Connection parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Client's device ID
    pub device_id: String,
}

/// Create WebSocket routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws?deviceId=... - Upgrade to a WebSocket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<WsQuery>,
) -> Response {
    let pool = state.pool.clone();
    let conn_manager = state.conn_manager.clone();

    ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, pool, conn_manager, query.device_id)
    })
}
