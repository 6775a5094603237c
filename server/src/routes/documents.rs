//! School document routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};

use crate::auth::AuthUser;
use crate::document::{DocPath, Write};
use crate::error::{AppError, Result};
use crate::handlers::{handle_read, handle_write};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/schools/{id}", get(read_document).patch(update_document))
        .route("/schools/{id}/{*path}", get(read_field).put(set_field))
}

/// GET /schools/{id} - Read a whole school document.
async fn read_document(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let path = DocPath::school(id);
    match handle_read(&state.pool, &path).await? {
        Value::Null => Err(AppError::NotFound(path.to_string())),
        value => Ok(Json(value)),
    }
}

/// GET /schools/{id}/{*path} - Read one field.
async fn read_field(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((id, path)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let path = DocPath::school(id).join(&path)?;
    let value = handle_read(&state.pool, &path).await?;
    Ok(Json(value))
}

/// PUT /schools/{id}/{*path} - Replace one field.
async fn set_field(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((id, path)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Result<Json<Value>> {
    let path = DocPath::school(id).join(&path)?;
    let document = handle_write(&state.pool, &state.conn_manager, Write::Set { path, value }).await?;
    Ok(Json(document))
}

/// PATCH /schools/{id} - Write several dotted keys at once.
async fn update_document(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
    Json(partial): Json<Map<String, Value>>,
) -> Result<Json<Value>> {
    let write = Write::Update {
        path: DocPath::school(id),
        partial,
    };
    let document = handle_write(&state.pool, &state.conn_manager, write).await?;
    Ok(Json(document))
}
