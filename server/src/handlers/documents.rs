//! Reading and writing school documents.

use serde_json::Value;
use sqlx::PgPool;

use crate::db;
use crate::document::{get_at, DocPath, Write};
use crate::error::Result;
use crate::websocket::ConnectionManager;

/// Read the value at `path`. `null` when nothing is stored there.
pub async fn handle_read(pool: &PgPool, path: &DocPath) -> Result<Value> {
    let stored = db::get_document(pool, &path.school_id).await?;

    Ok(stored
        .and_then(|stored| get_at(&stored.document, &path.segments).cloned())
        .unwrap_or(Value::Null))
}

/// Apply a write, then publish the new document to every subscriber of the
/// school.
///
/// Returns the full document after the write.
pub async fn handle_write(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    write: Write,
) -> Result<Value> {
    let target = write.path().to_string();
    let stored = db::apply_write(pool, write).await?;

    let recipients = conn_manager.publish(&stored.school_id, &stored.document);
    tracing::info!(
        path = %target,
        school_id = %stored.school_id,
        updated_at = %stored.updated_at,
        recipients,
        "Applied write"
    );

    Ok(stored.document)
}
