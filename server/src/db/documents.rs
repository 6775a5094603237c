//! Database operations for the school_documents table.

use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

use crate::document::Write;
use crate::error::{AppError, Result};

/// A stored school document row.
#[derive(Debug)]
pub struct StoredDocument {
    pub school_id: String,
    pub document: Value,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            school_id: row.try_get("school_id")?,
            document: row.try_get("document")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fetch a school document.
pub async fn get_document(pool: &PgPool, school_id: &str) -> Result<Option<StoredDocument>> {
    let stored = sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT school_id, document, updated_at
        FROM school_documents
        WHERE school_id = $1
        "#,
    )
    .bind(school_id)
    .fetch_optional(pool)
    .await?;

    Ok(stored)
}

/// Apply `write` to its school document and return the result.
///
/// The row is locked for the duration of the transaction so concurrent
/// writes to the same school apply one after another. A missing document
/// starts out empty.
pub async fn apply_write(pool: &PgPool, write: Write) -> Result<StoredDocument> {
    let school_id = write.school_id().to_string();
    let mut tx = pool.begin().await?;

    let current: Option<Value> = sqlx::query_scalar(
        r#"
        SELECT document
        FROM school_documents
        WHERE school_id = $1
        FOR UPDATE
        "#,
    )
    .bind(&school_id)
    .fetch_optional(&mut *tx)
    .await?;

    let mut document = current.unwrap_or_else(|| Value::Object(Map::new()));
    write
        .apply(&mut document, chrono::Utc::now().timestamp_millis())
        .map_err(AppError::from)?;

    let stored = sqlx::query_as::<_, StoredDocument>(
        r#"
        INSERT INTO school_documents (school_id, document, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (school_id) DO UPDATE
        SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
        RETURNING school_id, document, updated_at
        "#,
    )
    .bind(&school_id)
    .bind(&document)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(school_id = %school_id, "Stored school document");

    Ok(stored)
}
