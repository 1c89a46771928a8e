use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sqlx::SqlitePool;

pub mod document;
pub mod domain;
pub mod token;
pub mod user;

/// Unix timestamp in seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Decode a JSON-object TEXT column; an empty/NULL column is an empty map.
pub(crate) fn decode_fields(raw: Option<String>) -> Map<String, Value> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| serde_json::from_str::<Map<String, Value>>(s).ok())
        .unwrap_or_default()
}

pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(fields).context("Failed to encode fields as JSON")
}

/// Create every table the stores need.  Idempotent; called at startup
/// and by tests against in-memory pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tokens (
             id         TEXT    NOT NULL,
             token_type INTEGER NOT NULL,
             expire_at  INTEGER NOT NULL,
             fields     TEXT    NOT NULL DEFAULT '{}',
             PRIMARY KEY (id, token_type)
         )",
    )
    .execute(pool)
    .await
    .context("Failed to create tokens table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS documents (
             domain_id TEXT    NOT NULL,
             doc_type  INTEGER NOT NULL,
             doc_id    INTEGER NOT NULL,
             owner_uid INTEGER NOT NULL,
             content   TEXT    NOT NULL DEFAULT '',
             fields    TEXT    NOT NULL DEFAULT '{}',
             PRIMARY KEY (domain_id, doc_type, doc_id)
         )",
    )
    .execute(pool)
    .await
    .context("Failed to create documents table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS document_status (
             domain_id TEXT    NOT NULL,
             doc_type  INTEGER NOT NULL,
             doc_id    INTEGER NOT NULL,
             uid       INTEGER NOT NULL,
             fields    TEXT    NOT NULL DEFAULT '{}',
             PRIMARY KEY (domain_id, doc_type, doc_id, uid)
         )",
    )
    .execute(pool)
    .await
    .context("Failed to create document_status table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
             uid           INTEGER PRIMARY KEY,
             uname         TEXT    NOT NULL UNIQUE,
             roles         TEXT    NOT NULL DEFAULT '{}',
             priv          INTEGER NOT NULL DEFAULT 0,
             view_lang     TEXT,
             password_hash TEXT
         )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS domains (
             id        TEXT PRIMARY KEY,
             owner_uid INTEGER NOT NULL,
             name      TEXT    NOT NULL DEFAULT '',
             roles     TEXT    NOT NULL DEFAULT '{}'
         )",
    )
    .execute(pool)
    .await
    .context("Failed to create domains table")?;

    Ok(())
}
