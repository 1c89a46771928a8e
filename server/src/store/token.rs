use anyhow::{Context, Result};
use rand::RngCore;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use shared::types::TokenType;

use super::{decode_fields, encode_fields, now_secs};

/// A live token-store record.  Expired rows are treated as absent
/// everywhere; a background sweep (or store-side TTL) reaps them.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: String,
    pub token_type: TokenType,
    pub expire_at: i64,
    pub fields: Map<String, Value>,
}

fn new_token_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create a token with a freshly allocated opaque id.
pub async fn add(
    pool: &SqlitePool,
    token_type: TokenType,
    ttl_seconds: u64,
    fields: Map<String, Value>,
) -> Result<(String, TokenRecord)> {
    let id = new_token_id();
    let expire_at = now_secs() + ttl_seconds as i64;

    sqlx::query("INSERT INTO tokens (id, token_type, expire_at, fields) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(token_type.as_i64())
        .bind(expire_at)
        .bind(encode_fields(&fields)?)
        .execute(pool)
        .await
        .context("Failed to insert token")?;

    debug!("Created {:?} token", token_type);

    let record = TokenRecord {
        id: id.clone(),
        token_type,
        expire_at,
        fields,
    };
    Ok((id, record))
}

/// Fetch a live token.
pub async fn get(
    pool: &SqlitePool,
    id: &str,
    token_type: TokenType,
) -> Result<Option<TokenRecord>> {
    let row = sqlx::query(
        "SELECT expire_at, fields FROM tokens
         WHERE id = ? AND token_type = ? AND expire_at > ?",
    )
    .bind(id)
    .bind(token_type.as_i64())
    .bind(now_secs())
    .fetch_optional(pool)
    .await
    .context("Failed to query token")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(TokenRecord {
        id: id.to_string(),
        token_type,
        expire_at: row.try_get("expire_at")?,
        fields: decode_fields(row.try_get("fields")?),
    }))
}

/// Compare-and-extend: refresh the expiry of a live token and merge
/// `fields` into its record.  Returns `None` when the token is missing
/// or already expired — never an error.
///
/// The guard `expire_at > now` inside the transaction makes renewal
/// atomic with respect to concurrent expiry.
pub async fn update(
    pool: &SqlitePool,
    id: &str,
    token_type: TokenType,
    ttl_seconds: u64,
    fields: Map<String, Value>,
) -> Result<Option<TokenRecord>> {
    let now = now_secs();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "SELECT fields FROM tokens WHERE id = ? AND token_type = ? AND expire_at > ?",
    )
    .bind(id)
    .bind(token_type.as_i64())
    .bind(now)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to query token for update")?;

    let Some(row) = row else { return Ok(None) };

    let mut merged: Map<String, Value> = decode_fields(row.try_get("fields")?);
    for (k, v) in fields {
        merged.insert(k, v);
    }

    let expire_at = now + ttl_seconds as i64;
    sqlx::query(
        "UPDATE tokens SET expire_at = ?, fields = ? WHERE id = ? AND token_type = ?",
    )
    .bind(expire_at)
    .bind(encode_fields(&merged)?)
    .bind(id)
    .bind(token_type.as_i64())
    .execute(&mut *tx)
    .await
    .context("Failed to update token")?;

    tx.commit().await.context("Failed to commit token update")?;

    Ok(Some(TokenRecord {
        id: id.to_string(),
        token_type,
        expire_at,
        fields: merged,
    }))
}

/// Delete a token.  Returns whether a row was actually removed.
pub async fn delete(pool: &SqlitePool, id: &str, token_type: TokenType) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tokens WHERE id = ? AND token_type = ?")
        .bind(id)
        .bind(token_type.as_i64())
        .execute(pool)
        .await
        .context("Failed to delete token")?;
    Ok(result.rows_affected() > 0)
}

/// Count live rows — test/diagnostic helper.
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM tokens WHERE expire_at > ?")
        .bind(now_secs())
        .fetch_one(pool)
        .await
        .context("Failed to count tokens")?;
    Ok(row.try_get("n")?)
}
