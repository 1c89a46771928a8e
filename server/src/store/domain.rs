use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use shared::types::domain::DOMAIN_ID_SYSTEM;
use shared::types::Domain;

/// Look up a domain.  The builtin system domain resolves without
/// touching storage.
pub async fn get(pool: &SqlitePool, domain_id: &str) -> Result<Option<Domain>> {
    if domain_id == DOMAIN_ID_SYSTEM {
        return Ok(Some(Domain::system()));
    }

    let row = sqlx::query("SELECT id, owner_uid, name, roles FROM domains WHERE id = ?")
        .bind(domain_id)
        .fetch_optional(pool)
        .await
        .context("Failed to query domain")?;

    let Some(row) = row else { return Ok(None) };
    let roles_raw: String = row.try_get("roles")?;
    let roles: HashMap<String, u64> = serde_json::from_str(&roles_raw).unwrap_or_default();
    Ok(Some(Domain {
        id: row.try_get("id")?,
        owner_uid: row.try_get("owner_uid")?,
        name: row.try_get("name")?,
        roles,
    }))
}

pub async fn add(pool: &SqlitePool, domain: &Domain) -> Result<()> {
    sqlx::query("INSERT INTO domains (id, owner_uid, name, roles) VALUES (?, ?, ?, ?)")
        .bind(&domain.id)
        .bind(domain.owner_uid)
        .bind(&domain.name)
        .bind(serde_json::to_string(&domain.roles).context("Failed to encode roles")?)
        .execute(pool)
        .await
        .context("Failed to insert domain")?;
    Ok(())
}
