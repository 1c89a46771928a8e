use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use sqlx::{Row, SqlitePool};

use shared::types::User;

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let roles_raw: String = row.try_get("roles")?;
    let roles: HashMap<String, String> =
        serde_json::from_str(&roles_raw).unwrap_or_default();
    Ok(User {
        uid: row.try_get("uid")?,
        uname: row.try_get("uname")?,
        roles,
        priv_bits: row.try_get::<i64, _>("priv")? as u64,
        view_lang: row.try_get("view_lang")?,
        password_hash: row.try_get("password_hash")?,
    })
}

pub async fn get_by_uid(pool: &SqlitePool, uid: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT uid, uname, roles, priv, view_lang, password_hash FROM users WHERE uid = ?",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await
    .context("Failed to query user by uid")?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn get_by_uname(pool: &SqlitePool, uname: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT uid, uname, roles, priv, view_lang, password_hash FROM users WHERE uname = ?",
    )
    .bind(uname)
    .fetch_optional(pool)
    .await
    .context("Failed to query user by uname")?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn add(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (uid, uname, roles, priv, view_lang, password_hash)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user.uid)
    .bind(&user.uname)
    .bind(serde_json::to_string(&user.roles).context("Failed to encode roles")?)
    .bind(user.priv_bits as i64)
    .bind(&user.view_lang)
    .bind(&user.password_hash)
    .execute(pool)
    .await
    .context("Failed to insert user")?;
    Ok(())
}

/// Assign `role` to the user inside `domain_id`.
pub async fn set_role(pool: &SqlitePool, uid: i64, domain_id: &str, role: &str) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let row = sqlx::query("SELECT roles FROM users WHERE uid = ?")
        .bind(uid)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to query user roles")?
        .ok_or_else(|| anyhow!("No such user: {}", uid))?;
    let mut roles: HashMap<String, String> =
        serde_json::from_str(&row.try_get::<String, _>("roles")?).unwrap_or_default();
    roles.insert(domain_id.to_string(), role.to_string());
    sqlx::query("UPDATE users SET roles = ? WHERE uid = ?")
        .bind(serde_json::to_string(&roles)?)
        .bind(uid)
        .execute(&mut *tx)
        .await
        .context("Failed to update user roles")?;
    tx.commit().await.context("Failed to commit role update")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Password hashing
// ---------------------------------------------------------------------------

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Constant-time verification; a malformed stored hash counts as a
/// mismatch rather than an error.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(verify_password(&hash, "hunter2!"));
        assert!(!verify_password(&hash, "hunter3!"));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_password("not-a-phc-string", "whatever"));
    }
}
