use anyhow::Result;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;

use crate::store::document::{self, Document, TYPE_PROBLEM_LIST};

// ---------------------------------------------------------------------------
// Problem lists
// ---------------------------------------------------------------------------
//
// Thin facade over the document store: a problem list is a document of
// TYPE_PROBLEM_LIST with a `title`, a `problem` id array and a per-user
// `star` status flag.

pub async fn add(
    pool: &SqlitePool,
    domain_id: &str,
    title: &str,
    content: &str,
    owner_uid: i64,
    lid: Option<i64>,
) -> Result<i64> {
    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(title));
    fields.insert("problem".to_string(), json!([]));
    document::add(
        pool,
        domain_id,
        content,
        owner_uid,
        TYPE_PROBLEM_LIST,
        lid,
        fields,
    )
    .await
}

pub async fn get(pool: &SqlitePool, domain_id: &str, lid: i64) -> Result<Option<Document>> {
    document::get(pool, domain_id, TYPE_PROBLEM_LIST, lid).await
}

pub async fn set(
    pool: &SqlitePool,
    domain_id: &str,
    lid: i64,
    fields: Map<String, Value>,
) -> Result<Option<Document>> {
    document::set(pool, domain_id, TYPE_PROBLEM_LIST, lid, fields).await
}

/// Soft delete: the document stays, readers filter on `deleted`.
pub async fn delete(pool: &SqlitePool, domain_id: &str, lid: i64) -> Result<Option<Document>> {
    let mut fields = Map::new();
    fields.insert("deleted".to_string(), json!(true));
    document::set(pool, domain_id, TYPE_PROBLEM_LIST, lid, fields).await
}

/// Add a problem id to the list; duplicates are ignored.
pub async fn add_problem(
    pool: &SqlitePool,
    domain_id: &str,
    lid: i64,
    pid: i64,
) -> Result<Option<Document>> {
    document::add_to_set(pool, domain_id, TYPE_PROBLEM_LIST, lid, "problem", json!(pid)).await
}

pub async fn delete_problem(
    pool: &SqlitePool,
    domain_id: &str,
    lid: i64,
    pid: i64,
) -> Result<Option<Document>> {
    document::pull(pool, domain_id, TYPE_PROBLEM_LIST, lid, "problem", &[json!(pid)]).await
}

/// Per-user star flag, stored in document status.
pub async fn set_star(
    pool: &SqlitePool,
    domain_id: &str,
    lid: i64,
    uid: i64,
    star: bool,
) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    fields.insert("star".to_string(), json!(star));
    document::set_status(pool, domain_id, TYPE_PROBLEM_LIST, lid, uid, fields).await
}

pub async fn get_star(pool: &SqlitePool, domain_id: &str, lid: i64, uid: i64) -> Result<bool> {
    let status = document::get_status(pool, domain_id, TYPE_PROBLEM_LIST, lid, uid).await?;
    Ok(status
        .and_then(|s| s.get("star").and_then(Value::as_bool))
        .unwrap_or(false))
}
