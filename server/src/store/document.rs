use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};

use super::{decode_fields, encode_fields};

/// Typed document kinds.  Only the problem list is used by this
/// subsystem; the namespace is shared with the rest of the platform.
pub const TYPE_PROBLEM_LIST: i64 = 30;

#[derive(Debug, Clone)]
pub struct Document {
    pub domain_id: String,
    pub doc_type: i64,
    pub doc_id: i64,
    pub owner_uid: i64,
    pub content: String,
    pub fields: Map<String, Value>,
}

fn row_to_document(domain_id: &str, doc_type: i64, row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    Ok(Document {
        domain_id: domain_id.to_string(),
        doc_type,
        doc_id: row.try_get("doc_id")?,
        owner_uid: row.try_get("owner_uid")?,
        content: row.try_get("content")?,
        fields: decode_fields(row.try_get("fields")?),
    })
}

/// Insert a document; allocates the next free id within
/// (domain_id, doc_type) when `doc_id` is not supplied.
pub async fn add(
    pool: &SqlitePool,
    domain_id: &str,
    content: &str,
    owner_uid: i64,
    doc_type: i64,
    doc_id: Option<i64>,
    fields: Map<String, Value>,
) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let doc_id = match doc_id {
        Some(id) => id,
        None => {
            let row = sqlx::query(
                "SELECT COALESCE(MAX(doc_id), 0) + 1 AS next
                 FROM documents WHERE domain_id = ? AND doc_type = ?",
            )
            .bind(domain_id)
            .bind(doc_type)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to allocate document id")?;
            row.try_get("next")?
        }
    };

    sqlx::query(
        "INSERT INTO documents (domain_id, doc_type, doc_id, owner_uid, content, fields)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .bind(owner_uid)
    .bind(content)
    .bind(encode_fields(&fields)?)
    .execute(&mut *tx)
    .await
    .context("Failed to insert document")?;

    tx.commit().await.context("Failed to commit document insert")?;
    Ok(doc_id)
}

pub async fn get(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
) -> Result<Option<Document>> {
    let row = sqlx::query(
        "SELECT doc_id, owner_uid, content, fields FROM documents
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ?",
    )
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .fetch_optional(pool)
    .await
    .context("Failed to query document")?;

    row.map(|r| row_to_document(domain_id, doc_type, &r)).transpose()
}

/// Merge `fields` into a document.  The reserved `content` key updates
/// the content column.  Returns the updated document, `None` if absent.
pub async fn set(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
    fields: Map<String, Value>,
) -> Result<Option<Document>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "SELECT doc_id, owner_uid, content, fields FROM documents
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ?",
    )
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to query document for set")?;

    let Some(row) = row else { return Ok(None) };
    let mut doc = row_to_document(domain_id, doc_type, &row)?;

    for (k, v) in fields {
        if k == "content" {
            if let Some(s) = v.as_str() {
                doc.content = s.to_string();
                continue;
            }
        }
        doc.fields.insert(k, v);
    }

    sqlx::query(
        "UPDATE documents SET content = ?, fields = ?
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ?",
    )
    .bind(&doc.content)
    .bind(encode_fields(&doc.fields)?)
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .execute(&mut *tx)
    .await
    .context("Failed to update document")?;

    tx.commit().await.context("Failed to commit document set")?;
    Ok(Some(doc))
}

/// Add `value` to the array field `field` unless already present.
pub async fn add_to_set(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
    field: &str,
    value: Value,
) -> Result<Option<Document>> {
    mutate_array(pool, domain_id, doc_type, doc_id, field, |arr| {
        if !arr.contains(&value) {
            arr.push(value.clone());
        }
    })
    .await
}

/// Remove every element of `values` from the array field `field`.
pub async fn pull(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
    field: &str,
    values: &[Value],
) -> Result<Option<Document>> {
    mutate_array(pool, domain_id, doc_type, doc_id, field, |arr| {
        arr.retain(|v| !values.contains(v));
    })
    .await
}

async fn mutate_array<F>(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
    field: &str,
    mutate: F,
) -> Result<Option<Document>>
where
    F: FnOnce(&mut Vec<Value>),
{
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "SELECT doc_id, owner_uid, content, fields FROM documents
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ?",
    )
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to query document for array mutation")?;

    let Some(row) = row else { return Ok(None) };
    let mut doc = row_to_document(domain_id, doc_type, &row)?;

    let mut arr = match doc.fields.get(field) {
        Some(Value::Array(a)) => a.clone(),
        _ => Vec::new(),
    };
    mutate(&mut arr);
    doc.fields.insert(field.to_string(), Value::Array(arr));

    sqlx::query(
        "UPDATE documents SET fields = ?
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ?",
    )
    .bind(encode_fields(&doc.fields)?)
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .execute(&mut *tx)
    .await
    .context("Failed to update document array field")?;

    tx.commit().await.context("Failed to commit array mutation")?;
    Ok(Some(doc))
}

/// Merge per-user status fields for a document (e.g. a star flag).
/// Upserts the status row; returns the merged field map.
pub async fn set_status(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
    uid: i64,
    fields: Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row = sqlx::query(
        "SELECT fields FROM document_status
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ? AND uid = ?",
    )
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .bind(uid)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to query document status")?;

    let mut merged = match &row {
        Some(r) => decode_fields(r.try_get("fields")?),
        None => Map::new(),
    };
    for (k, v) in fields {
        merged.insert(k, v);
    }
    let encoded = encode_fields(&merged)?;

    if row.is_some() {
        sqlx::query(
            "UPDATE document_status SET fields = ?
             WHERE domain_id = ? AND doc_type = ? AND doc_id = ? AND uid = ?",
        )
        .bind(&encoded)
        .bind(domain_id)
        .bind(doc_type)
        .bind(doc_id)
        .bind(uid)
        .execute(&mut *tx)
        .await
        .context("Failed to update document status")?;
    } else {
        sqlx::query(
            "INSERT INTO document_status (domain_id, doc_type, doc_id, uid, fields)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(domain_id)
        .bind(doc_type)
        .bind(doc_id)
        .bind(uid)
        .bind(&encoded)
        .execute(&mut *tx)
        .await
        .context("Failed to insert document status")?;
    }

    tx.commit().await.context("Failed to commit status update")?;
    Ok(merged)
}

pub async fn get_status(
    pool: &SqlitePool,
    domain_id: &str,
    doc_type: i64,
    doc_id: i64,
    uid: i64,
) -> Result<Option<Map<String, Value>>> {
    let row = sqlx::query(
        "SELECT fields FROM document_status
         WHERE domain_id = ? AND doc_type = ? AND doc_id = ? AND uid = ?",
    )
    .bind(domain_id)
    .bind(doc_type)
    .bind(doc_id)
    .bind(uid)
    .fetch_optional(pool)
    .await
    .context("Failed to query document status")?;

    Ok(row
        .map(|r| -> Result<_> { Ok(decode_fields(r.try_get("fields")?)) })
        .transpose()?)
}
