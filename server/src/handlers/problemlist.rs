use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use hyper::Response;
use serde_json::{json, Map, Value};

use shared::types::UserFacingError;

use crate::connection::{Connection, Sender};
use crate::context::Context;
use crate::controller::problemlist;
use crate::guards::Args;
use crate::store::document::Document;
use crate::view::{ResponseBody, View};

// ---------------------------------------------------------------------------
// Problem list views
// ---------------------------------------------------------------------------

fn is_deleted(doc: &Document) -> bool {
    doc.fields
        .get("deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

async fn load(view: &View, lid: i64) -> Result<Document> {
    let doc = problemlist::get(&view.ctx.state.pool, &view.ctx.domain_id, lid).await?;
    // Soft-deleted lists read as absent.
    match doc {
        Some(doc) if !is_deleted(&doc) => Ok(doc),
        _ => Err(anyhow!(UserFacingError::DocumentNotFound(
            view.ctx.domain_id.clone(),
            lid
        ))),
    }
}

pub async fn detail_view(view: View, args: Args) -> Result<Response<ResponseBody>> {
    let lid = args.require_i64("lid")?;
    let doc = load(&view, lid).await?;

    let star = if view.ctx.user.is_guest() {
        false
    } else {
        problemlist::get_star(&view.ctx.state.pool, &view.ctx.domain_id, lid, view.ctx.user.uid)
            .await?
    };

    let title = doc
        .fields
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if view.prefer_json() {
        return view.json(&json!({
            "pldoc": {
                "doc_id": doc.doc_id,
                "owner_uid": doc.owner_uid,
                "title": title,
                "content": doc.content,
                "problem": doc.fields.get("problem").cloned().unwrap_or_else(|| json!([])),
            },
            "star": star,
        }));
    }

    let mut locals = Map::new();
    locals.insert("lid".into(), json!(doc.doc_id));
    locals.insert("title".into(), json!(title));
    locals.insert("content".into(), json!(doc.content));
    locals.insert(
        "problem".into(),
        doc.fields.get("problem").cloned().unwrap_or_else(|| json!([])),
    );
    locals.insert("star".into(), json!(star));
    view.render("problem_list_detail.html", &title, locals)
}

// ── Operations ───────────────────────────────────────────────────────────

pub async fn add_problem(view: View, args: Args) -> Result<Response<ResponseBody>> {
    let lid = args.require_i64("lid")?;
    let pid = args.require_i64("pid")?;
    load(&view, lid).await?;
    problemlist::add_problem(&view.ctx.state.pool, &view.ctx.domain_id, lid, pid).await?;
    view.json_or_redirect(&view.referer_or_main(), Map::new())
}

pub async fn delete_problem(view: View, args: Args) -> Result<Response<ResponseBody>> {
    let lid = args.require_i64("lid")?;
    let pid = args.require_i64("pid")?;
    load(&view, lid).await?;
    problemlist::delete_problem(&view.ctx.state.pool, &view.ctx.domain_id, lid, pid).await?;
    view.json_or_redirect(&view.referer_or_main(), Map::new())
}

pub async fn set_star(view: View, args: Args) -> Result<Response<ResponseBody>> {
    let lid = args.require_i64("lid")?;
    let star = args.require_bool("star")?;
    load(&view, lid).await?;
    problemlist::set_star(
        &view.ctx.state.pool,
        &view.ctx.domain_id,
        lid,
        view.ctx.user.uid,
        star,
    )
    .await?;
    let mut kwargs = Map::new();
    kwargs.insert("star".to_string(), json!(star));
    view.json_or_redirect(&view.referer_or_main(), kwargs)
}

// ── Live query connection ────────────────────────────────────────────────
//
// Clients send `{"lid": n}` frames and get the current list back; a
// frame naming a missing list gets the error envelope instead of a
// closed socket.

struct ProblemListConnection {
    ctx: Arc<Context>,
    sender: Sender,
}

pub fn connection_factory(ctx: Arc<Context>, sender: Sender) -> Box<dyn Connection> {
    Box::new(ProblemListConnection { ctx, sender })
}

impl Connection for ProblemListConnection {
    fn on_message<'a>(
        &'a mut self,
        message: Value,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(lid) = message.get("lid").and_then(Value::as_i64) else {
                return Ok(());
            };
            let doc = problemlist::get(&self.ctx.state.pool, &self.ctx.domain_id, lid).await?;
            match doc {
                Some(doc) if !is_deleted(&doc) => self.sender.send(&json!({
                    "lid": doc.doc_id,
                    "title": doc.fields.get("title").cloned().unwrap_or(Value::Null),
                    "problem": doc.fields.get("problem").cloned().unwrap_or_else(|| json!([])),
                })),
                _ => self.sender.send(&json!({
                    "error": UserFacingError::DocumentNotFound(self.ctx.domain_id.clone(), lid)
                        .to_dict(),
                })),
            }
        })
    }
}
