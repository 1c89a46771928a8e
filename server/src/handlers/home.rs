use anyhow::Result;
use hyper::Response;
use serde_json::{json, Map};

use crate::guards::Args;
use crate::view::{ResponseBody, View};

/// Domain main page.
pub async fn main_view(view: View, _args: Args) -> Result<Response<ResponseBody>> {
    let domain = view.ctx.domain()?;
    if view.prefer_json() {
        return view.json(&json!({
            "domain_id": domain.id,
            "name": domain.name,
            "owner_uid": domain.owner_uid,
        }));
    }
    let mut locals = Map::new();
    locals.insert("domain_name".into(), json!(domain.name));
    view.render("main.html", &domain.name, locals)
}
