use anyhow::{anyhow, Result};
use hyper::Response;
use serde_json::{json, Map};
use tracing::info;

use shared::types::UserFacingError;

use crate::guards::Args;
use crate::store::user;
use crate::view::{ResponseBody, View};

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

pub async fn login_view(view: View, _args: Args) -> Result<Response<ResponseBody>> {
    let title = view.ctx.locale.tr("login").to_string();
    view.render("login.html", &title, Map::new())
}

/// Verify credentials and attach `uid` to the session.  "Remember me"
/// chooses the saved cookie class.
pub async fn login(view: View, args: Args) -> Result<Response<ResponseBody>> {
    let uname = args.require_str("uname")?;
    let password = args.require_str("password")?;
    let remember_me = args.get_bool("remember_me").unwrap_or(false);

    let account = user::get_by_uname(&view.ctx.state.pool, uname).await?;
    let verified = account.as_ref().is_some_and(|u| {
        u.password_hash
            .as_deref()
            .is_some_and(|hash| user::verify_password(hash, password))
    });
    // One error for unknown user and wrong password alike; do not leak
    // which part failed.
    let (Some(account), true) = (account, verified) else {
        return Err(anyhow!(UserFacingError::Login(uname.to_string())));
    };

    let mut extra = Map::new();
    extra.insert("uid".to_string(), json!(account.uid));
    view.ctx.attach_session(extra, remember_me).await?;
    info!("User {} logged in", account.uid);

    let mut kwargs = Map::new();
    kwargs.insert("uid".to_string(), json!(account.uid));
    view.json_or_redirect(&view.referer_or_main(), kwargs)
}

pub async fn logout(view: View, _args: Args) -> Result<Response<ResponseBody>> {
    view.ctx.destroy_session().await?;
    view.json_or_redirect(&view.ctx.reverse_url("main", &[]), Map::new())
}
