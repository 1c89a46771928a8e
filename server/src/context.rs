use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use http::request::Parts;
use hyper::header::HeaderMap;
use serde_json::{Map, Value};
use tracing::debug;

use shared::types::domain::DOMAIN_ID_SYSTEM;
use shared::types::{Domain, Session, User, UserFacingError};

use crate::locale::{self, LocaleBundle};
use crate::paths::{self, DomainPaths, PathComponent};
use crate::perm;
use crate::session::SessionManager;
use crate::store::{domain, user};
use crate::{headers, AppState};

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------
//
// The per-request aggregate every handler works against: resolved
// session, user (guest fallback), domain, locale bundle and
// domain-scoped path helpers.  Rebuilt for every request; never
// persisted.  Views and connections share it unchanged.

pub struct Context {
    pub state: AppState,
    sessions: SessionManager,
    pub request_cookies: HashMap<String, String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Interior mutability: login attaches, logout destroys, both from
    /// behind a shared reference.  Never held across an await.
    session: RwLock<Option<Session>>,
    pub user: User,
    pub domain_id: String,
    /// `None` only when the route named a domain that does not exist;
    /// dispatch translates that to `DomainNotFoundError` before any
    /// handler or guard runs.
    pub domain: Option<Domain>,
    pub locale: LocaleBundle,
    pub paths: Arc<DomainPaths>,
    pub prefer_json: bool,
    pub request_referer: Option<String>,
}

impl Context {
    /// Build the context for one request.  Session resolution (and the
    /// user lookup behind it) runs concurrently with the domain load —
    /// neither depends on the other.
    pub async fn prepare(
        state: &AppState,
        parts: &Parts,
        route_params: &mut HashMap<String, String>,
        page_name: &'static str,
        peer_addr: Option<&str>,
    ) -> Result<Context> {
        let sessions = SessionManager::new(state);
        let request_cookies = headers::get_cookies(&parts.headers);
        let remote_ip = headers::get_client_ip(
            &parts.headers,
            state.config.server.ip_header.as_deref(),
            peer_addr,
        );
        let user_agent = headers::get_user_agent(&parts.headers);

        let domain_id = route_params
            .remove("domain_id")
            .unwrap_or_else(|| DOMAIN_ID_SYSTEM.to_string());

        let resolve_identity = async {
            let session = sessions
                .resolve(&request_cookies, remote_ip.as_deref(), user_agent.as_deref())
                .await?;
            let user = match session.as_ref().and_then(Session::uid) {
                Some(uid) => user::get_by_uid(&state.pool, uid)
                    .await?
                    .unwrap_or_else(User::guest),
                None => User::guest(),
            };
            Ok::<_, anyhow::Error>((session, user))
        };
        let ((session, user), domain) = tokio::try_join!(
            resolve_identity,
            domain::get(&state.pool, &domain_id)
        )?;

        if domain.is_none() {
            debug!("Unknown domain requested: {}", domain_id);
        }

        let lang = user
            .view_lang
            .clone()
            .unwrap_or_else(|| state.config.locale.default_lang.clone());
        let locale = locale::bundle(&lang, &state.config.locale.timezone);
        let paths = paths::domain_paths(page_name, &domain_id);
        let prefer_json = headers::prefer_json(&parts.headers);
        let request_referer = headers::get_header_value(&parts.headers, "referer");

        Ok(Context {
            state: state.clone(),
            sessions,
            request_cookies,
            remote_ip,
            user_agent,
            session: RwLock::new(session),
            user,
            domain_id,
            domain,
            locale,
            paths,
            prefer_json,
            request_referer,
        })
    }

    // ── Session ──────────────────────────────────────────────────────────

    pub fn session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Merge `extra` into the session, creating one if needed (login).
    pub async fn attach_session(
        &self,
        extra: Map<String, Value>,
        new_saved: bool,
    ) -> Result<Option<Session>> {
        let session = self
            .sessions
            .attach(
                &self.request_cookies,
                extra,
                self.remote_ip.as_deref(),
                self.user_agent.as_deref(),
                new_saved,
            )
            .await?;
        if let Ok(mut slot) = self.session.write() {
            *slot = session.clone();
        }
        Ok(session)
    }

    /// Delete the backing token (logout).  Cookies clear on emit.
    pub async fn destroy_session(&self) -> Result<()> {
        self.sessions.destroy(&self.request_cookies).await?;
        if let Ok(mut slot) = self.session.write() {
            *slot = None;
        }
        Ok(())
    }

    /// Append the session cookie outcome of this request to a response.
    pub fn emit_cookies(&self, response_headers: &mut HeaderMap) -> Result<()> {
        let session = self.session();
        self.sessions
            .emit_cookies(response_headers, &self.request_cookies, session.as_ref())
    }

    pub fn csrf_token(&self) -> String {
        let session = self.session();
        self.sessions.csrf_token(session.as_ref())
    }

    // ── Permissions ──────────────────────────────────────────────────────

    pub fn domain(&self) -> Result<&Domain> {
        self.domain
            .as_ref()
            .ok_or_else(|| anyhow!(UserFacingError::DomainNotFound(self.domain_id.clone())))
    }

    pub fn has_perm(&self, perm: u64) -> bool {
        self.domain
            .as_ref()
            .is_some_and(|d| perm::has_perm(&self.user, d, perm))
    }

    pub fn check_perm(&self, perm: u64) -> Result<()> {
        perm::check_perm(&self.user, self.domain()?, perm)?;
        Ok(())
    }

    pub fn has_priv(&self, priv_bit: u64) -> bool {
        perm::has_priv(&self.user, priv_bit)
    }

    pub fn check_priv(&self, priv_bit: u64) -> Result<()> {
        perm::check_priv(&self.user, priv_bit)?;
        Ok(())
    }

    // ── Paths ────────────────────────────────────────────────────────────

    pub fn reverse_url(&self, name: &str, params: &[(&str, &str)]) -> String {
        self.paths.reverse_url(name, params)
    }

    pub fn build_path(&self, tail: &[PathComponent]) -> Vec<PathComponent> {
        self.paths.build_path(tail)
    }

    /// Template bindings shared by every page.
    pub fn ui_context(&self) -> Value {
        serde_json::json!({
            "csrf_token": self.csrf_token(),
            "url_prefix": self.state.config.paths.url_prefix,
            "cdn_prefix": self.state.config.paths.cdn_prefix,
        })
    }
}
