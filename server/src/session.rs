use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use anyhow::Result;
use hmac::{Hmac, Mac};
use hyper::header::{HeaderMap, SET_COOKIE};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use sqlx::SqlitePool;
use tracing::debug;

use shared::types::{AppConfig, Session, TokenType};

use crate::headers;
use crate::store::token::{self, TokenRecord};
use crate::AppState;

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------
//
// Cookie protocol: `sid` carries the opaque token id; `save` marks the
// saved ("remember me") TTL class so a later request knows which class
// to renew against without a second store round-trip.  Sessions are
// created lazily — only when a view attaches data (login) or requests
// saved mode — and renewed with a sliding expiry on every request that
// presents a sid.

#[derive(Clone)]
pub struct SessionManager {
    pool: SqlitePool,
    config: Arc<AppConfig>,
    csrf_key: Arc<str>,
}

impl SessionManager {
    pub fn new(state: &AppState) -> Self {
        SessionManager {
            pool: state.pool.clone(),
            config: state.config.clone(),
            csrf_key: state.csrf_key.clone(),
        }
    }

    /// Read the (sid, saved-class) pair from request cookies.  An empty
    /// sid value is treated as absent, like every other malformed cookie.
    fn inferred(cookies: &HashMap<String, String>) -> (Option<&str>, bool) {
        let sid = cookies.get("sid").map(String::as_str).filter(|s| !s.is_empty());
        let save = cookies.get("save").map(String::as_str) == Some("1");
        (sid, save)
    }

    fn class(&self, saved: bool) -> (TokenType, u64) {
        if saved {
            (
                TokenType::SavedSession,
                self.config.session.saved_expire_seconds,
            )
        } else {
            (
                TokenType::UnsavedSession,
                self.config.session.unsaved_expire_seconds,
            )
        }
    }

    /// Renew and return the session named by the request cookies, if any.
    /// A missing or expired token falls through to `None` — never an
    /// error; only store unavailability propagates.
    pub async fn resolve(
        &self,
        cookies: &HashMap<String, String>,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Option<Session>> {
        self.attach(cookies, Map::new(), remote_ip, user_agent, false)
            .await
    }

    /// Renew the current session, merging `extra` into it; create one
    /// only when `extra` is non-empty and no existing session resolved.
    ///
    /// TTL-class selection: with no `sid` cookie the class comes from
    /// `new_saved`; with a `sid` cookie it is inferred from the `save`
    /// cookie, including for the replacement token created when renewal
    /// missed but extra data must be stored.
    pub async fn attach(
        &self,
        cookies: &HashMap<String, String>,
        extra: Map<String, Value>,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
        new_saved: bool,
    ) -> Result<Option<Session>> {
        let (sid, save_cookie) = Self::inferred(cookies);
        let saved = if sid.is_none() { new_saved } else { save_cookie };
        let (token_type, ttl) = self.class(saved);

        let mut session = None;
        if let Some(sid) = sid {
            let mut fields = extra.clone();
            if let Some(ip) = remote_ip {
                fields.insert("update_ip".into(), json!(ip));
            }
            if let Some(ua) = user_agent {
                fields.insert("update_ua".into(), json!(ua));
            }
            session = token::update(&self.pool, sid, token_type, ttl, fields).await?;
        }

        if session.is_none() && !extra.is_empty() {
            let mut fields = extra;
            if let Some(ip) = remote_ip {
                fields.insert("create_ip".into(), json!(ip));
            }
            if let Some(ua) = user_agent {
                fields.insert("create_ua".into(), json!(ua));
            }
            let (id, record) = token::add(&self.pool, token_type, ttl, fields).await?;
            debug!("Created new {:?} session {}", token_type, id);
            session = Some(record);
        }

        Ok(session.map(record_to_session))
    }

    /// Append `Set-Cookie` headers for the session outcome of a request:
    /// a live session refreshes `sid` (and `save` for the saved class,
    /// with explicit expiry attributes); no session clears whichever of
    /// the two cookies the request carried.
    pub fn emit_cookies(
        &self,
        response_headers: &mut HeaderMap,
        request_cookies: &HashMap<String, String>,
        session: Option<&Session>,
    ) -> Result<()> {
        let cookie_config = &self.config.cookie;
        match session {
            Some(session) => {
                let max_age = if session.token_type.is_saved() {
                    let (_, ttl) = self.class(true);
                    let age = Duration::from_secs(ttl);
                    response_headers.append(
                        SET_COOKIE,
                        headers::set_cookie("save", "1", Some(age), cookie_config)?,
                    );
                    Some(age)
                } else {
                    None
                };
                response_headers.append(
                    SET_COOKIE,
                    headers::set_cookie("sid", &session.id, max_age, cookie_config)?,
                );
            }
            None => {
                for name in ["sid", "save"] {
                    if request_cookies.contains_key(name) {
                        response_headers
                            .append(SET_COOKIE, headers::clear_cookie(name, cookie_config)?);
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete the token named by the request cookies.  Cookie clearing is
    /// unconditional and happens via `emit_cookies(.., None)` regardless
    /// of whether the store still had the row.
    pub async fn destroy(&self, cookies: &HashMap<String, String>) -> Result<()> {
        let (sid, save_cookie) = Self::inferred(cookies);
        if let Some(sid) = sid {
            let (token_type, _) = self.class(save_cookie);
            let deleted = token::delete(&self.pool, sid, token_type).await?;
            debug!("Destroyed session (store row deleted: {})", deleted);
        }
        Ok(())
    }

    /// Anti-forgery token: hex(HMAC-SHA256(key, session id)).  Derived,
    /// never stored; memoized per session id for the process lifetime.
    /// Empty when there is no session — CSRF protection is tied to
    /// session existence.
    pub fn csrf_token(&self, session: Option<&Session>) -> String {
        let Some(session) = session else {
            return String::new();
        };
        derive_csrf_token(&self.csrf_key, &session.id)
    }
}

fn record_to_session(record: TokenRecord) -> Session {
    Session {
        id: record.id,
        token_type: record.token_type,
        expire_at: record.expire_at,
        fields: record.fields,
    }
}

// Pure function of (key, sid); values never invalidated.  Growth is
// bounded by the number of distinct live sessions seen by the process.
fn csrf_cache() -> &'static RwLock<HashMap<String, String>> {
    static CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn derive_csrf_token(key: &str, session_id: &str) -> String {
    if let Ok(cache) = csrf_cache().read() {
        if let Some(token) = cache.get(session_id) {
            return token.clone();
        }
    }
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .expect("HMAC can take a key of any size");
    mac.update(session_id.as_bytes());
    let token = hex::encode(mac.finalize().into_bytes());
    if let Ok(mut cache) = csrf_cache().write() {
        cache.insert(session_id.to_string(), token.clone());
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_stable_for_same_sid() {
        let a = derive_csrf_token("secret-key", "session-1");
        let b = derive_csrf_token("secret-key", "session-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA-256
    }

    #[test]
    fn csrf_token_differs_across_sids() {
        let a = derive_csrf_token("secret-key", "session-1");
        let b = derive_csrf_token("secret-key", "session-2");
        assert_ne!(a, b);
    }

    #[test]
    fn inferred_treats_empty_sid_as_absent() {
        let mut cookies = HashMap::new();
        cookies.insert("sid".to_string(), String::new());
        let (sid, _) = SessionManager::inferred(&cookies);
        assert!(sid.is_none());
    }

    #[test]
    fn inferred_save_requires_marker_value() {
        let mut cookies = HashMap::new();
        cookies.insert("sid".to_string(), "abc".to_string());
        cookies.insert("save".to_string(), "0".to_string());
        let (sid, save) = SessionManager::inferred(&cookies);
        assert_eq!(sid, Some("abc"));
        assert!(!save);
    }
}
