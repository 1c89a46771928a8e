use std::sync::Arc;

use sqlx::SqlitePool;

use shared::types::AppConfig;

pub mod connection;
pub mod context;
pub mod controller;
pub mod guards;
pub mod handlers;
pub mod headers;
pub mod locale;
pub mod operation;
pub mod paths;
pub mod perm;
pub mod router;
pub mod session;
pub mod store;
pub mod view;

/// Process-wide shared state, cloned into every connection task.
///
/// Everything here is either immutable after startup (`config`,
/// `csrf_key`) or internally synchronized (`pool`); cross-request
/// consistency is the stores' problem, not ours.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: SqlitePool,
    /// Resolved once at startup from `CSRF_KEY` / `auth.csrf_key`.
    pub csrf_key: Arc<str>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: SqlitePool, csrf_key: String) -> Self {
        AppState {
            config: Arc::new(config),
            pool,
            csrf_key: csrf_key.into(),
        }
    }
}
