use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Trusted proxy header to read the client IP from (e.g.
    /// `"x-forwarded-for"`).  When unset the peer address is used.
    #[serde(default)]
    pub ip_header: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CookieConfig {
    /// `Domain` attribute on every cookie the server sets.
    #[serde(default)]
    pub domain: Option<String>,
    /// `Secure` attribute.  Off by default so local development works
    /// over plain HTTP.
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// TTL for "remember me" sessions, in seconds.
    #[serde(default = "default_saved_expire")]
    pub saved_expire_seconds: u64,
    /// TTL for ordinary sessions, in seconds.
    #[serde(default = "default_unsaved_expire")]
    pub unsaved_expire_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// HMAC key for CSRF token derivation.
    ///
    /// Prefer loading this via the `CSRF_KEY` environment variable; this
    /// field is the fallback for deployments that cannot inject env vars.
    ///
    /// **Minimum length:** 16 characters.  Rotating it invalidates every
    /// outstanding CSRF token (but not the sessions themselves).
    pub csrf_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocaleConfig {
    #[serde(default = "default_lang")]
    pub default_lang: String,
    /// Display timezone for the whole site.  Per-user timezone is a
    /// future extension; this keeps the choice out of the code.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default)]
    pub url_prefix: String,
    #[serde(default)]
    pub cdn_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub cookie: CookieConfig,
    #[serde(default = "default_session_config")]
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_locale_config")]
    pub locale: LocaleConfig,
    #[serde(default = "default_paths_config")]
    pub paths: PathsConfig,
    #[serde(default = "default_database_config")]
    pub database: DatabaseConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"0.0.0.0:8888"`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    /// Resolve the CSRF key with the `CSRF_KEY` env var taking priority
    /// over the config file field.
    ///
    /// Returns `None` when neither source is set (startup treats this as
    /// a hard error).
    pub fn resolved_csrf_key(&self) -> Option<String> {
        std::env::var("CSRF_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.csrf_key.clone())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8888
}

fn default_saved_expire() -> u64 {
    30 * 24 * 3600
}

fn default_unsaved_expire() -> u64 {
    3 * 3600
}

fn default_lang() -> String {
    "en".into()
}

fn default_timezone() -> String {
    "Asia/Shanghai".into()
}

fn default_templates_dir() -> String {
    "templates".into()
}

fn default_db_url() -> String {
    "sqlite://judge.db?mode=rwc".into()
}

fn default_session_config() -> SessionConfig {
    SessionConfig {
        saved_expire_seconds: default_saved_expire(),
        unsaved_expire_seconds: default_unsaved_expire(),
    }
}

fn default_locale_config() -> LocaleConfig {
    LocaleConfig {
        default_lang: default_lang(),
        timezone: default_timezone(),
    }
}

fn default_paths_config() -> PathsConfig {
    PathsConfig {
        templates_dir: default_templates_dir(),
        url_prefix: String::new(),
        cdn_prefix: String::new(),
    }
}

fn default_database_config() -> DatabaseConfig {
    DatabaseConfig {
        url: default_db_url(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0"
            port = 8000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.addr(), "0.0.0.0:8000");
        assert_eq!(cfg.session.saved_expire_seconds, 30 * 24 * 3600);
        assert_eq!(cfg.session.unsaved_expire_seconds, 3 * 3600);
        assert_eq!(cfg.locale.default_lang, "en");
        assert!(!cfg.cookie.secure);
    }

    #[test]
    fn csrf_key_falls_back_to_config_field() {
        let auth = AuthConfig {
            csrf_key: Some("sixteen-byte-key".into()),
        };
        // Env var may or may not be present in the test environment, so
        // only assert the fallback path when it is absent.
        if std::env::var("CSRF_KEY").is_err() {
            assert_eq!(auth.resolved_csrf_key().as_deref(), Some("sixteen-byte-key"));
        }
    }

    #[test]
    fn empty_csrf_key_counts_as_unset() {
        let auth = AuthConfig {
            csrf_key: Some(String::new()),
        };
        if std::env::var("CSRF_KEY").is_err() {
            assert!(auth.resolved_csrf_key().is_none());
        }
    }
}
