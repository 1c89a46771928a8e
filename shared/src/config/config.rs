use std::fs;
use tracing::{debug, error, info};

use crate::types::app_config::{AppConfig, ConfigError};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(&contents)?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.bind.is_empty() {
        return Err(ConfigError::InvalidConfig("bind cannot be empty".into()));
    }

    if config.session.saved_expire_seconds == 0 || config.session.unsaved_expire_seconds == 0 {
        return Err(ConfigError::InvalidConfig(
            "session expiry values must be greater than 0".into(),
        ));
    }

    if config.session.saved_expire_seconds < config.session.unsaved_expire_seconds {
        return Err(ConfigError::InvalidConfig(
            "saved_expire_seconds must not be shorter than unsaved_expire_seconds".into(),
        ));
    }

    // CSRF key must be resolvable (env var or config field) and long enough.
    // Validated here so a bad config is rejected at startup rather than
    // failing at the first form post.
    match config.auth.resolved_csrf_key() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "csrf_key must be set via the CSRF_KEY env var or auth.csrf_key config field"
                    .into(),
            ));
        }
        Some(key) if key.len() < 16 => {
            return Err(ConfigError::InvalidConfig(
                "csrf_key must be at least 16 characters long".into(),
            ));
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1"
            port = 8888

            [auth]
            csrf_key = "0123456789abcdef"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&sample()).is_ok());
    }

    #[test]
    fn zero_expiry_rejected() {
        let mut cfg = sample();
        cfg.session.unsaved_expire_seconds = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn saved_shorter_than_unsaved_rejected() {
        let mut cfg = sample();
        cfg.session.saved_expire_seconds = 10;
        cfg.session.unsaved_expire_seconds = 100;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn short_csrf_key_rejected() {
        let mut cfg = sample();
        cfg.auth.csrf_key = Some("short".into());
        if std::env::var("CSRF_KEY").is_err() {
            assert!(validate_config(&cfg).is_err());
        }
    }
}
