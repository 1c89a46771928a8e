pub mod app_config;
pub mod domain;
pub mod error;
pub mod session;
pub mod user;

pub use self::app_config::{AppConfig, ConfigError};
pub use self::domain::Domain;
pub use self::error::UserFacingError;
pub use self::session::{Session, TokenType};
pub use self::user::User;
