pub mod config;
pub mod types;

pub use config::load_config;
