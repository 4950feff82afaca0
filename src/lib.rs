pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;
pub mod store;
pub mod validation;
pub mod workers;

pub use config::Config;
pub use error::{Error, Result};
pub use services::dialog::{DialogEngine, ProcessingOutcome, SessionRegistry};
pub use store::{InMemorySessionStore, SessionStore};

/// Load configuration from environment variables
pub fn load_config() -> std::result::Result<Config, Box<dyn std::error::Error>> {
    Ok(Config::load()?)
}
