//! Environment configuration for the notes service.

use std::env;

/// Environment variable names
pub mod env_vars {
    pub const PORT: &str = "NOTES_SERVICE_PORT";
    pub const DATABASE_URL: &str = "NOTES_DATABASE_URL";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 9110;
    pub const DATABASE_URL: &str = "./.db/notes.db";
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var(env_vars::PORT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::PORT),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}
