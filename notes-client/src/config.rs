//! Client configuration from the environment.

use crate::store::RefreshPolicy;
use std::env;
use std::path::PathBuf;

/// Environment variable names - single source of truth
pub mod env_vars {
    /// Base URL of the notes service
    pub const API_URL: &str = "NOTES_API_URL";
    /// "http" (notes service) or "memory" (in-process store)
    pub const BACKEND: &str = "NOTES_BACKEND";
    /// "feed" (live snapshots) or "reload" (re-fetch after each write)
    pub const REFRESH: &str = "NOTES_REFRESH";
    pub const SETTINGS_PATH: &str = "NOTES_SETTINGS_PATH";
}

/// Default values
pub mod defaults {
    pub const API_URL: &str = "http://127.0.0.1:9110";
    pub const SETTINGS_PATH: &str = "./.notes/settings.json";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Http,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub backend: BackendKind,
    pub refresh: RefreshPolicy,
    pub settings_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unrecognised values fall back to the
    /// default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup(env_vars::BACKEND).as_deref().map(str::trim) {
            None | Some("") | Some("http") => BackendKind::Http,
            Some("memory") => BackendKind::Memory,
            Some(other) => {
                log::warn!("{}={:?} not recognised, using http", env_vars::BACKEND, other);
                BackendKind::Http
            }
        };

        let refresh = match lookup(env_vars::REFRESH).as_deref().map(str::trim) {
            None | Some("") | Some("feed") => RefreshPolicy::Feed,
            Some("reload") => RefreshPolicy::Reload,
            Some(other) => {
                log::warn!("{}={:?} not recognised, using feed", env_vars::REFRESH, other);
                RefreshPolicy::Feed
            }
        };

        Self {
            api_url: lookup(env_vars::API_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| defaults::API_URL.to_string()),
            backend,
            refresh,
            settings_path: lookup(env_vars::SETTINGS_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(defaults::SETTINGS_PATH)),
        }
    }
}
