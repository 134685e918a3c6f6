//! Configuration loading and hot-reloading for the ghgate server.
//!
//! Uses figment for YAML + environment configuration with sensible defaults,
//! and notify + arc-swap for live file watching. [`OAuthSettings::resolve`]
//! combines the loaded configuration with per-credential overrides.

pub mod resolve;
pub mod schema;
pub mod watcher;

pub use resolve::OAuthSettings;
pub use schema::{
    Config, CopilotConfig, GithubConfig, HttpConfig, LogConfig, LogFormat, ModelsConfig,
};
pub use watcher::ConfigWatcher;
