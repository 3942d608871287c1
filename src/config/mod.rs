//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the REST
//! client, the live stream and audio formats, `AppPaths` for the
//! cross-platform config directory, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{ApiConfig, AppConfig, AudioConfig, Language, LiveConfig, API_KEY_ENV_VARS};
