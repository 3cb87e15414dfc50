//! Live-session-specific configuration access.
//!
//! Thin wrapper over [`crate::storage::config`]: the live session subsystem
//! only ever needs the `session` table of the application config, so this
//! module exposes that slice directly rather than making every call site
//! reach into `AppConfig`.

use crate::storage::config::{self, ConfigError, SessionSettings};

/// Load just the live-session tuning knobs, falling back to defaults when no
/// config file exists yet.
pub fn load_session_settings() -> Result<SessionSettings, ConfigError> {
    config::load_config().map(|c| c.session)
}

/// Persist updated live-session tuning knobs, preserving the rest of the
/// application config on disk.
pub fn save_session_settings(settings: SessionSettings) -> Result<(), ConfigError> {
    let mut current = config::load_config().unwrap_or_default();
    current.session = settings;
    config::save_config(&current)
}
