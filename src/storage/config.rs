//! Runtime-tunable configuration for live session coordination.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Live session tuning knobs
    #[serde(default)]
    pub session: SessionSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            session: SessionSettings::default(),
        }
    }
}

/// Tuning knobs for the live session subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Interval at which participants emit heartbeats, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A participant missing this many milliseconds of heartbeats is evicted.
    pub eviction_timeout_ms: u64,
    /// Maximum time a strict sync barrier waits for stragglers before falling back, in milliseconds.
    pub strict_sync_timeout_ms: u64,
    /// Rate at which coalesced live-state broadcasts are flushed, in hertz.
    pub broadcast_rate_hz: u32,
    /// Maximum number of queued state updates per participant before the oldest is dropped.
    pub backpressure_queue_depth: usize,
    /// Default cap on participants per session.
    pub max_participants: usize,
    /// Length of generated invite codes.
    pub invite_code_length: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 15_000,
            eviction_timeout_ms: 45_000,
            strict_sync_timeout_ms: 60_000,
            broadcast_rate_hz: 5,
            backpressure_queue_depth: 8,
            max_participants: 10,
            invite_code_length: 6,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "providenceit", "LiftSync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from file, falling back to defaults when absent.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = get_config_path();

    if !path.exists() {
        let config = AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        };
        return Ok(config);
    }

    let content =
        std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = get_data_dir();

    Ok(config)
}

/// Save application configuration to file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = get_config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_sane() {
        let settings = SessionSettings::default();
        assert!(settings.heartbeat_interval_ms < settings.eviction_timeout_ms);
        assert!(settings.max_participants > 0);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(
            parsed.session.heartbeat_interval_ms,
            config.session.heartbeat_interval_ms
        );
    }
}
