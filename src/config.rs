//! Persisted settings
//!
//! Defaults for flags the user does not pass on every invocation. Stored
//! as JSON in the platform data directory; a missing or corrupt file
//! falls back to defaults rather than blocking startup.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings persistence errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to determine data directory")]
    DataDir,
    #[error("failed to read settings file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// User-tunable session defaults, overridable per-invocation by CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding model artifacts
    pub artifact_root: PathBuf,
    /// Model family loaded when no explicit local id is given
    pub model: String,
    /// Quantization preset, or "auto" to probe known presets
    pub quantization: String,
    /// Device name, or "auto" for the platform default
    pub device: String,
    /// Repaint the streamed reply every N decode steps
    pub stream_interval: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("dist"),
            model: "vicuna-v1-7b".to_string(),
            quantization: "auto".to_string(),
            device: "auto".to_string(),
            stream_interval: 2,
        }
    }
}

impl Settings {
    /// Pull out-of-range values back to defaults.
    pub fn validate(&mut self) {
        if self.stream_interval == 0 {
            self.stream_interval = 2;
        }
        if self.model.is_empty() {
            self.model = Settings::default().model;
        }
        if self.quantization.is_empty() {
            self.quantization = "auto".to_string();
        }
        if self.device.is_empty() {
            self.device = "auto".to_string();
        }
    }
}

fn settings_path() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("com", "Parley", "Parley")
        .map(|dirs| dirs.data_dir().join("settings.json"))
        .ok_or(ConfigError::DataDir)
}

/// Load settings, falling back to defaults on any failure.
pub fn load_settings() -> Settings {
    match load_settings_internal() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("failed to load settings, using defaults: {e}");
            Settings::default()
        }
    }
}

fn load_settings_internal() -> Result<Settings, ConfigError> {
    let path = settings_path()?;
    if !path.exists() {
        tracing::debug!("no settings file, using defaults");
        return Ok(Settings::default());
    }

    let json = fs::read_to_string(&path)?;
    let mut settings: Settings = serde_json::from_str(&json)?;
    settings.validate();
    tracing::debug!("loaded settings from {}", path.display());
    Ok(settings)
}

/// Save settings as pretty-printed JSON, creating parent directories.
pub fn save_settings(settings: &Settings) -> Result<(), ConfigError> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(settings)?)?;
    tracing::debug!("saved settings to {}", path.display());
    Ok(())
}
