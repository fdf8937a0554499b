//! Service settings.
//!
//! Read once at startup from a TOML file next to the executable
//! (`coalescerd.exe` -> `coalescerd.toml`). A missing file or missing keys
//! fall back to defaults.

use crate::consolidate::ConsolidationSettings;
use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Settings file extension
pub const SETTINGS_EXTENSION: &str = "toml";

/// Log file extension
pub const LOG_EXTENSION: &str = "log";

/// Consolidation section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Wake timers closer together than this are covered by one wake
    #[serde(default = "default_min_span_hours")]
    pub min_span_hours: u32,

    /// Milliseconds to wake early per hour of gap
    #[serde(default = "default_lead_ms_per_hour")]
    pub lead_ms_per_hour: u32,
}

fn default_min_span_hours() -> u32 {
    3
}

fn default_lead_ms_per_hour() -> u32 {
    25_000
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_span_hours: default_min_span_hours(),
            lead_ms_per_hour: default_lead_ms_per_hour(),
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Settings path for the running executable
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let exe = std::env::current_exe().map_err(SettingsError::ExecutablePath)?;
        sibling_path(&exe, SETTINGS_EXTENSION)
    }

    /// Load settings, using defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Settings = toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Effective consolidation parameters; the minimum span is at least 1 hour.
    pub fn consolidation(&self) -> ConsolidationSettings {
        ConsolidationSettings {
            min_span_hours: self.consolidation.min_span_hours.max(1),
            lead_ms_per_hour: self.consolidation.lead_ms_per_hour,
        }
    }
}

/// `dir/name.exe` -> `dir/name.<extension>`
pub fn sibling_path(exe: &Path, extension: &str) -> Result<PathBuf, SettingsError> {
    if exe.file_stem().is_none() {
        return Err(SettingsError::NoFileName(exe.to_path_buf()));
    }
    Ok(exe.with_extension(extension))
}
