// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::{BridgeType, EmulatorConfig};
use crate::constants::{
    DEFAULT_AUDIO_BUFFER_SIZE, DEFAULT_OPEN_MAX_ATTEMPTS, DEFAULT_OPEN_RETRY_INTERVAL,
};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory name under the user configuration directory
pub const CONFIG_DIR_NAME: &str = "kinect-bridge";
/// File name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Poll policy of the `connect` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRetry {
    /// Delay between two open attempts
    pub interval_ms: u64,
    /// Give up after this many attempts (0 = keep trying)
    pub max_attempts: u32,
}

impl OpenRetry {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for OpenRetry {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_OPEN_RETRY_INTERVAL.as_millis() as u64,
            max_attempts: DEFAULT_OPEN_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which bridge implementation to drive
    pub backend: BridgeType,
    /// Poll policy for waiting on a sensor
    pub open_retry: OpenRetry,
    /// Scratch size of one audio read, in bytes
    pub audio_buffer_size: u32,
    /// Settings of the emulated bridge
    pub emulator: EmulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BridgeType::default(),
            open_retry: OpenRetry::default(),
            audio_buffer_size: DEFAULT_AUDIO_BUFFER_SIZE,
            emulator: EmulatorConfig::default(),
        }
    }
}

impl Config {
    /// `<config dir>/kinect-bridge/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No configuration directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is
    /// an error.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Configuration file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), backend = %config.backend, "Loaded configuration");
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
