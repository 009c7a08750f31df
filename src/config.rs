// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::schedule::AlarmForm;
use crate::session::SessionSettings;
use crate::time_sync::TimeSyncPolicy;

const APP_DIR: &str = "pillbox";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the device database.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Bluetooth settings.
    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    /// Session timing.
    #[serde(default)]
    pub session: SessionConfig,

    /// Prefilled values of the alarm form.
    #[serde(default)]
    pub alarm: AlarmDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// How long to scan for a pillbox before giving up.
    pub scan_timeout_secs: u64,

    /// Deadline of a single connect, read or write.
    pub operation_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 30,
            operation_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval of the clock check while connected.
    pub poll_interval_secs: u64,

    /// How long status messages stay visible.
    pub message_duration_ms: u64,

    /// Drift at or below this many seconds is ignored.
    pub resync_min_drift_secs: u32,

    /// Drift at or above this many seconds is a midnight rollover and ignored.
    pub resync_max_drift_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let policy = TimeSyncPolicy::default();
        Self {
            poll_interval_secs: 10,
            message_duration_ms: 3000,
            resync_min_drift_secs: policy.min_drift,
            resync_max_drift_secs: policy.max_drift,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmDefaults {
    /// "HH:MM"
    pub start_time: String,
    pub frequency_minutes: u32,
    pub count: u32,
}

impl Default for AlarmDefaults {
    fn default() -> Self {
        Self {
            start_time: "06:00".to_string(),
            frequency_minutes: 120,
            count: 5,
        }
    }
}

impl AlarmDefaults {
    pub fn form(&self) -> AlarmForm {
        AlarmForm::new(
            self.start_time.clone(),
            self.frequency_minutes.to_string(),
            self.count.to_string(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bluetooth: BluetoothConfig::default(),
            session: SessionConfig::default(),
            alarm: AlarmDefaults::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_path())?;

        config.data_dir = default_data_dir();
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Load from `path`, writing the defaults there when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would stall or spin a session.
    pub fn validate(&self) -> Result<()> {
        if self.session.poll_interval_secs == 0 {
            bail!("session.poll_interval_secs must be greater than zero");
        }
        if self.bluetooth.scan_timeout_secs == 0 || self.bluetooth.operation_timeout_secs == 0 {
            bail!("bluetooth timeouts must be greater than zero");
        }
        if self.session.resync_min_drift_secs >= self.session.resync_max_drift_secs {
            bail!(
                "session.resync_min_drift_secs ({}) must be below resync_max_drift_secs ({})",
                self.session.resync_min_drift_secs,
                self.session.resync_max_drift_secs
            );
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            poll_interval: Duration::from_secs(self.session.poll_interval_secs),
            scan_timeout: Duration::from_secs(self.bluetooth.scan_timeout_secs),
            operation_timeout: Duration::from_secs(self.bluetooth.operation_timeout_secs),
            message_duration: Duration::from_millis(self.session.message_duration_ms),
            policy: TimeSyncPolicy::new(
                self.session.resync_min_drift_secs,
                self.session.resync_max_drift_secs,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_written_on_first_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pillbox").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.session.poll_interval_secs, 10);
        assert_eq!(config.bluetooth.scan_timeout_secs, 30);
        assert_eq!(config.alarm.form(), AlarmForm::new("06:00", "120", "5"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\npoll_interval_secs = 30\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.session.poll_interval_secs, 30);
        assert_eq!(config.session.resync_max_drift_secs, 86_390);
        assert_eq!(config.bluetooth.operation_timeout_secs, 10);

        let settings = config.session_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.message_duration, Duration::from_millis(3000));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.alarm.start_time = "07:15".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.alarm.start_time, "07:15");
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.session.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.resync_min_drift_secs = 90_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bluetooth.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
