use crate::domain::models::BrickAddress;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "nxtctl".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// How a brick connection behaves once opened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickSettings {
    /// RFCOMM channel the brick listens on
    #[serde(default = "default_channel")]
    pub rfcomm_channel: u8,
    /// Local adapter index (hciN), reported as the connection's device id
    #[serde(default)]
    pub adapter_id: u16,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Ask the brick to acknowledge commands that return no data
    #[serde(default = "default_true")]
    pub require_replies: bool,
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
}

impl Default for BrickSettings {
    fn default() -> Self {
        Self {
            rfcomm_channel: default_channel(),
            adapter_id: 0,
            response_timeout_ms: default_response_timeout_ms(),
            require_replies: default_true(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
        }
    }
}

impl BrickSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

fn default_channel() -> u8 {
    1
}
fn default_response_timeout_ms() -> u64 {
    2000
}
fn default_keep_alive_interval_ms() -> u64 {
    60_000
}

/// Motors used by the drive and turn commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSettings {
    #[serde(default = "default_left_port")]
    pub left_port: u8,
    #[serde(default = "default_right_port")]
    pub right_port: u8,
    #[serde(default = "default_power")]
    pub power: i32,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            left_port: default_left_port(),
            right_port: default_right_port(),
            power: default_power(),
        }
    }
}

fn default_left_port() -> u8 {
    2
}
fn default_right_port() -> u8 {
    3
}
fn default_power() -> i32 {
    75
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub known_addresses: Vec<BrickAddress>,
    #[serde(default)]
    pub last_connected_address: Option<BrickAddress>,

    #[serde(default)]
    pub brick: BrickSettings,

    #[serde(default)]
    pub drive: DriveSettings,

    #[serde(default)]
    pub log_settings: LogSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load settings from the user's config directory
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults when
    /// it is missing or unreadable
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {:#}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("nxt-control");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Record a successful connection and persist it
    pub fn remember_address(&mut self, address: BrickAddress) -> anyhow::Result<()> {
        if !self.settings.known_addresses.contains(&address) {
            self.settings.known_addresses.push(address);
        }
        self.settings.last_connected_address = Some(address);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.brick.rfcomm_channel, 1);
        assert_eq!(settings.brick.response_timeout(), Duration::from_secs(2));
        assert!(settings.brick.require_replies);
        assert_eq!(settings.drive.left_port, 2);
        assert_eq!(settings.drive.right_port, 3);
        assert!(settings.last_connected_address.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "brick": { "rfcomm_channel": 3 }, "last_connected_address": "00:16:53:01:02:03" }"#,
        )
        .unwrap();

        let service = SettingsService::with_path(path);
        let settings = service.get();
        assert_eq!(settings.brick.rfcomm_channel, 3);
        assert_eq!(settings.brick.response_timeout_ms, 2000);
        assert_eq!(
            settings.last_connected_address,
            Some("00:16:53:01:02:03".parse().unwrap())
        );
        assert_eq!(settings.log_settings.level, "warn");
    }

    #[test]
    fn test_missing_or_broken_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SettingsService::with_path(dir.path().join("missing.json"));
        assert!(missing.get().known_addresses.is_empty());

        let broken_path = dir.path().join("broken.json");
        fs::write(&broken_path, "{ not json").unwrap();
        let broken = SettingsService::with_path(broken_path);
        assert_eq!(broken.get().brick.rfcomm_channel, 1);
    }

    #[test]
    fn test_remember_address_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let address: BrickAddress = "00:16:53:AA:BB:CC".parse().unwrap();

        let mut service = SettingsService::with_path(path.clone());
        service.remember_address(address).unwrap();
        service.remember_address(address).unwrap();

        let reloaded = SettingsService::with_path(path);
        assert_eq!(reloaded.get().known_addresses, vec![address]);
        assert_eq!(reloaded.get().last_connected_address, Some(address));
    }
}
