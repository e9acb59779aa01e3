//! Configuration management for discdrawer.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::Units;
use crate::position::GpsdConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "discdrawer";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "discdrawer.db";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "DISCDRAWER_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `DISCDRAWER_`, sections separated
///    by `__`, e.g. `DISCDRAWER_LOCATION__GPSD_PORT`)
/// 2. TOML config file at `~/.config/discdrawer/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Location provider configuration.
    pub location: LocationConfig,
    /// Measurement session configuration.
    pub session: SessionConfig,
    /// Presentation configuration.
    pub display: DisplayConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/discdrawer/discdrawer.db`
    pub database_path: Option<PathBuf>,
}

/// Which location provider to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// A `gpsd` daemon.
    #[default]
    Gpsd,
    /// Replay of a recorded track.
    Simulated,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpsd => write!(f, "gpsd"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Location-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Provider used for measurements.
    pub provider: ProviderKind,
    /// Host running `gpsd`.
    pub gpsd_host: String,
    /// TCP port of `gpsd`.
    pub gpsd_port: u16,
    /// Delay before reconnecting to `gpsd` in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Minimum `gpsd` fix mode (2 = 2D, 3 = 3D).
    pub min_fix_mode: u8,
    /// Track file replayed by the simulated provider.
    pub simulated_track: Option<PathBuf>,
    /// Interval between replayed samples in milliseconds.
    pub simulated_interval_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        let gpsd = GpsdConfig::default();
        Self {
            provider: ProviderKind::Gpsd,
            gpsd_host: gpsd.host,
            gpsd_port: gpsd.port,
            reconnect_delay_ms: 2000,
            min_fix_mode: gpsd.min_fix_mode,
            simulated_track: None,
            simulated_interval_ms: 1000,
        }
    }
}

/// How the device is kept awake during a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InhibitorKind {
    /// Hold a `systemd-inhibit` lock.
    Systemd,
    /// Do not inhibit sleep.
    None,
}

impl Default for InhibitorKind {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Systemd
        } else {
            Self::None
        }
    }
}

/// Measurement session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Keep the device awake while a session is open.
    pub keep_awake: bool,
    /// Sleep inhibitor backend.
    pub inhibitor: InhibitorKind,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_awake: true,
            inhibitor: InhibitorKind::default(),
        }
    }
}

/// Presentation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Units for distances and accuracy.
    pub units: Units,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing config file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let location = &self.location;

        if location.gpsd_host.trim().is_empty() {
            return Err(invalid("gpsd_host must not be empty"));
        }
        if location.gpsd_port == 0 {
            return Err(invalid("gpsd_port must be greater than 0"));
        }
        if location.reconnect_delay_ms == 0 {
            return Err(invalid("reconnect_delay_ms must be greater than 0"));
        }
        if !(2..=3).contains(&location.min_fix_mode) {
            return Err(invalid(format!(
                "min_fix_mode must be 2 (2D) or 3 (3D), got {}",
                location.min_fix_mode
            )));
        }
        if location.simulated_interval_ms == 0 {
            return Err(invalid("simulated_interval_ms must be greater than 0"));
        }
        if location.provider == ProviderKind::Simulated && location.simulated_track.is_none() {
            return Err(invalid(
                "simulated_track is required when provider is 'simulated'",
            ));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the `gpsd` reconnect delay as a Duration.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.location.reconnect_delay_ms)
    }

    /// Get the simulated replay interval as a Duration.
    #[must_use]
    pub fn simulated_interval(&self) -> Duration {
        Duration::from_millis(self.location.simulated_interval_ms)
    }

    /// Connection settings for the `gpsd` provider.
    #[must_use]
    pub fn gpsd(&self) -> GpsdConfig {
        GpsdConfig {
            host: self.location.gpsd_host.clone(),
            port: self.location.gpsd_port,
            reconnect_delay: self.reconnect_delay(),
            min_fix_mode: self.location.min_fix_mode,
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("discdrawer-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.location.provider, ProviderKind::Gpsd);
        assert_eq!(config.location.gpsd_host, "127.0.0.1");
        assert_eq!(config.location.gpsd_port, 2947);
        assert_eq!(config.location.min_fix_mode, 2);
        assert!(config.session.keep_awake);
        assert_eq!(config.display.units, Units::Feet);
    }

    #[test]
    fn test_default_inhibitor_per_platform() {
        let expected = if cfg!(target_os = "linux") {
            InhibitorKind::Systemd
        } else {
            InhibitorKind::None
        };
        assert_eq!(SessionConfig::default().inhibitor, expected);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.location.gpsd_port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("gpsd_port"));
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = Config::default();
        config.location.reconnect_delay_ms = 0;
        assert!(config.validate().unwrap_err().to_string().contains("reconnect_delay_ms"));

        let mut config = Config::default();
        config.location.simulated_interval_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("simulated_interval_ms"));
    }

    #[test]
    fn test_validate_fix_mode() {
        let mut config = Config::default();
        config.location.min_fix_mode = 1;
        assert!(config.validate().unwrap_err().to_string().contains("min_fix_mode"));

        config.location.min_fix_mode = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_simulated_requires_track() {
        let mut config = Config::default();
        config.location.provider = ProviderKind::Simulated;
        assert!(config.validate().unwrap_err().to_string().contains("simulated_track"));

        config.location.simulated_track = Some(PathBuf::from("track.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("discdrawer.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.simulated_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_gpsd_settings() {
        let mut config = Config::default();
        config.location.gpsd_host = "gps.local".to_string();
        config.location.min_fix_mode = 3;

        let gpsd = config.gpsd();
        assert_eq!(gpsd.host, "gps.local");
        assert_eq!(gpsd.port, 2947);
        assert_eq!(gpsd.min_fix_mode, 3);
        assert_eq!(gpsd.reconnect_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("discdrawer"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.location, LocationConfig::default());
    }

    #[test]
    fn test_load_toml_sections() {
        let path = temp_config(
            "sections.toml",
            r#"
[location]
gpsd_port = 3000
min_fix_mode = 3

[session]
keep_awake = false
inhibitor = "none"

[display]
units = "meters"
"#,
        );

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.location.gpsd_port, 3000);
        assert_eq!(config.location.min_fix_mode, 3);
        assert_eq!(config.location.gpsd_host, "127.0.0.1");
        assert!(!config.session.keep_awake);
        assert_eq!(config.session.inhibitor, InhibitorKind::None);
        assert_eq!(config.display.units, Units::Meters);
    }

    #[test]
    fn test_load_invalid_file_fails_validation() {
        let path = temp_config("invalid.toml", "[location]\nprovider = \"simulated\"\n");
        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"provider\":\"gpsd\""));
        assert!(json.contains("\"units\":\"feet\""));
    }

    #[test]
    fn test_location_config_deserialize() {
        let json = r#"{"provider": "simulated", "simulated_track": "t.json"}"#;
        let location: LocationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(location.provider, ProviderKind::Simulated);
        assert_eq!(location.simulated_track, Some(PathBuf::from("t.json")));
        assert_eq!(location.gpsd_port, 2947);
    }
}
