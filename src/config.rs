//! # Configuration Management Module
//!
//! Persistent review settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `data_dir`: Directory holding one `<session id>.json` per session
//! - `export_dir`: Where export files are written
//! - `primary_channel`: Channel used by point-based segmentation by default
//! - `axis_padding`: Fraction of the visible span added on each side of the time axis
//! - `delimiter`: Export cell delimiter, a single ASCII character
//! - `session_cache_size`: Parsed sessions kept in memory by the file store
//! - `export_concurrency`: Sessions fetched at once during a batch export
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/zen-review/config.toml
//! - Linux: ~/.config/zen-review/config.toml
//! - Windows: %APPDATA%\zen-review\config.toml
//!
//! Missing keys fall back to their defaults, so older files keep loading.

use crate::error::ConfigError;
use crate::export::DEFAULT_DELIMITER;
use crate::view::DEFAULT_AXIS_PADDING;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "zen-review";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub primary_channel: String,
    pub axis_padding: f64,
    #[serde(with = "ascii_delimiter")]
    pub delimiter: u8,
    pub session_cache_size: usize,
    pub export_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            data_dir: base.join("sessions"),
            export_dir: base.join("exports"),
            primary_channel: "heart_rate".to_string(),
            axis_padding: DEFAULT_AXIS_PADDING,
            delimiter: DEFAULT_DELIMITER,
            session_cache_size: 16,
            export_concurrency: 4,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Load config from a file, or write and return defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::ParseFailed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                log::info!("Created default config at {}", path.display());
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }
}

/// Stores the delimiter byte as a one-character string
mod ascii_delimiter {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delimiter: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0u8; 4];
        serializer.serialize_str(char::from(*delimiter).encode_utf8(&mut buf))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(de::Error::custom(format!(
                "delimiter must be a single ASCII character, got '{}'",
                text
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.primary_channel, "heart_rate");
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.axis_padding, 0.05);
        assert_eq!(config.session_cache_size, 16);
        assert_eq!(config.export_concurrency, 4);
        assert!(config.data_dir.ends_with("sessions"));
    }

    #[test]
    fn test_config_deserialization_fills_missing_keys() {
        let toml_str = r#"
            primary_channel = "rr_interval"
            delimiter = "\t"
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.primary_channel, "rr_interval");
        assert_eq!(config.delimiter, b'\t');
        assert_eq!(config.export_concurrency, 4);
    }

    #[test]
    fn test_config_load_creates_default() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_config_save_and_reload() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config {
            delimiter: b';',
            axis_padding: 0.1,
            export_dir: temp_dir.path().join("out"),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_config_parse_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "axis_padding = \"wide\"").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_config_rejects_non_ascii_delimiter() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "delimiter = \"é\"").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed(_))
        ));
        assert!(toml::from_str::<Config>("delimiter = \",;\"").is_err());
    }
}
