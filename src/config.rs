//! Configuration file at ~/.calorie-quest/config.toml.
//!
//! Every section is optional; missing keys fall back to the defaults below.

use crate::location::device::DEFAULT_GPSD_ADDR;
use crate::location::providers::{
    DEFAULT_IP_LOOKUP_URL, DEFAULT_REVERSE_GEOCODE_URL, DEFAULT_USER_AGENT,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub services: ServiceConfig,
    pub search: SearchConfig,
}

/// Which device geolocation backend to use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DeviceConfig {
    Gpsd {
        #[serde(default = "default_gpsd_addr")]
        addr: String,
    },
    Fixed {
        latitude: f64,
        longitude: f64,
    },
    #[serde(rename = "none")]
    Disabled,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::Gpsd {
            addr: default_gpsd_addr(),
        }
    }
}

fn default_gpsd_addr() -> String {
    DEFAULT_GPSD_ADDR.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub ip_lookup_url: String,
    pub reverse_geocode_url: String,
    /// Sent as User-Agent on every outbound lookup.
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            reverse_geocode_url: DEFAULT_REVERSE_GEOCODE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the restaurant search backend.
    pub base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

impl Config {
    /// Load from the default location. A missing or broken file yields defaults.
    pub fn load() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            info!("No config at {}, using defaults.", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load from an explicit path. Errors are returned, not papered over.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".calorie-quest")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.device,
            DeviceConfig::Gpsd { addr: "127.0.0.1:2947".into() }
        );
        assert_eq!(config.services.user_agent, "CalorieQuest/1.0");
    }

    #[test]
    fn test_fixed_device_and_partial_sections() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[device]
backend = "fixed"
latitude = 44.98
longitude = -93.27

[services]
http_timeout_secs = 3

[search]
base_url = "https://api.example.test"
"#,
        );
        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.device,
            DeviceConfig::Fixed { latitude: 44.98, longitude: -93.27 }
        );
        assert_eq!(config.services.http_timeout_secs, 3);
        assert_eq!(config.services.ip_lookup_url, "https://ipapi.co/json/");
        assert_eq!(config.search.base_url, "https://api.example.test");
    }

    #[test]
    fn test_disabled_device() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[device]\nbackend = \"none\"\n");
        assert_eq!(Config::load_from(&path).unwrap().device, DeviceConfig::Disabled);
    }

    #[test]
    fn test_gpsd_custom_addr() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[device]\nbackend = \"gpsd\"\naddr = \"10.0.0.5:2947\"\n");
        assert_eq!(
            Config::load_from(&path).unwrap().device,
            DeviceConfig::Gpsd { addr: "10.0.0.5:2947".into() }
        );
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[device]\nbackend = \"satellite\"\n");
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Read { .. })));
    }
}
