use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;
use crate::player::DEFAULT_VOLUME;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Where the station catalog lives and how many selection slots exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog file; relative paths are taken from the working directory.
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    /// Number of station slots on the selection surface. Extra stations are ignored.
    #[serde(default = "default_slot_count")]
    pub slot_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Engine volume (0–100) applied whenever a stream starts.
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Start the stream as soon as a station is selected.
    #[serde(default = "default_true")]
    pub autoplay_on_select: bool,
    /// Select slot 0 once the catalog is loaded.
    #[serde(default = "default_true")]
    pub select_first_on_start: bool,
}

/// Settings for the http transport used for remote logos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Responses larger than this are refused.
    #[serde(default = "default_max_logo_bytes")]
    pub max_logo_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            slot_count: default_slot_count(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            autoplay_on_select: true,
            select_first_on_start: true,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
            max_logo_bytes: default_max_logo_bytes(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("stations.json")
}

fn default_slot_count() -> usize {
    8
}

fn default_volume() -> u8 {
    DEFAULT_VOLUME
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("radio-kiosk/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_logo_bytes() -> u64 {
    8 * 1024 * 1024
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8989
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.catalog.path, PathBuf::from("stations.json"));
        assert_eq!(config.catalog.slot_count, 8);
        assert_eq!(config.playback.default_volume, 100);
        assert!(config.playback.autoplay_on_select);
        assert!(config.playback.select_first_on_start);
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8989);
        assert!(config.fetch.user_agent.starts_with("radio-kiosk/"));
        assert!(Config::config_path().ends_with("radio-kiosk/config.toml"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [catalog]
            slot_count = 4

            [playback]
            autoplay_on_select = false
            "#,
        )
        .unwrap();
        assert_eq!(config.catalog.slot_count, 4);
        assert_eq!(config.catalog.path, PathBuf::from("stations.json"));
        assert!(!config.playback.autoplay_on_select);
        assert_eq!(config.playback.default_volume, 100);
        assert_eq!(config.fetch.timeout_secs, 20);
        assert_eq!(config.fetch.max_logo_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.catalog.path = PathBuf::from("/srv/radio/stations.json");
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.catalog.path, config.catalog.path);
        assert_eq!(back.http.bind_address, "127.0.0.1");
    }
}
