/// Application configuration
///
/// Read from `<config dir>/spotmap/config.json` when present, then overridden
/// by `SPOTMAP_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::state::data::{GeoPoint, OwnerId};

pub const DEFAULT_SHARE_URL: &str = "https://spotmap.app";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid default centre: {0}")]
    Center(#[from] crate::state::data::ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// REST backend; `None` keeps everything in the local catalog
    pub api_url: Option<String>,
    /// Identity handed over by the sign-in provider
    pub owner_id: Option<OwnerId>,
    /// Map centre before the first position fix
    pub default_center: GeoPoint,
    pub default_zoom: f64,
    /// Base for share links
    pub share_url: String,
    /// Local catalog location
    pub database_path: Option<PathBuf>,
    /// JSON-lines sensor recording to replay instead of real sensors
    pub sensor_replay: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            owner_id: None,
            default_center: GeoPoint {
                latitude: 40.7128,
                longitude: -74.0060,
            },
            default_zoom: 15.0,
            share_url: DEFAULT_SHARE_URL.to_string(),
            database_path: None,
            sensor_replay: None,
        }
    }
}

impl AppConfig {
    /// `<config dir>/spotmap/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("spotmap").join("config.json"))
    }

    /// Config file (if any) plus environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                debug!("no config file, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Apply `SPOTMAP_*` overrides; empty values clear optional settings
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(url) = optional("SPOTMAP_API_URL") {
            self.api_url = (!url.is_empty()).then_some(url);
        }
        if let Some(owner) = optional("SPOTMAP_OWNER") {
            self.owner_id = (!owner.is_empty()).then(|| OwnerId(owner));
        }
        if let Some(path) = optional("SPOTMAP_SENSOR_REPLAY") {
            self.sensor_replay = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(path) = optional("SPOTMAP_DB") {
            self.database_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        match optional("SPOTMAP_SHARE_URL") {
            Some(url) if !url.is_empty() => self.share_url = url,
            Some(_) => warn!("SPOTMAP_SHARE_URL is empty, keeping {}", self.share_url),
            None => {}
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_center.validate()?;
        Ok(())
    }

    /// Where the local catalog lives
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("spotmap").join("catalog.db")))
    }
}
