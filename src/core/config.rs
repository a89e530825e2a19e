//! Runtime configuration
//!
//! Every field has a default so an empty JSON object is a valid config.
//! Durations use humantime strings ("30s", "16ms", "15m").

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::registry::{Category, CategoryRegistry};
use super::wire::CoordinatePolicy;

/// Env var naming a JSON config file
pub const CONFIG_ENV: &str = "MIRROR_MAP_CONFIG";
/// Env var overriding the page origin
pub const ORIGIN_ENV: &str = "MIRROR_MAP_ORIGIN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How arrival times are assigned to the records of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// All records of a frame appear at decode time
    #[default]
    Simultaneous,
    /// Each record appears after its own random delay in [0, max_delay)
    Staggered {
        #[serde(with = "humantime_serde")]
        max_delay: Duration,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    /// How long a hit stays on the map
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Render tick interval
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Backoff before reconnecting after a close or error
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Stream path on the page origin
    pub ws_path: String,

    /// Page origin for native builds, e.g. "https://mirror.example.org"
    pub origin: Option<String>,

    pub timestamps: TimestampPolicy,

    pub coordinates: CoordinatePolicy,

    /// Cap on buffered events
    pub max_events: usize,

    /// Marker radius in pixels
    pub marker_radius: f32,

    /// Category registry; the mirror project table when absent
    pub categories: Option<Vec<Category>>,

    /// Map image drawn under the markers: a file path on native builds, the
    /// id of an `<img>` element in the browser. A generated graticule when absent.
    pub background: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            tick_interval: Duration::from_millis(1000 / 60),
            reconnect_delay: Duration::from_millis(5000),
            ws_path: "/ws".to_string(),
            origin: None,
            timestamps: TimestampPolicy::default(),
            coordinates: CoordinatePolicy::default(),
            max_events: 100_000,
            marker_radius: 2.0,
            categories: None,
            background: None,
        }
    }
}

impl MapConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load from `MIRROR_MAP_CONFIG` (or defaults), then apply `MIRROR_MAP_ORIGIN`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                info!(path = %path, "Loading config file");
                Self::load(path)?
            }
            Err(_) => Self::default(),
        };
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            config.origin = Some(origin);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::Invalid("window must be > 0".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid("tick_interval must be > 0".into()));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/', got {:?}",
                self.ws_path
            )));
        }
        if self.max_events == 0 {
            return Err(ConfigError::Invalid("max_events must be > 0".into()));
        }
        if self.background.as_deref().is_some_and(|b| b.trim().is_empty()) {
            return Err(ConfigError::Invalid("background must not be empty".into()));
        }
        if matches!(self.categories.as_deref(), Some([])) {
            return Err(ConfigError::Invalid("categories must not be empty".into()));
        }
        Ok(())
    }

    /// Build the category registry this config describes
    pub fn registry(&self) -> CategoryRegistry {
        match &self.categories {
            Some(categories) => CategoryRegistry::new(categories.clone()),
            None => CategoryRegistry::mirror_projects(),
        }
    }

    pub fn window_secs(&self) -> f64 {
        self.window.as_secs_f64()
    }
}
