use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::playback::PlaybackCursor;
use crate::reconciler::ReconcilerSettings;
use crate::sample::{FieldOrder, HeadingUnits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Render events buffered per SSE subscriber before it starts lagging.
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_stream_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_stale_timeout", deserialize_with = "deserialize_duration")]
    pub stale_timeout: Duration,
    #[serde(default = "default_sweep_interval", deserialize_with = "deserialize_duration")]
    pub sweep_interval: Duration,
    #[serde(default)]
    pub default_field_order: FieldOrder,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            stale_timeout: default_stale_timeout(),
            sweep_interval: default_sweep_interval(),
            default_field_order: FieldOrder::default(),
        }
    }
}

fn default_stale_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_min_update_delta", deserialize_with = "deserialize_duration")]
    pub min_update_delta: Duration,
    #[serde(
        default = "default_interpolate_max_gap",
        deserialize_with = "deserialize_duration"
    )]
    pub interpolate_max_gap: Duration,
    #[serde(default)]
    pub heading_units: HeadingUnits,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_update_delta: default_min_update_delta(),
            interpolate_max_gap: default_interpolate_max_gap(),
            heading_units: HeadingUnits::default(),
        }
    }
}

impl PlaybackConfig {
    /// A scrub cursor throttled by `min_update_delta`, or by `min_delta` when
    /// one is given.
    pub fn cursor(&self, min_delta: Option<Duration>) -> PlaybackCursor {
        PlaybackCursor::new(min_delta.unwrap_or(self.min_update_delta))
    }
}

fn default_min_update_delta() -> Duration {
    Duration::from_millis(100)
}

fn default_interpolate_max_gap() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    pub folder: PathBuf,
    /// Load a channel's history the first time it publishes.
    #[serde(default = "default_autoload")]
    pub autoload: bool,
}

fn default_autoload() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    PublishPositions,
    LoadTracks,
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.live.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "live.sweep_interval must be greater than zero".into(),
            ));
        }
        if self.web.stream_capacity == 0 {
            return Err(ConfigError::Invalid(
                "web.stream_capacity must be greater than zero".into(),
            ));
        }
        let mut seen = HashSet::new();
        for key in &self.api_keys {
            if !seen.insert(key.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate API key for {}",
                    key.name
                )));
            }
        }
        Ok(())
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }

    /// With no keys configured the write endpoints are open.
    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            stale_timeout: self.live.stale_timeout,
            default_field_order: self.live.default_field_order.clone(),
            heading_units: self.playback.heading_units,
            interpolate_max_gap: self.playback.interpolate_max_gap,
        }
    }
}
