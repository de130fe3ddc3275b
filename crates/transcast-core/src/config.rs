//! Configuration management (`transcast.toml`).
//!
//! Resolution order for the config file:
//! 1. explicit path (`--config`)
//! 2. `TRANSCAST_CONFIG` environment variable
//! 3. `./transcast.toml`
//! 4. `$XDG_CONFIG_HOME/transcast/transcast.toml` (platform config dir)
//!
//! A missing file at steps 2–4 falls back to defaults; a missing explicit
//! path is an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::transport::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHANNEL_NAME};

/// Config file name looked up in the working directory and config dir.
pub const CONFIG_FILE_NAME: &str = "transcast.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TRANSCAST_CONFIG";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Well-known channel name shared by all windows.
    pub name: String,
    /// Frames buffered per channel before slow receivers start lagging.
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_string(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Reveal pacing and run finalization timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay contributed by each UTF-16 code unit of the translated text.
    pub per_char_ms: u64,
    /// Floor for a single reveal delay.
    pub min_delay_ms: u64,
    /// Ceiling for a single reveal delay.
    pub max_delay_ms: u64,
    /// Wait after pacing catches up before the run is finalized.
    pub grace_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            per_char_ms: 100,
            min_delay_ms: 3_000,
            max_delay_ms: 10_000,
            grace_ms: 10_000,
        }
    }
}

impl PacingConfig {
    /// Reveal delay for a text `units` UTF-16 code units long.
    #[must_use]
    pub fn reveal_delay(&self, units: usize) -> Duration {
        let raw = (units as u64).saturating_mul(self.per_char_ms);
        Duration::from_millis(raw.clamp(self.min_delay_ms, self.max_delay_ms.max(self.min_delay_ms)))
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Multiply every duration by `factor` (accelerated replays).
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |ms: u64| -> u64 {
            if factor <= 0.0 {
                return 0;
            }
            (ms as f64 * factor).round() as u64
        };
        Self {
            per_char_ms: scale(self.per_char_ms),
            min_delay_ms: scale(self.min_delay_ms),
            max_delay_ms: scale(self.max_delay_ms),
            grace_ms: scale(self.grace_ms),
        }
    }
}

/// Display projection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// How long surfaces keep showing the last run after it ends.
    pub fade_out_ms: u64,
    /// Slots in the grid projection.
    pub grid_cells: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fade_out_ms: 5_250,
            grid_cells: 56,
        }
    }
}

impl DisplayConfig {
    #[must_use]
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    /// Multiply the fade-out by `factor`, matching [`PacingConfig::scaled`].
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let fade_out_ms = if factor <= 0.0 {
            0
        } else {
            (self.fade_out_ms as f64 * factor).round() as u64
        };
        Self {
            fade_out_ms,
            ..*self
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channel: ChannelConfig,
    pub pacing: PacingConfig,
    pub display: DisplayConfig,
    pub logging: LogConfig,
}

impl Config {
    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    /// Load from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Load using the standard resolution order, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match resolve_config_path(None) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load_from(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "channel.name must not be empty".to_string(),
            ));
        }
        if self.channel.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel.capacity must be at least 1".to_string(),
            ));
        }
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "pacing.min_delay_ms ({}) exceeds pacing.max_delay_ms ({})",
                self.pacing.min_delay_ms, self.pacing.max_delay_ms
            )));
        }
        if self.display.grid_cells == 0 {
            return Err(ConfigError::ValidationError(
                "display.grid_cells must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Find the config file to load, if any exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    let user = default_config_path()?;
    user.exists().then_some(user)
}

/// Platform config location, whether or not it exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("transcast").join(CONFIG_FILE_NAME))
}
