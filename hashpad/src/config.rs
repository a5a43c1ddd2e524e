use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::capacity::MAX_CHANNEL_LENGTH;
use crate::channel::WriteMode;
use crate::codec::MAX_DECODED_BYTES;
use crate::scheduler::DEFAULT_SAVE_DELAY_MS;

const ENV_WRITE_MODE: &str = "HASHPAD_WRITE_MODE";
const ENV_SAVE_DELAY_MS: &str = "HASHPAD_SAVE_DELAY_MS";
const MAX_SAVE_DELAY_MS: u64 = 60_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_max_channel_length")]
    pub max_channel_length: usize,
    #[serde(default = "default_save_delay_ms")]
    pub save_delay_ms: u64,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default = "default_max_decoded_bytes")]
    pub max_decoded_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_channel_length: default_max_channel_length(),
            save_delay_ms: default_save_delay_ms(),
            write_mode: WriteMode::default(),
            max_decoded_bytes: default_max_decoded_bytes(),
        }
    }
}

impl EngineConfig {
    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                serde_json::from_str::<EngineConfig>(&content)?
            }
            _ => EngineConfig::default(),
        };

        let config = apply_env_overrides(config, |key| std::env::var(key).ok());
        validate(normalize(config))
    }
}

fn default_max_channel_length() -> usize {
    MAX_CHANNEL_LENGTH
}

fn default_save_delay_ms() -> u64 {
    DEFAULT_SAVE_DELAY_MS
}

fn default_max_decoded_bytes() -> usize {
    MAX_DECODED_BYTES
}

fn apply_env_overrides(
    mut config: EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> EngineConfig {
    if let Some(value) = lookup(ENV_WRITE_MODE) {
        match value.parse::<WriteMode>() {
            Ok(mode) => config.write_mode = mode,
            Err(err) => warn!("ignoring {ENV_WRITE_MODE}: {err}"),
        }
    }
    if let Some(value) = lookup(ENV_SAVE_DELAY_MS) {
        match value.trim().parse::<u64>() {
            Ok(delay) => config.save_delay_ms = delay,
            Err(err) => warn!("ignoring {ENV_SAVE_DELAY_MS}: {err}"),
        }
    }
    config
}

fn normalize(mut config: EngineConfig) -> EngineConfig {
    if config.max_channel_length == 0 {
        config.max_channel_length = default_max_channel_length();
    }
    if config.save_delay_ms == 0 {
        config.save_delay_ms = default_save_delay_ms();
    }
    if config.max_decoded_bytes == 0 {
        config.max_decoded_bytes = default_max_decoded_bytes();
    }
    config
}

fn validate(config: EngineConfig) -> Result<EngineConfig, ConfigError> {
    if config.save_delay_ms > MAX_SAVE_DELAY_MS {
        return Err(ConfigError::Invalid(format!(
            "saveDelayMs must be at most {MAX_SAVE_DELAY_MS}"
        )));
    }
    if config.max_channel_length < 16 {
        return Err(ConfigError::Invalid(
            "maxChannelLength must be at least 16".to_string(),
        ));
    }
    Ok(config)
}
