use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::AudioSettings;
use crate::session::CallConfig;

/// Environment variables with this prefix override the file, e.g.
/// `DUPLEX_CALL__CALL__ENDPOINT=wss://example.org/ws`
pub const ENV_PREFIX: &str = "DUPLEX_CALL";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub call: CallConfig,
    pub audio: AudioConfig,
    pub settings: AudioSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "duplex-call".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8790,
        }
    }
}

/// Devices used by the binary
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// WAV file replayed as the microphone
    pub input_path: Option<String>,
    /// Directory where playback clips are written while they play
    pub playback_dir: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            playback_dir: "~/.duplex-call/playback".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (extension optional, file optional) and apply environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
