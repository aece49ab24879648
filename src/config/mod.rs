//! Configuration module for the azure-tts client
//!
//! This module handles client configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//!
//! # Example
//! ```rust,no_run
//! use azure_speech_stream::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ClientConfig::from_file(&config_path)?;
//!
//! println!("Synthesizing with {}", config.voice);
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::core::tts::azure::config::{
    AZURE_TTS_WS_URL, AZURE_VOICES_URL, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_INBOUND_BYTES,
    DEFAULT_SYNTHESIS_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
use crate::core::tts::azure::{AzureAudioFormat, AzureTTSConfig, DEFAULT_VOICE};
use crate::core::tts::TTSError;

mod yaml;

pub use yaml::YamlConfig;

pub const ENV_ENDPOINT: &str = "AZURE_TTS_ENDPOINT";
pub const ENV_VOICES_URL: &str = "AZURE_TTS_VOICES_URL";
pub const ENV_HANDSHAKE_TIMEOUT_MS: &str = "AZURE_TTS_HANDSHAKE_TIMEOUT_MS";
pub const ENV_WRITE_TIMEOUT_MS: &str = "AZURE_TTS_WRITE_TIMEOUT_MS";
pub const ENV_MAX_INBOUND_BYTES: &str = "AZURE_TTS_MAX_INBOUND_BYTES";
pub const ENV_SYNTHESIS_TIMEOUT_MS: &str = "AZURE_TTS_SYNTHESIS_TIMEOUT_MS";
pub const ENV_OUTPUT_FORMAT: &str = "AZURE_TTS_OUTPUT_FORMAT";
pub const ENV_VOICE: &str = "AZURE_TTS_VOICE";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Invalid(#[from] TTSError),
}

/// Client configuration
///
/// Contains everything the CLI needs to build an [`AzureTTSConfig`] plus the
/// synthesis defaults (output format, voice).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub voices_url: String,
    pub handshake_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_inbound_bytes: usize,
    /// End-to-end synthesis deadline; 0 disables it
    pub synthesis_timeout_ms: u64,
    pub output_format: String,
    pub voice: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: AZURE_TTS_WS_URL.to_string(),
            voices_url: AZURE_VOICES_URL.to_string(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT.as_millis() as u64,
            max_inbound_bytes: DEFAULT_MAX_INBOUND_BYTES,
            synthesis_timeout_ms: DEFAULT_SYNTHESIS_TIMEOUT.as_millis() as u64,
            output_format: AzureAudioFormat::default().as_str().to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables on top of defaults
    ///
    /// The .env file is loaded in main.rs at startup, so its values are
    /// visible here as regular environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_env()?;
        config.apply_yaml(yaml_config);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(endpoint) = env_var::<String>(ENV_ENDPOINT)? {
            self.endpoint = endpoint;
        }
        if let Some(voices_url) = env_var::<String>(ENV_VOICES_URL)? {
            self.voices_url = voices_url;
        }
        if let Some(ms) = env_var(ENV_HANDSHAKE_TIMEOUT_MS)? {
            self.handshake_timeout_ms = ms;
        }
        if let Some(ms) = env_var(ENV_WRITE_TIMEOUT_MS)? {
            self.write_timeout_ms = ms;
        }
        if let Some(bytes) = env_var(ENV_MAX_INBOUND_BYTES)? {
            self.max_inbound_bytes = bytes;
        }
        if let Some(ms) = env_var(ENV_SYNTHESIS_TIMEOUT_MS)? {
            self.synthesis_timeout_ms = ms;
        }
        if let Some(format) = env_var::<String>(ENV_OUTPUT_FORMAT)? {
            self.output_format = format;
        }
        if let Some(voice) = env_var::<String>(ENV_VOICE)? {
            self.voice = voice;
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(azure) = yaml.azure {
            if let Some(endpoint) = azure.endpoint {
                self.endpoint = endpoint;
            }
            if let Some(voices_url) = azure.voices_url {
                self.voices_url = voices_url;
            }
            if let Some(ms) = azure.handshake_timeout_ms {
                self.handshake_timeout_ms = ms;
            }
            if let Some(ms) = azure.write_timeout_ms {
                self.write_timeout_ms = ms;
            }
            if let Some(bytes) = azure.max_inbound_bytes {
                self.max_inbound_bytes = bytes;
            }
            if let Some(ms) = azure.synthesis_timeout_ms {
                self.synthesis_timeout_ms = ms;
            }
        }
        if let Some(synthesis) = yaml.synthesis {
            if let Some(format) = synthesis.output_format {
                self.output_format = format;
            }
            if let Some(voice) = synthesis.voice {
                self.voice = voice;
            }
        }
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tts_config().validate()?;

        if self.voice.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "voice",
                value: self.voice.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.output_format.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "output_format",
                value: self.output_format.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.output_format.parse::<AzureAudioFormat>().is_err() {
            warn!(
                "Output format {} is not a known Azure format, sending it as is",
                self.output_format
            );
        }
        Ok(())
    }

    /// Transport and session settings for [`AzureTTS`](crate::core::tts::AzureTTS)
    pub fn tts_config(&self) -> AzureTTSConfig {
        AzureTTSConfig {
            endpoint: self.endpoint.clone(),
            voices_url: self.voices_url.clone(),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            max_inbound_bytes: self.max_inbound_bytes,
            synthesis_timeout: (self.synthesis_timeout_ms > 0)
                .then(|| Duration::from_millis(self.synthesis_timeout_ms)),
        }
    }
}

/// Read and parse an environment variable; unset or blank means `None`.
fn env_var<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value,
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}
