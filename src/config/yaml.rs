use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// azure:
///   endpoint: "wss://eastus.api.speech.microsoft.com/cognitiveservices/websocket/v1?TricType=AzureDemo&Authorization=bearer%20undefined"
///   voices_url: "https://eastus.api.speech.microsoft.com/cognitiveservices/voices/list"
///   handshake_timeout_ms: 5000
///   write_timeout_ms: 5000
///   max_inbound_bytes: 2000000
///   synthesis_timeout_ms: 60000   # 0 disables the deadline
///
/// synthesis:
///   output_format: "audio-24khz-48kbitrate-mono-mp3"
///   voice: "en-US-JennyNeural"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub azure: Option<AzureYaml>,
    pub synthesis: Option<SynthesisYaml>,
}

/// Connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AzureYaml {
    pub endpoint: Option<String>,
    pub voices_url: Option<String>,
    pub handshake_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub max_inbound_bytes: Option<usize>,
    pub synthesis_timeout_ms: Option<u64>,
}

/// Synthesis defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub output_format: Option<String>,
    pub voice: Option<String>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
