//! JSON payloads exchanged with the Azure speech service.
//!
//! - **Outgoing**: the bodies of the `speech.config` and `synthesis.context`
//!   frames. Their field names are dictated by the browser Speech SDK the
//!   service expects to talk to.
//! - **Voice catalog**: entries of the voice list returned by the HTTP lookup.

use serde::{Deserialize, Serialize};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Body of the `speech.config` frame: identifies the client.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechConfigMessage {
    pub context: SpeechConfigContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeechConfigContext {
    pub system: SystemInfo,
}

/// Client identity reported to the service.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub build: &'static str,
    pub lang: &'static str,
    pub os: OsInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct OsInfo {
    pub platform: &'static str,
    pub name: &'static str,
    pub version: &'static str,
}

impl Default for SpeechConfigMessage {
    fn default() -> Self {
        Self {
            context: SpeechConfigContext {
                system: SystemInfo {
                    name: "SpeechSDK",
                    version: "1.19.0",
                    build: "JavaScript",
                    lang: "JavaScript",
                    os: OsInfo {
                        platform: "Browser/Linux x86_64",
                        name: "Mozilla/5.0 (X11; Linux x86_64; rv:78.0) Gecko/20100101 Firefox/78.0",
                        version: "5.0 (X11)",
                    },
                },
            },
        }
    }
}

/// Body of the `synthesis.context` frame: selects the output format and turns
/// boundary metadata off so the stream only carries audio and turn markers.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisContextMessage {
    pub synthesis: SynthesisSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisSection {
    pub audio: AudioSection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSection {
    pub metadata_options: MetadataOptions,
    pub output_format: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOptions {
    pub sentence_boundary_enabled: bool,
    pub word_boundary_enabled: bool,
}

impl SynthesisContextMessage {
    pub fn new(output_format: impl Into<String>) -> Self {
        Self {
            synthesis: SynthesisSection {
                audio: AudioSection {
                    metadata_options: MetadataOptions {
                        sentence_boundary_enabled: false,
                        word_boundary_enabled: false,
                    },
                    output_format: output_format.into(),
                },
            },
        }
    }
}

// =============================================================================
// Voice Catalog
// =============================================================================

/// One entry of the voice list.
///
/// Only the fields the client relies on are typed; the rest of the entry is
/// kept in `extra` so nothing the service returns is lost on re-serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AzureVoice {
    /// Full service name, e.g. "Microsoft Server Speech Text to Speech Voice (en-US, JennyNeural)"
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub local_name: String,
    /// Name used in SSML `<voice name="...">`, e.g. "en-US-JennyNeural"
    pub short_name: String,
    #[serde(default)]
    pub gender: String,
    pub locale: String,
    #[serde(default)]
    pub sample_rate_hertz: Option<String>,
    #[serde(default)]
    pub voice_type: Option<String>,
    #[serde(default)]
    pub style_list: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
