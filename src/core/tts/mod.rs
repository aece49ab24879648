pub mod azure;
mod base;

pub use azure::{AZURE_TTS_WS_URL, AzureAudioFormat, AzureTTS, AzureTTSConfig, AzureVoice};
pub use base::{AudioBuffer, AudioSink, TTSError, TTSResult};
