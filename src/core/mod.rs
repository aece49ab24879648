pub mod tts;

// Re-export commonly used types for convenience
pub use tts::{
    AZURE_TTS_WS_URL, AudioBuffer, AudioSink, AzureAudioFormat, AzureTTS, AzureTTSConfig,
    AzureVoice, TTSError, TTSResult,
};
