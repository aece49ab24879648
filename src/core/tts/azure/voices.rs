//! Voice catalog lookup over plain HTTP.

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::{debug, error};

use super::config::BROWSER_ORIGIN;
use super::messages::AzureVoice;
use crate::core::tts::base::{TTSError, TTSResult};
use crate::utils::ensure_crypto_provider;

// The voice list endpoint answers the Speech Studio web page, so we send its headers.
const VOICES_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36 Edg/107.0.1418.26";
const VOICES_MS_USER_AGENT: &str = "SpeechStudio/2021.05.001";

/// Fetch the raw voice list JSON.
///
/// Anything but `200 OK` is an error carrying only the status line.
pub async fn get_voices(voices_url: &str) -> TTSResult<Bytes> {
    ensure_crypto_provider();
    let client = reqwest::Client::new();

    debug!("Fetching Azure voice list from {}", voices_url);

    let response = client
        .get(voices_url)
        .header("User-Agent", VOICES_USER_AGENT)
        .header("X-Ms-Useragent", VOICES_MS_USER_AGENT)
        .header("Content-Type", "application/json")
        .header("Origin", BROWSER_ORIGIN)
        .header("Referer", BROWSER_ORIGIN)
        .send()
        .await
        .map_err(|e| TTSError::VoiceListFailed(format!("Request failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        let err = TTSError::VoiceListFailed(format!("Azure voices API returned {status}"));
        error!("{}", err);
        return Err(err);
    }

    response
        .bytes()
        .await
        .map_err(|e| TTSError::VoiceListFailed(format!("Failed to read response body: {e}")))
}

/// Fetch and parse the voice list.
pub async fn list_voices(voices_url: &str) -> TTSResult<Vec<AzureVoice>> {
    let body = get_voices(voices_url).await?;
    let voices: Vec<AzureVoice> = serde_json::from_slice(&body)
        .map_err(|e| TTSError::SerializationError(format!("Invalid voice list: {e}")))?;

    debug!("Azure voice list has {} voices", voices.len());
    Ok(voices)
}
