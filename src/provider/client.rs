//! HTTP client for the managed inference provider.
//!
//! Two calls, both authenticated with the configured bearer token and tagged
//! with the relay's request id so provider-side logs can be correlated:
//!
//! - `POST {base_url}/audio/transcriptions`: multipart upload of the WAV
//!   stream, answered with a JSON envelope containing the transcript
//! - `POST {base_url}/audio/speech`: JSON synthesis request, answered with
//!   raw WAV bytes
//!
//! Transport failures and non-2xx upstream statuses both surface as
//! `AppError::Upstream`, which the device sees as HTTP 502.

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::logging::REQUEST_ID_HEADER;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Longest upstream error body we copy into our own error message.
/// Provider gateways return HTML error pages at times; a prefix is enough
/// for diagnosis.
const ERROR_BODY_SNIPPET_LEN: usize = 200;

/// The provider's transcription response, reduced to the field we forward.
#[derive(Debug, Deserialize)]
pub struct Transcription {
    pub text: String,
}

/// Shared HTTP client for all provider calls.
///
/// Built once at startup and cloned into handlers via `AppState`; the inner
/// `reqwest::Client` is reference-counted, so every clone shares one
/// connection pool and one TLS session cache.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Upload a WAV stream for transcription and return the transcript text.
    ///
    /// The audio goes up as a multipart file part named `file` with filename
    /// `audio.wav`; the provider sniffs the container header we synthesized,
    /// which is why headerless uploads never make it past its validation.
    pub async fn transcribe(
        &self,
        cfg: &ProviderConfig,
        wav: Vec<u8>,
        request_id: &str,
    ) -> AppResult<String> {
        let url = endpoint_url(&cfg.base_url, "audio/transcriptions");
        let wav_len = wav.len();

        let file_part = multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AppError::Internal(format!("Building multipart request: {}", e)))?;

        let form = multipart::Form::new()
            .text("model", cfg.transcription_model.clone())
            .text("response_format", "json")
            .part("file", file_part);

        debug!(
            url = %url,
            model = %cfg.transcription_model,
            bytes = wav_len,
            request_id = %request_id,
            "Sending transcription request to provider"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Transcription request failed with status {}: {}",
                status,
                snippet(&body)
            )));
        }

        let transcription: Transcription = response.json().await?;
        Ok(transcription.text.trim().to_string())
    }

    /// Request speech synthesis and return the provider's WAV bytes.
    ///
    /// `voice` overrides the configured default for a single request. The
    /// response format is pinned to `wav` because that is the only container
    /// the device-side reshaping knows how to strip.
    pub async fn synthesize(
        &self,
        cfg: &ProviderConfig,
        text: &str,
        voice: Option<&str>,
        request_id: &str,
    ) -> AppResult<Vec<u8>> {
        let url = endpoint_url(&cfg.base_url, "audio/speech");
        let chosen_voice = voice.unwrap_or(&cfg.voice);

        let body = json!({
            "model": cfg.speech_model,
            "input": text,
            "voice": chosen_voice,
            "response_format": "wav",
        });

        debug!(
            url = %url,
            model = %cfg.speech_model,
            voice = %chosen_voice,
            chars = text.len(),
            request_id = %request_id,
            "Sending synthesis request to provider"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Speech request failed with status {}: {}",
                status,
                snippet(&body)
            )));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Join the configured base URL and an API path, tolerating a trailing slash
/// in the configuration.
fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// First `ERROR_BODY_SNIPPET_LEN` characters of an upstream error body.
fn snippet(body: &str) -> String {
    body.chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joining() {
        assert_eq!(
            endpoint_url("https://api.openai.com/v1", "audio/speech"),
            "https://api.openai.com/v1/audio/speech"
        );
        // Trailing slash in the configured base must not double up
        assert_eq!(
            endpoint_url("https://gateway.local/v1/", "audio/transcriptions"),
            "https://gateway.local/v1/audio/transcriptions"
        );
    }

    #[test]
    fn test_transcription_envelope_parsing() {
        let parsed: Transcription =
            serde_json::from_str(r#"{"text": " turn on the lights "}"#).unwrap();
        // Trimming happens in transcribe(), not during parsing
        assert_eq!(parsed.text, " turn on the lights ");

        // Extra provider fields are ignored
        let parsed: Transcription =
            serde_json::from_str(r#"{"text": "hi", "duration": 1.5, "language": "en"}"#).unwrap();
        assert_eq!(parsed.text, "hi");
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let long_body = "x".repeat(1000);
        assert_eq!(snippet(&long_body).len(), ERROR_BODY_SNIPPET_LEN);
        assert_eq!(snippet("short"), "short");
    }
}
