use crate::audio::wav::{wrap_pcm, PcmFormat};
use crate::config::AudioConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::logging::RequestId;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Format parameters the device may send alongside its raw samples.
/// Anything omitted falls back to the configured audio defaults.
#[derive(Debug, Deserialize)]
pub struct TranscribeQuery {
    pub rate: Option<u32>,
    pub bits: Option<u16>,
    pub channels: Option<u16>,
}

pub async fn transcribe(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<TranscribeQuery>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let config = state.get_config();

    if body.is_empty() {
        return Err(AppError::BadRequest("Empty audio payload".to_string()));
    }

    let format = resolve_format(&query, &config.audio)?;
    let request_id = RequestId::from_request(&req);

    info!(
        request_id = %request_id,
        bytes = body.len(),
        sample_rate = format.sample_rate,
        bits = format.bits_per_sample,
        channels = format.channels,
        "Handling transcription request"
    );

    // The provider rejects headerless audio, so containerize before upload
    let wav = wrap_pcm(&body, &format);
    let text = state
        .provider
        .transcribe(&config.provider, wav, &request_id)
        .await?;

    // The device firmware only understands this flat envelope
    Ok(HttpResponse::Ok().json(json!({ "text": text })))
}

/// Merge query parameters with configured defaults into a concrete format.
///
/// The container writer itself encodes anything, so implausible values are
/// stopped here: a zero in any field would declare audio no decoder can play.
fn resolve_format(query: &TranscribeQuery, defaults: &AudioConfig) -> AppResult<PcmFormat> {
    let format = PcmFormat::new(
        query.rate.unwrap_or(defaults.sample_rate),
        query.bits.unwrap_or(defaults.bits_per_sample),
        query.channels.unwrap_or(defaults.channels),
    );

    if format.sample_rate == 0 || format.bits_per_sample == 0 || format.channels == 0 {
        return Err(AppError::ValidationError(
            "Audio format parameters must be greater than 0".to_string(),
        ));
    }

    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AudioConfig {
        AudioConfig {
            sample_rate: 16000,
            bits_per_sample: 16,
            channels: 1,
            max_payload_bytes: 10 * 1024 * 1024,
        }
    }

    #[test]
    fn test_query_parsing() {
        let query =
            web::Query::<TranscribeQuery>::from_query("rate=8000&bits=8&channels=2").unwrap();
        assert_eq!(query.rate, Some(8000));
        assert_eq!(query.bits, Some(8));
        assert_eq!(query.channels, Some(2));

        // Unrelated parameters (like the auth token) are ignored
        let query = web::Query::<TranscribeQuery>::from_query("token=abc&rate=22050").unwrap();
        assert_eq!(query.rate, Some(22050));
        assert_eq!(query.bits, None);

        let query = web::Query::<TranscribeQuery>::from_query("").unwrap();
        assert_eq!(query.rate, None);

        // Non-numeric values are a parse failure, not a silent default
        assert!(web::Query::<TranscribeQuery>::from_query("rate=fast").is_err());
    }

    #[test]
    fn test_resolve_format_defaults_and_overrides() {
        let none = TranscribeQuery {
            rate: None,
            bits: None,
            channels: None,
        };
        let format = resolve_format(&none, &defaults()).unwrap();
        assert_eq!(format, PcmFormat::new(16000, 16, 1));

        let partial = TranscribeQuery {
            rate: Some(44100),
            bits: None,
            channels: Some(2),
        };
        let format = resolve_format(&partial, &defaults()).unwrap();
        assert_eq!(format, PcmFormat::new(44100, 16, 2));
    }

    #[test]
    fn test_resolve_format_rejects_zeros() {
        for (rate, bits, channels) in [(Some(0), None, None), (None, Some(0), None), (None, None, Some(0))] {
            let query = TranscribeQuery {
                rate,
                bits,
                channels,
            };
            assert!(matches!(
                resolve_format(&query, &defaults()),
                Err(AppError::ValidationError(_))
            ));
        }
    }
}
