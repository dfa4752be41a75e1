use crate::audio::wav::strip_wav_header;
use crate::error::{AppError, AppResult};
use crate::middleware::logging::RequestId;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;

/// Longest text accepted for synthesis. Matches the provider's own input
/// cap, so over-long requests fail fast with a 400 instead of a 502.
const MAX_SYNTHESIS_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct SynthesizeQuery {
    pub raw: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: Option<String>,
}

pub async fn synthesize(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<SynthesizeQuery>,
    body: web::Json<SynthesizeRequest>,
) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let request = body.into_inner();

    let text = validate_text(&request.text)?;
    let want_raw = raw_requested(query.raw.as_deref());
    let request_id = RequestId::from_request(&req);

    info!(
        request_id = %request_id,
        chars = text.chars().count(),
        raw = want_raw,
        "Handling synthesis request"
    );

    let audio = state
        .provider
        .synthesize(&config.provider, text, request.voice.as_deref(), &request_id)
        .await?;

    let (content_type, payload) = if want_raw {
        // Bare samples the device writes straight to its DAC. Streams
        // without the canonical preamble pass through unchanged.
        let samples = strip_wav_header(&audio).map(|s| s.to_vec()).unwrap_or(audio);
        ("application/octet-stream", samples)
    } else {
        ("audio/wav", audio)
    };

    Ok(HttpResponse::Ok().content_type(content_type).body(payload))
}

fn validate_text(text: &str) -> AppResult<&str> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Text must not be empty".to_string()));
    }

    if trimmed.chars().count() > MAX_SYNTHESIS_CHARS {
        return Err(AppError::BadRequest(format!(
            "Text exceeds {} characters",
            MAX_SYNTHESIS_CHARS
        )));
    }

    Ok(trimmed)
}

fn raw_requested(flag: Option<&str>) -> bool {
    matches!(flag, Some("1") | Some("true") | Some("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_parsing() {
        let request: SynthesizeRequest =
            serde_json::from_str(r#"{"text": "hello there"}"#).unwrap();
        assert_eq!(request.text, "hello there");
        assert_eq!(request.voice, None);

        let request: SynthesizeRequest =
            serde_json::from_str(r#"{"text": "hi", "voice": "nova"}"#).unwrap();
        assert_eq!(request.voice.as_deref(), Some("nova"));

        // Missing text is a deserialization failure
        assert!(serde_json::from_str::<SynthesizeRequest>(r#"{"voice": "nova"}"#).is_err());
    }

    #[test]
    fn test_validate_text() {
        assert_eq!(validate_text("  hello  ").unwrap(), "hello");
        assert!(validate_text("").is_err());
        assert!(validate_text("   \n\t ").is_err());

        let long = "a".repeat(MAX_SYNTHESIS_CHARS);
        assert!(validate_text(&long).is_ok());
        let too_long = "a".repeat(MAX_SYNTHESIS_CHARS + 1);
        assert!(validate_text(&too_long).is_err());
    }

    #[test]
    fn test_raw_flag_parsing() {
        assert!(raw_requested(Some("1")));
        assert!(raw_requested(Some("true")));
        assert!(raw_requested(Some("yes")));
        assert!(!raw_requested(Some("0")));
        assert!(!raw_requested(Some("false")));
        assert!(!raw_requested(Some("")));
        assert!(!raw_requested(None));
    }
}
