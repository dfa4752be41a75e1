//! # Error Handling
//!
//! This module defines the relay's error types and how each one turns into an
//! HTTP response the device can act on. It is a good tour of Rust's error
//! handling machinery.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **Purpose**: Forces you to handle both success and failure cases
//! - **T**: The success type (what you get when everything works)
//! - **E**: The error type (what you get when something goes wrong)
//! - **No exceptions**: Rust doesn't have try/catch, it uses Result instead
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of failure
//! - **Data**: Each variant carries a message describing what happened
//! - **Pattern matching**: Use `match` to handle different error types
//!
//! ### Traits for Error Conversion
//! - **From trait**: Automatically converts between error types
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Why the upstream/internal split matters:
//! The device retries on 5xx. A 502 tells its firmware "the provider was
//! unreachable, try again", while a 500 means the relay itself misbehaved.
//! Collapsing the two would hide provider outages from the device's retry
//! logic.

use actix_web::dev::ServiceResponse;           // For the status-code rewrap hook
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Error types for the relay.
///
/// ## Rust Concepts:
/// - **enum**: A type that can be one of several variants
/// - **String**: Each variant holds an error message
/// - **#[derive(Debug)]**: Automatically implements debug printing
///
/// ## Error Categories:
/// - **Internal**: Relay-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **Unauthorized**: Missing or wrong device token (401 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Request parameters failed validation (400 errors)
/// - **Upstream**: The inference provider failed or was unreachable (502 errors)
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::BadRequest("Empty audio payload".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Relay-side errors (container handling bugs, poisoned state, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Device token missing or did not match
    Unauthorized(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Request parameters failed validation rules
    ValidationError(String),

    /// The inference provider rejected the request or could not be reached
    Upstream(String),
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// This trait defines how errors are formatted as human-readable strings.
/// The tracing layer uses it when a request fails.
///
/// ## Rust Concepts:
/// - **impl Trait for Type**: Implementing a trait for our custom type
/// - **match**: Pattern matching to handle each error variant
/// - **write!**: Macro for formatting strings (like printf in C)
/// - **&self**: Immutable reference to the error
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream provider error: {}", msg),
        }
    }
}

/// Implementation of the ResponseError trait for AppError.
///
/// ## Purpose:
/// This trait converts our errors into HTTP responses. Actix calls it
/// automatically whenever a handler returns an Err.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - Unauthorized → 401 (Unauthorized)
/// - NotFound → 404 (Not Found)
/// - Upstream → 502 (Bad Gateway)
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "upstream_error",
///     "message": "transcription request failed with status 429",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
///
/// ## Rust Concepts:
/// - **Tuple destructuring**: `let (a, b, c) = tuple`
/// - **json! macro**: Creates JSON values easily
/// - **StatusCode enum**: HTTP status codes as type-safe values
/// - **.clone()**: Creates a copy of the error message string
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        // Map each error type to HTTP status code, error type, and message
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,  // 500
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,  // 400
                "bad_request",
                msg.clone(),
            ),
            AppError::Unauthorized(msg) => (
                actix_web::http::StatusCode::UNAUTHORIZED,  // 401
                "unauthorized",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,  // 404
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,  // 500
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,  // 400
                "validation_error",
                msg.clone(),
            ),
            AppError::Upstream(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,  // 502
                "upstream_error",
                msg.clone(),
            ),
        };

        // Build the HTTP response with JSON body
        HttpResponse::build(status).json(error_envelope(error_type, &message))
    }
}

/// Builds the JSON envelope every failure response shares.
///
/// ## Envelope Fields:
/// - **type**: Machine-readable error type
/// - **message**: Human-readable error message
/// - **timestamp**: When the error occurred
///
/// Centralized here so responses produced outside AppError (see
/// [`payload_too_large`]) keep the exact shape the device firmware parses.
pub fn error_envelope(error_type: &str, message: &str) -> serde_json::Value {
    json!({
        "error": {
            "type": error_type,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }
    })
}

/// Rewraps actix's plain-text 413 response in the shared JSON envelope.
///
/// Oversized uploads are rejected by the payload extractor before any handler
/// runs, so this is the one client error that never passes through AppError.
/// Registered in main as an `ErrorHandlers` hook for
/// `StatusCode::PAYLOAD_TOO_LARGE`.
pub fn payload_too_large<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let (req, _) = res.into_parts();
    let response = HttpResponse::PayloadTooLarge().json(error_envelope(
        "payload_too_large",
        "Request payload exceeds the configured size limit",
    ));
    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, response).map_into_right_body(),
    ))
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// ## Purpose:
/// The anyhow crate provides general-purpose error handling. This conversion
/// lets functions that return anyhow::Result bubble their failures into
/// handlers with `?`.
///
/// ## Rust Concepts:
/// - **From trait**: Enables automatic conversion with `.into()` or `?`
/// - **Self**: Refers to AppError (the type we're implementing for)
/// - **.to_string()**: Converts the error to a string representation
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Automatic conversion from JSON parsing errors to AppError.
///
/// ## Purpose:
/// When parsing JSON from HTTP requests fails, we want to return a BadRequest
/// error with a helpful message about what went wrong.
///
/// ## Why BadRequest:
/// JSON parsing errors are almost always the client sending malformed data,
/// so they should result in a 400, not a 500.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Automatic conversion from configuration errors to AppError.
///
/// ## Purpose:
/// Configuration loading can fail for various reasons (missing files, invalid
/// syntax, etc.). These are server-side issues, reported as config errors.
///
/// ## When this happens:
/// - config.toml file has invalid syntax
/// - Environment variable overrides have the wrong shape
/// - Configuration values fail validation
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Automatic conversion from HTTP client errors to AppError.
///
/// ## Purpose:
/// Every reqwest failure (connection refused, DNS, timeout, TLS) means the
/// provider could not be reached, which is an upstream problem from the
/// device's point of view.
///
/// ## Why Upstream:
/// The device treats 502 as "try again later". Mapping transport errors to
/// 500 would make the relay look broken when it is actually the provider.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
///
/// ## Purpose:
/// This creates a shorthand for `Result<T, AppError>` so you can write
/// `AppResult<String>` instead of `Result<String, AppError>`.
///
/// ## Rust Concepts:
/// - **type alias**: Creates a new name for an existing type
/// - **Generic type**: `T` can be any type (String, Vec<u8>, etc.)
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::middleware::ErrorHandlers;
    use actix_web::{web, App};

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::ConfigError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, expected) in cases {
            assert_eq!(err.error_response().status(), expected, "for {:?}", err);
        }
    }

    #[actix_web::test]
    async fn test_error_envelope_shape() {
        let response = AppError::Upstream("speech request failed".into()).error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(parsed["error"]["type"], "upstream_error");
        assert_eq!(parsed["error"]["message"], "speech request failed");
        assert!(parsed["error"]["timestamp"].is_string());
    }

    #[test]
    fn test_display_includes_message() {
        let err = AppError::Unauthorized("token mismatch".into());
        assert_eq!(err.to_string(), "Unauthorized: token mismatch");
    }

    #[test]
    fn test_from_conversions() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AppError::Internal(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(AppError::from(json_err), AppError::BadRequest(_)));
    }

    #[actix_web::test]
    async fn test_oversized_payload_uses_error_envelope() {
        let app = actix_web::test::init_service(
            App::new()
                .app_data(web::PayloadConfig::new(16))
                .wrap(
                    ErrorHandlers::new()
                        .handler(StatusCode::PAYLOAD_TOO_LARGE, payload_too_large),
                )
                .route(
                    "/upload",
                    web::post().to(|_body: web::Bytes| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        let request = actix_web::test::TestRequest::post()
            .uri("/upload")
            .set_payload(vec![0u8; 64])
            .to_request();
        let response = actix_web::test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = actix_web::test::read_body(response).await;
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"]["type"], "payload_too_large");
        assert!(parsed["error"]["message"].is_string());
        assert!(parsed["error"]["timestamp"].is_string());
    }
}
