use crate::error::AppError;
use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use tracing::warn;

/// Query-parameter token check for the device-facing routes.
///
/// The legacy device firmware cannot set HTTP headers, so the shared secret
/// travels as `?token=...`. An empty configured token disables the check
/// entirely (development mode).
pub struct QueryTokenAuth;

impl<S, B> Transform<S, ServiceRequest> for QueryTokenAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = QueryTokenAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(QueryTokenAuthMiddleware { service }))
    }
}

pub struct QueryTokenAuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for QueryTokenAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let configured_token = req
            .app_data::<web::Data<AppState>>()
            .map(|state| state.get_config().server.device_token)
            .unwrap_or_default();

        let supplied_token = extract_token(req.query_string());

        if !token_matches(&configured_token, supplied_token.as_deref()) {
            // Never log the supplied value; it may be a mistyped real token
            warn!(
                method = %req.method(),
                path = %req.path(),
                "Rejected request with missing or invalid token"
            );
            return Box::pin(ready(Err(
                AppError::Unauthorized("Missing or invalid token".to_string()).into(),
            )));
        }

        Box::pin(self.service.call(req))
    }
}

/// Raw value of the `token` query parameter, if present.
///
/// No percent-decoding: the comparison is exact string equality on the raw
/// value, and device tokens are plain alphanumerics.
fn extract_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}

fn token_matches(configured: &str, supplied: Option<&str>) -> bool {
    // Empty configured token = auth disabled
    configured.is_empty() || supplied == Some(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token("token=abc123"), Some("abc123".to_string()));
        assert_eq!(
            extract_token("rate=16000&token=abc123&bits=16"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_token("token="), Some(String::new()));
        assert_eq!(extract_token("rate=16000"), None);
        assert_eq!(extract_token(""), None);
        // Bare key without '=' is not a value
        assert_eq!(extract_token("token"), None);
        // First occurrence wins
        assert_eq!(
            extract_token("token=first&token=second"),
            Some("first".to_string())
        );
    }

    #[test]
    fn test_token_matches() {
        // Configured token must match exactly
        assert!(token_matches("secret", Some("secret")));
        assert!(!token_matches("secret", Some("wrong")));
        assert!(!token_matches("secret", Some("")));
        assert!(!token_matches("secret", None));
        assert!(!token_matches("secret", Some("Secret")));

        // Empty configured token disables the check
        assert!(token_matches("", None));
        assert!(token_matches("", Some("anything")));
    }
}
