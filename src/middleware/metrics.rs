use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

/// Bucket for requests whose path matches no registered route. Keyed
/// separately so unknown URLs cannot grow the metrics map without bound.
const UNMATCHED_ENDPOINT: &str = "unmatched";

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
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
        let start_time = Instant::now();
        let method = req.method().to_string();
        // Keyed by route pattern, not raw path
        let endpoint = match req.match_pattern() {
            Some(pattern) => format!("{} {}", method, pattern),
            None => format!("{} {}", method, UNMATCHED_ENDPOINT),
        };

        // Cloned out of the request so requests that fail without producing
        // a response still get recorded
        let app_state = req.app_data::<web::Data<AppState>>().cloned();

        if let Some(state) = &app_state {
            state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration = start_time.elapsed();
            let duration_ms = duration.as_millis() as u64;

            let is_error = match &result {
                Ok(response) => response.status().is_client_error() || response.status().is_server_error(),
                Err(_) => true,
            };

            if let Some(state) = &app_state {
                state.record_endpoint_request(&endpoint, duration_ms, is_error);

                if is_error {
                    state.increment_error_count();
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::http::StatusCode;
    use actix_web::{test, App, HttpResponse};

    #[actix_web::test]
    async fn test_unmatched_paths_share_one_bucket() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route("/health", web::get().to(HttpResponse::Ok))
                .default_service(web::route().to(HttpResponse::NotFound)),
        )
        .await;

        for path in ["/status/device-1", "/admin.php?cmd=ls"] {
            let request = test::TestRequest::get().uri(path).to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let request = test::TestRequest::get().uri("/health").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.endpoint_metrics.len(), 2);

        let unmatched = &snapshot.endpoint_metrics[&format!("GET {}", UNMATCHED_ENDPOINT)];
        assert_eq!(unmatched.request_count, 2);
        assert_eq!(unmatched.error_count, 2);

        let health = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 1);
        assert_eq!(health.error_count, 0);
    }

    #[actix_web::test]
    async fn test_matched_routes_keyed_by_pattern() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route("/sessions/{id}", web::get().to(HttpResponse::Ok)),
        )
        .await;

        for path in ["/sessions/alpha", "/sessions/beta"] {
            let request = test::TestRequest::get().uri(path).to_request();
            test::call_service(&app, request).await;
        }

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.endpoint_metrics.len(), 1);
        assert_eq!(
            snapshot.endpoint_metrics["GET /sessions/{id}"].request_count,
            2
        );
    }
}
