pub mod auth;
pub mod logging;
pub mod metrics;

pub use auth::QueryTokenAuth;
pub use logging::{RelayRootSpan, RequestLogging};
pub use metrics::MetricsMiddleware;
