//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple HTTP request handlers
//! simultaneously. This is the most concurrency-heavy part of the relay from a Rust perspective.
//!
//! ## Key Rust Concepts (IMPORTANT for beginners):
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Allows multiple parts of the program to safely share ownership of data
//! - **Why needed**: Multiple HTTP requests run simultaneously and all need access to the same state
//! - **Memory safety**: Automatically cleans up data when the last reference is dropped
//! - **Thread safety**: Safe to share between threads
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time (but not both)
//! - **Why needed**: Every request reads config; only the config endpoint writes it
//! - **Performance**: Reading is fast (no blocking), writing blocks everything else
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (many HTTP handlers can hold a reference)
//! - **RwLock**: Thread-safe read/write access
//! - **T**: The actual data type being protected
//! - **Result**: Thread-safe shared mutable state without data races
//!
//! ## What the relay keeps in shared state:
//! The runtime configuration, the request/error counters the metrics endpoint
//! reports, the shared provider HTTP client (so its connection pool is reused
//! across requests), and the start timestamp for uptime reporting.

use crate::config::AppConfig;        // Our configuration types
use crate::provider::ProviderClient; // Shared outbound HTTP client
use std::sync::{Arc, RwLock};        // Thread-safe shared ownership and locking
use std::time::Instant;              // For tracking server uptime
use std::collections::HashMap;       // For storing per-endpoint metrics

/// The main application state that's shared across all HTTP request handlers.
///
/// ## Thread Safety Pattern:
/// This struct uses Arc<RwLock<T>> for all mutable data, which means:
/// - Multiple HTTP requests can read the same data simultaneously
/// - Only one request can modify data at a time
/// - No data races or memory corruption possible
///
/// ## Rust Concepts:
/// - **#[derive(Debug, Clone)]**: Automatically implements debug printing and cloning
/// - **Arc<RwLock<T>>**: Thread-safe shared mutable data
/// - **Instant**: A point in time (for measuring duration)
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay configuration (can be updated at runtime)
    /// Arc<RwLock<AppConfig>> means:
    /// - Arc: Multiple HTTP handlers can hold a reference to this
    /// - RwLock: Multiple readers OR one writer (thread-safe)
    /// - AppConfig: The actual configuration data
    pub config: Arc<RwLock<AppConfig>>,

    /// Request metrics (constantly being updated by the middleware)
    pub metrics: Arc<RwLock<RelayMetrics>>,

    /// Shared HTTP client for the inference provider.
    /// reqwest::Client is internally reference-counted, so cloning AppState
    /// keeps one connection pool for the whole process.
    pub provider: ProviderClient,

    /// When the server started (never changes, so no Arc<RwLock> needed)
    /// Instant is Copy, so it's safe to share directly
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
///
/// ## Rust Concepts:
/// - **#[derive(Debug, Default)]**: Automatically implements:
///   - `Debug`: Can be printed with {:?} for debugging
///   - `Default`: Can create with RelayMetrics::default() (all zeros)
/// - **u64**: 64-bit unsigned integer (can count up to 18 quintillion)
/// - **HashMap**: Key-value map (like a dictionary in Python)
///
/// ## Why these metrics matter:
/// - **request_count**: Total requests processed (for load monitoring)
/// - **error_count**: Total errors (spikes usually mean provider trouble)
/// - **endpoint_metrics**: Per-endpoint statistics (transcribe vs. synthesize latency)
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Detailed metrics for each API endpoint (route pattern)
    /// Key: endpoint name (e.g., "POST /transcribe")
    /// Value: detailed metrics for that endpoint
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed metrics for a specific API endpoint.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
///
/// For the voice routes the average duration is dominated by the provider's
/// processing time, which makes it a decent provider-health signal.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

/// Implementation of methods for AppState.
impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// ## What this does:
    /// 1. Wraps the config in Arc<RwLock<>> for thread-safe sharing
    /// 2. Creates empty metrics (also thread-safe)
    /// 3. Builds the shared provider client (one connection pool)
    /// 4. Records the current time as the server start time
    ///
    /// ## Rust Concepts:
    /// - **Arc::new()**: Creates a new reference-counted pointer
    /// - **RwLock::new()**: Creates a new reader-writer lock
    /// - **Instant::now()**: Captures the current moment in time
    pub fn new(config: AppConfig) -> Self {
        Self {
            // Wrap config for thread-safe sharing and updating
            config: Arc::new(RwLock::new(config)),
            // Start with empty metrics
            metrics: Arc::new(RwLock::new(RelayMetrics::default())),
            // One reqwest client for the process lifetime
            provider: ProviderClient::new(),
            // Record when the server started
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Thread Safety:
    /// - Uses `.read()` to get a read lock (multiple readers allowed)
    /// - `.unwrap()` assumes the lock isn't poisoned (safe in practice)
    /// - `.clone()` makes a copy so we don't hold the lock longer than needed
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so a slow provider call made
    /// with the copied config never blocks other requests. AppConfig is a
    /// handful of strings and integers, cheap to copy.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Update the configuration with validation.
    ///
    /// ## Thread Safety:
    /// - Uses `.write()` to get exclusive write access
    /// - Only one thread can write at a time
    /// - All readers are blocked until the write completes
    ///
    /// ## Error handling:
    /// Configuration is validated before updating, so the shared config can
    /// never hold values that would break header synthesis.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                // Validation passed, update the config
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => {
                // Validation failed, return the error
                Err(e.to_string())
            }
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    ///
    /// ## Rust Concepts:
    /// - **let mut**: Creates a mutable binding to the locked metrics
    /// - **write()**: Gets exclusive write access (no other reads or writes allowed)
    /// - **+=**: Compound assignment
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    ///
    /// ## When this is called:
    /// - HTTP 4xx errors (bad device input, wrong token)
    /// - HTTP 5xx errors (relay bugs, provider failures surfacing as 502)
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## Parameters:
    /// - **endpoint**: Method and route pattern (e.g., "POST /transcribe")
    /// - **duration_ms**: How long the request took to process (in milliseconds)
    /// - **is_error**: Whether this request resulted in an error
    ///
    /// ## Rust Concepts:
    /// - **.entry()**: Gets or creates a HashMap entry
    /// - **.or_default()**: Creates default value if the key doesn't exist
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        // Get or create metrics for this specific endpoint
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        // Update the metrics for this endpoint
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// ## Why a snapshot:
    /// - Takes a read lock to get consistent data
    /// - Clones the data so we don't hold the lock while sending HTTP response
    /// - Ensures metrics don't change while we're serializing them to JSON
    pub fn get_metrics_snapshot(&self) -> RelayMetrics {
        let metrics = self.metrics.read().unwrap();
        RelayMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    ///
    /// ## Rust Concepts:
    /// - **.elapsed()**: Returns a Duration since start_time
    /// - **.as_secs()**: Converts Duration to seconds (u64)
    /// - **No locking needed**: start_time never changes
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Implementation of utility methods for EndpointMetric.
impl EndpointMetric {
    /// Calculate the average response time for this endpoint.
    ///
    /// ## Formula:
    /// Average = Total Duration ÷ Number of Requests
    ///
    /// ## Rust Concepts:
    /// - **f64**: 64-bit floating point number (for precise decimals)
    /// - **as f64**: Type conversion from integer to float
    /// - **Division by zero check**: Prevents runtime panic
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Calculate the error rate for this endpoint as a fraction (0.0 to 1.0).
    ///
    /// ## Return values:
    /// - 0.0 = No errors (0% error rate)
    /// - 0.5 = Half the requests failed (50% error rate)
    /// - 1.0 = All requests failed (100% error rate)
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no errors possible
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let state = AppState::new(AppConfig::default());
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /transcribe", 120, false);
        state.record_endpoint_request("POST /transcribe", 80, true);
        state.record_endpoint_request("GET /health", 1, false);

        let snapshot = state.get_metrics_snapshot();
        let transcribe = &snapshot.endpoint_metrics["POST /transcribe"];
        assert_eq!(transcribe.request_count, 2);
        assert_eq!(transcribe.total_duration_ms, 200);
        assert_eq!(transcribe.error_count, 1);
        assert_eq!(transcribe.average_duration_ms(), 100.0);
        assert_eq!(transcribe.error_rate(), 0.5);

        let health = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 1);
        assert_eq!(health.error_rate(), 0.0);
    }

    #[test]
    fn test_empty_endpoint_metric_rates() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }

    #[test]
    fn test_update_config_validates() {
        let state = AppState::new(AppConfig::default());

        let mut bad = AppConfig::default();
        bad.server.port = 0;
        assert!(state.update_config(bad).is_err());
        // The shared config keeps its previous value
        assert_eq!(state.get_config().server.port, 8080);

        let mut good = AppConfig::default();
        good.provider.voice = "nova".to_string();
        assert!(state.update_config(good).is_ok());
        assert_eq!(state.get_config().provider.voice, "nova");
    }
}
