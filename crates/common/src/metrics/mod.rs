//! Metrics and observability utilities
//!
//! Prometheus metrics for chat exchanges, index builds and the
//! upstream services they depend on.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ChatForge metrics
pub const METRICS_PREFIX: &str = "chatforge";

/// Histogram buckets for request latency (in seconds).
/// Chat requests wait on a model call, so the upper range is wide.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.025,  // 25ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Buckets for embedding latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_chat_exchanges_total", METRICS_PREFIX),
        Unit::Count,
        "Chat exchanges handled, by tenant and channel"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Reply generation latency in seconds"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Degraded replies, by error kind"
    );

    describe_counter!(
        format!("{}_storage_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Conversation store failures"
    );

    describe_counter!(
        format!("{}_notifications_total", METRICS_PREFIX),
        Unit::Count,
        "Outbound notifications, by status"
    );

    describe_counter!(
        format!("{}_index_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Index builds, by outcome"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Document chunks written to tenant indexes"
    );

    describe_histogram!(
        format!("{}_index_build_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Index build latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one completed chat exchange
pub fn record_chat(tenant_id: &str, channel: &str, duration_secs: f64) {
    counter!(
        format!("{}_chat_exchanges_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "channel" => channel.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        "channel" => channel.to_string()
    )
    .record(duration_secs);
}

/// Record a degraded reply
pub fn record_generation_error(tenant_id: &str, kind: &str) {
    counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_storage_error(tenant_id: &str, operation: &str) {
    counter!(
        format!("{}_storage_errors_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_notification(tenant_id: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_notifications_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an index build; `outcome` is built, empty or failed
pub fn record_index_build(tenant_id: &str, outcome: &str, chunks: usize, duration_secs: f64) {
    counter!(
        format!("{}_index_builds_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string()
    )
    .increment(chunks as u64);

    histogram!(format!("{}_index_build_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model, batch_size, duration_secs, "Embedding batch complete");
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}
