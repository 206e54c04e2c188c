//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Vejovis metrics
pub const METRICS_PREFIX: &str = "vejovis";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms for read endpoints
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for provider round-trips (embedding, tools that embed)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Chat metrics
    describe_counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Chat turns by outcome"
    );

    describe_histogram!(
        format!("{}_chat_grounding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time spent running tools before the completion stream opens"
    );

    describe_counter!(
        format!("{}_completion_streams_total", METRICS_PREFIX),
        Unit::Count,
        "Completion streams opened, by status"
    );

    // Tool metrics
    describe_counter!(
        format!("{}_tool_invocations_total", METRICS_PREFIX),
        Unit::Count,
        "Tool invocations by tool and outcome"
    );

    describe_histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Tool execution latency in seconds"
    );

    // Embedding metrics
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

/// Helper to record one tool invocation
pub fn record_tool(tool: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_tool_invocations_total", METRICS_PREFIX),
        "tool" => tool.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        "tool" => tool.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a chat turn's grounding phase and outcome
pub fn record_chat(grounding_secs: f64, tools_invoked: usize, outcome: &str) {
    counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        "outcome" => outcome.to_string(),
        "tools" => tools_invoked.to_string()
    )
    .increment(1);

    histogram!(format!("{}_chat_grounding_duration_seconds", METRICS_PREFIX))
        .record(grounding_secs);
}

/// Helper to record a completion stream open attempt
pub fn record_completion_stream(model: &str, status: u16) {
    counter!(
        format!("{}_completion_streams_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
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
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}
