//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming. Every metric name starts
//! with [`METRICS_PREFIX`].

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PaperLens metrics
pub const METRICS_PREFIX: &str = "paperlens";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Buckets for hosted model calls, which include retry backoff
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1m
    120.0, // 2m
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

    // Analysis queue
    describe_counter!(
        format!("{}_files_analyzed_total", METRICS_PREFIX),
        Unit::Count,
        "Files that finished analysis, by outcome"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-file analysis latency in seconds"
    );

    describe_gauge!(
        format!("{}_queue_pending_files", METRICS_PREFIX),
        Unit::Count,
        "Files waiting for analysis in the active project"
    );

    describe_counter!(
        format!("{}_outlier_passes_total", METRICS_PREFIX),
        Unit::Count,
        "Outlier passes by outcome"
    );

    // Hosted model
    describe_counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Hosted model requests by operation and status"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Hosted model latency including retries"
    );

    describe_counter!(
        format!("{}_provider_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries scheduled after transient provider errors"
    );

    // Chat and reports
    describe_counter!(
        format!("{}_chat_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Chat answers by outcome"
    );

    describe_counter!(
        format!("{}_reports_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Reports generated by format"
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

fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record one file leaving the queue
pub fn record_analysis(duration_secs: f64, success: bool) {
    counter!(
        format!("{}_files_analyzed_total", METRICS_PREFIX),
        "status" => outcome_label(success)
    )
    .increment(1);

    histogram!(format!("{}_analysis_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record how many files the active project still has waiting
pub fn set_pending_files(count: usize) {
    gauge!(format!("{}_queue_pending_files", METRICS_PREFIX)).set(count as f64);
}

/// Record an outlier pass outcome: completed, failed or discarded
pub fn record_outlier_pass(outcome: &'static str) {
    counter!(
        format!("{}_outlier_passes_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a hosted model call after its retries are exhausted or it succeeded
pub fn record_provider_call(operation: &str, duration_secs: f64, success: bool) {
    counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "status" => outcome_label(success)
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record a retry scheduled after a transient provider error
pub fn record_provider_retry(operation: &str) {
    counter!(
        format!("{}_provider_retries_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a chat answer; `fallback` when the failure message was stored instead
pub fn record_chat_answer(outcome: &'static str) {
    counter!(
        format!("{}_chat_answers_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a generated report
pub fn record_report(format: &'static str) {
    counter!(
        format!("{}_reports_generated_total", METRICS_PREFIX),
        "format" => format
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [LATENCY_BUCKETS, PROVIDER_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_provider_buckets_cover_full_retry_schedule() {
        // 2 + 4 + 8 + 16 + 32 seconds of backoff
        assert!(PROVIDER_BUCKETS.iter().any(|&b| b >= 62.0));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/v1/projects");
        metrics.finish(200);
        record_analysis(0.5, true);
        record_outlier_pass("completed");
        // Without an installed recorder these are no-ops
    }
}
