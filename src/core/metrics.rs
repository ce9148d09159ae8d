//! Prometheus metrics for the chat gateway.

use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use std::sync::OnceLock;

/// Container for all gateway metrics.
pub struct Metrics {
    /// Finished chat streams by provider, model and outcome
    pub request_count: IntCounterVec,

    /// Fallback stream activations by failure reason
    pub fallback_count: IntCounterVec,

    /// Chunks relayed to clients by provider and content type
    pub chunk_count: IntCounterVec,

    /// Time from request start to the first relayed chunk, in seconds
    pub ttft: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call more than once; later calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "chat_gateway_requests_total",
            "Total number of chat streams",
            &["provider", "model", "outcome"]
        )
        .expect("Failed to register request_count metric");

        let fallback_count = register_int_counter_vec!(
            "chat_gateway_fallback_total",
            "Number of simulated fallback streams",
            &["reason"]
        )
        .expect("Failed to register fallback_count metric");

        let chunk_count = register_int_counter_vec!(
            "chat_gateway_chunks_total",
            "Number of chunks relayed to clients",
            &["provider", "content_type"]
        )
        .expect("Failed to register chunk_count metric");

        let ttft = register_histogram_vec!(
            "chat_gateway_ttft_seconds",
            "Time to first chunk in seconds",
            &["provider"],
            vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
        )
        .expect("Failed to register ttft metric");

        Metrics {
            request_count,
            fallback_count,
            chunk_count,
            ttft,
        }
    })
}

/// Get the metrics registry, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
