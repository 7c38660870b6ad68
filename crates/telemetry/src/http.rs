// Path: crates/telemetry/src/http.rs
//! The axum route serving the Prometheus text exposition.

use axum::routing::get;
use axum::Router;

/// Serializes the default registry into the Prometheus text format.
async fn metrics_handler() -> ([(axum::http::HeaderName, String); 1], axum::body::Bytes) {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = prometheus::Encoder::encode(&encoder, &metric_families, &mut buf) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
    }
    (
        [(
            axum::http::header::CONTENT_TYPE,
            prometheus::Encoder::format_type(&encoder).to_string(),
        )],
        buf.into(),
    )
}

/// A router exposing `GET /metrics`; merged into the node's HTTP surface.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}
