// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! # Artifex Telemetry
//!
//! Observability infrastructure for the pipeline: structured logging
//! initialization, a Prometheus `/metrics` route, and abstract sinks that
//! decouple metric instrumentation from the backend.

/// The axum route serving the Prometheus text exposition.
pub mod http;
/// The initialization routine for global structured logging.
pub mod init;
/// The concrete metrics sink backed by the `prometheus` crate.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics
/// reporting.
pub mod sinks;

// Re-export the helper functions for easy access to the global sinks.
pub use sinks::{error_metrics, executor_metrics, gateway_metrics, resolver_metrics};
