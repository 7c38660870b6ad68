// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic
//! from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink`
/// implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured gateway metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn gateway_metrics() -> &'static dyn GatewayMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured resolver metrics sink.
pub fn resolver_metrics() -> &'static dyn ResolverMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured executor metrics sink.
pub fn executor_metrics() -> &'static dyn ExecutorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured error metrics sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics emitted by the intent gateway's admission pipeline.
pub trait GatewayMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for one admission step, labeled by step name
    /// and outcome (`ok` or the error class).
    fn inc_admission_step(&self, step: &'static str, outcome: &str);
    /// Observes the end-to-end latency of a submitted request.
    fn observe_request_duration(&self, outcome: &str, duration_secs: f64);
    /// Increments the counter for results served from the idempotency
    /// store without executing.
    fn inc_idempotent_replays(&self);
    /// Increments a counter for emitted lifecycle events, labeled by kind.
    fn inc_events_emitted(&self, kind: &'static str);
}
impl GatewayMetricsSink for NopSink {
    fn inc_admission_step(&self, _step: &'static str, _outcome: &str) {}
    fn observe_request_duration(&self, _outcome: &str, _duration_secs: f64) {}
    fn inc_idempotent_replays(&self) {}
    fn inc_events_emitted(&self, _kind: &'static str) {}
}

/// A sink for metrics emitted by the layered resolver.
pub trait ResolverMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for one resolution outcome, labeled by
    /// source tier (`cache`, `local`, `peer`, `http`) and outcome.
    fn inc_resolution(&self, source: &str, outcome: &str);
    /// Increments the counter for integrity or size validation failures,
    /// labeled by source tier.
    fn inc_validation_failure(&self, source: &str);
    /// Observes the latency of one full resolution.
    fn observe_resolve_duration(&self, duration_secs: f64);
}
impl ResolverMetricsSink for NopSink {
    fn inc_resolution(&self, _source: &str, _outcome: &str) {}
    fn inc_validation_failure(&self, _source: &str) {}
    fn observe_resolve_duration(&self, _duration_secs: f64) {}
}

/// A sink for metrics emitted by the sandbox executor.
pub trait ExecutorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for completed executions, labeled by result
    /// (`ok` or the terminal error type).
    fn inc_executions(&self, result: &str);
    /// Observes the wall-clock duration of one execution.
    fn observe_execution_duration(&self, duration_secs: f64);
    /// Observes the gas consumed by one execution.
    fn observe_gas_used(&self, gas: u64);
}
impl ExecutorMetricsSink for NopSink {
    fn inc_executions(&self, _result: &str) {}
    fn observe_execution_duration(&self, _duration_secs: f64) {}
    fn observe_gas_used(&self, _gas: u64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by the
    /// originating subsystem and the stable error class.
    fn inc_error(&self, kind: &'static str, code: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _code: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a
/// single point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    GatewayMetricsSink + ResolverMetricsSink + ExecutorMetricsSink + ErrorMetricsSink
{
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where
    T: GatewayMetricsSink + ResolverMetricsSink + ExecutorMetricsSink + ErrorMetricsSink
{
}
