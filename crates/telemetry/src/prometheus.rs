// Path: crates/telemetry/src/prometheus.rs
//! The concrete metrics sink backed by the `prometheus` crate.

use crate::sinks::{
    ErrorMetricsSink, ExecutorMetricsSink, GatewayMetricsSink, ResolverMetricsSink, SINK,
};
use prometheus::{
    exponential_buckets, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};

/// The Prometheus-backed implementation of every metrics sink.
pub struct PrometheusSink {
    admission_steps: IntCounterVec,
    request_duration: HistogramVec,
    idempotent_replays: IntCounter,
    events_emitted: IntCounterVec,
    resolutions: IntCounterVec,
    validation_failures: IntCounterVec,
    resolve_duration: Histogram,
    executions: IntCounterVec,
    execution_duration: Histogram,
    gas_used: Histogram,
    errors: IntCounterVec,
}

impl std::fmt::Debug for PrometheusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusSink").finish_non_exhaustive()
    }
}

impl PrometheusSink {
    /// Registers every metric with the default registry.
    ///
    /// Fails when called twice; install it once at process start.
    pub fn register() -> Result<Self, prometheus::Error> {
        Ok(Self {
            admission_steps: register_int_counter_vec!(
                "artifex_gateway_admission_steps_total",
                "Admission pipeline steps, by step and outcome",
                &["step", "outcome"]
            )?,
            request_duration: register_histogram_vec!(
                "artifex_gateway_request_duration_seconds",
                "End-to-end request latency (seconds)",
                &["outcome"],
                exponential_buckets(0.001, 2.0, 15)?
            )?,
            idempotent_replays: register_int_counter!(
                "artifex_gateway_idempotent_replays_total",
                "Results served from the idempotency store without executing"
            )?,
            events_emitted: register_int_counter_vec!(
                "artifex_gateway_events_total",
                "Lifecycle events emitted, by kind",
                &["kind"]
            )?,
            resolutions: register_int_counter_vec!(
                "artifex_resolver_resolutions_total",
                "Resolution outcomes, by source tier and outcome",
                &["source", "outcome"]
            )?,
            validation_failures: register_int_counter_vec!(
                "artifex_resolver_validation_failures_total",
                "Integrity and size validation failures, by source tier",
                &["source"]
            )?,
            resolve_duration: register_histogram!(
                "artifex_resolver_duration_seconds",
                "Full resolution latency (seconds)",
                exponential_buckets(0.001, 2.0, 15)?
            )?,
            executions: register_int_counter_vec!(
                "artifex_executor_executions_total",
                "Completed executions, by result",
                &["result"]
            )?,
            execution_duration: register_histogram!(
                "artifex_executor_duration_seconds",
                "Execution wall-clock duration (seconds)",
                exponential_buckets(0.001, 2.0, 15)?
            )?,
            gas_used: register_histogram!(
                "artifex_executor_gas_used",
                "Gas consumed per execution",
                exponential_buckets(1000.0, 4.0, 12)?
            )?,
            errors: register_int_counter_vec!(
                "artifex_errors_total",
                "Errors by subsystem and stable class",
                &["kind", "code"]
            )?,
        })
    }

    /// Registers the sink and installs it as the global `SINK`.
    pub fn install() -> Result<(), prometheus::Error> {
        let sink: &'static PrometheusSink = Box::leak(Box::new(Self::register()?));
        // A second install keeps the first sink; the registry would have
        // rejected the duplicate metrics above anyway.
        let _ = SINK.set(sink);
        Ok(())
    }
}

impl GatewayMetricsSink for PrometheusSink {
    fn inc_admission_step(&self, step: &'static str, outcome: &str) {
        self.admission_steps.with_label_values(&[step, outcome]).inc();
    }
    fn observe_request_duration(&self, outcome: &str, duration_secs: f64) {
        self.request_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }
    fn inc_idempotent_replays(&self) {
        self.idempotent_replays.inc();
    }
    fn inc_events_emitted(&self, kind: &'static str) {
        self.events_emitted.with_label_values(&[kind]).inc();
    }
}

impl ResolverMetricsSink for PrometheusSink {
    fn inc_resolution(&self, source: &str, outcome: &str) {
        self.resolutions.with_label_values(&[source, outcome]).inc();
    }
    fn inc_validation_failure(&self, source: &str) {
        self.validation_failures.with_label_values(&[source]).inc();
    }
    fn observe_resolve_duration(&self, duration_secs: f64) {
        self.resolve_duration.observe(duration_secs);
    }
}

impl ExecutorMetricsSink for PrometheusSink {
    fn inc_executions(&self, result: &str) {
        self.executions.with_label_values(&[result]).inc();
    }
    fn observe_execution_duration(&self, duration_secs: f64) {
        self.execution_duration.observe(duration_secs);
    }
    fn observe_gas_used(&self, gas: u64) {
        self.gas_used.observe(gas as f64);
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, code: &'static str) {
        self.errors.with_label_values(&[kind, code]).inc();
    }
}
