// Path: crates/gateway/src/lib.rs
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The intent gateway: the public request surface of the pipeline.
//!
//! Admission runs in a fixed order (schema validation, control-plane
//! check, rate limiter, idempotency store, policy engine, resolver,
//! executor) and every step emits a metric. Requests are handled on their
//! own tasks; the idempotency store and rate limiter are the only shared
//! mutable state and use per-key locking. Lifecycle events for one request
//! are emitted in order and end with exactly one terminal record.

/// The lifecycle event bus.
pub mod events;
/// The axum HTTP surface.
pub mod http;
/// Idempotency-key based request de-duplication.
pub mod idempotency;
/// Per-caller token-bucket rate limiting.
pub mod ratelimit;

use artifex_api::vm::{CapabilityGate, VmInvocation};
use artifex_api::{NamingService, VirtualMachine};
use artifex_cache::ArtifactCache;
use artifex_cid::ByteCid;
use artifex_control::{canary_admits, ControlPlane};
use artifex_index::ManifestIndex;
use artifex_policy::PolicyEngine;
use artifex_resolver::{ResolveMode, ResolveOutcome, ResolveTarget, Resolver};
use artifex_telemetry::{error_metrics, gateway_metrics};
use artifex_types::config::GatewayParams;
use artifex_types::control::{ControlState, EffectiveLimits, HealthStatus};
use artifex_types::error::{ErrorCode, GatewayError, ResolveError};
use artifex_types::event::ExecutionEvent;
use artifex_types::policy::{PolicyInput, PolicyRuleSet, Verdict};
use artifex_types::record::ArtifactRecord;
use artifex_types::request::ExecutionRequest;
use artifex_types::result::{ErrorType, ExecutionResultRecord};
use chrono::Utc;
use events::EventBus;
use idempotency::{Begin, IdempotencyStore};
use ratelimit::{CallerLimiter, RateDecision};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything the gateway composes over.
pub struct GatewayDeps {
    pub control: Arc<ControlPlane>,
    pub index: Arc<ManifestIndex>,
    pub cache: Arc<ArtifactCache>,
    pub resolver: Arc<Resolver>,
    pub executor: Arc<dyn VirtualMachine>,
    pub naming: Arc<dyn NamingService>,
    pub policy: PolicyRuleSet,
    pub trusted_signers: HashSet<String>,
    pub params: GatewayParams,
    pub node_name: String,
}

/// One submission: the caller identity plus the request payload.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Caller identity; scopes rate limits, idempotency keys, and canary
    /// admission.
    pub caller: String,
    /// The request.
    pub request: ExecutionRequest,
}

/// The sanitized snapshot served by the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub enabled: bool,
    pub frozen: bool,
    pub canary_fraction: f64,
    pub limits: artifex_types::control::LimitDefaults,
    pub trusted_signer_count: usize,
    pub known_artifacts: usize,
}

/// The intent gateway.
pub struct Gateway {
    deps: GatewayDeps,
    limiter: CallerLimiter,
    idempotency: IdempotencyStore,
    events: EventBus,
    inflight: AtomicU64,
}

impl Gateway {
    pub fn new(deps: GatewayDeps) -> Self {
        let limiter = CallerLimiter::new(
            deps.params.rate_limit,
            deps.params.rate_window_secs,
            deps.params.rate_burst,
        );
        let idempotency =
            IdempotencyStore::new(Duration::from_secs(deps.params.idempotency_ttl_secs));
        Self {
            deps,
            limiter,
            idempotency,
            events: EventBus::new(),
            inflight: AtomicU64::new(0),
        }
    }

    /// Subscribes to the lifecycle event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// The control plane, for the admin surface.
    pub fn control(&self) -> &Arc<ControlPlane> {
        &self.deps.control
    }

    /// The sanitized effective snapshot plus coarse status.
    pub fn health(&self) -> HealthReport {
        let state: Arc<ControlState> = self.deps.control.snapshot();
        HealthReport {
            status: state.health(),
            enabled: state.enabled,
            frozen: state.frozen,
            canary_fraction: state.canary_fraction,
            limits: state.limits,
            trusted_signer_count: self.deps.trusted_signers.len(),
            known_artifacts: self.deps.index.snapshot().len(),
        }
    }

    /// Submits one request through the full admission pipeline.
    ///
    /// Execution-class failures return `Ok` with `success = false`;
    /// admission failures return the typed error. Either way the lifecycle
    /// stream ends with exactly one terminal record for this submission.
    pub async fn submit(
        &self,
        submission: Submission,
    ) -> Result<ExecutionResultRecord, GatewayError> {
        let started = Instant::now();
        let outcome = self.pipeline(&submission).await;

        let label = match &outcome {
            Ok(record) if record.success => "ok".to_string(),
            Ok(_) => "execution_error".to_string(),
            Err(e) => e.code().to_string(),
        };
        gateway_metrics().observe_request_duration(&label, started.elapsed().as_secs_f64());

        if let Err(e) = &outcome {
            error_metrics().inc_error("gateway", e.code());
            self.events.emit(ExecutionEvent::Error {
                request_id: None,
                error: e.code().to_string(),
                error_type: None,
                cid: Some(submission.request.cid.clone()),
            });
            tracing::info!(
                target: "gateway",
                caller = %submission.caller,
                cid = %submission.request.cid,
                code = e.code(),
                "request rejected"
            );
        }
        outcome
    }

    async fn pipeline(
        &self,
        submission: &Submission,
    ) -> Result<ExecutionResultRecord, GatewayError> {
        let request = &submission.request;
        self.idempotency.sweep();

        // 1. Schema validation, including the target identifier.
        let cid = step("validate", self.validate(submission).await)?;

        // 2. Control plane: one snapshot used throughout this request.
        let control = self.deps.control.snapshot();
        step("control", self.control_check(&control, &submission.caller))?;

        // 3. Per-caller rate limiter.
        step(
            "rate_limit",
            match self.limiter.check(&submission.caller) {
                RateDecision::Admitted => Ok(()),
                RateDecision::Limited { retry_after_secs } => {
                    Err(GatewayError::RateLimited { retry_after_secs })
                }
            },
        )?;

        // 4. Idempotency: the lookup happens-before execution.
        let guard = match &request.idempotency_key {
            Some(key) => match self.idempotency.begin(&submission.caller, key).await {
                Begin::Replay(record) => {
                    gateway_metrics().inc_idempotent_replays();
                    gateway_metrics().inc_admission_step("idempotency", "replay");
                    return Ok((*record).clone());
                }
                Begin::Fresh(guard) => {
                    gateway_metrics().inc_admission_step("idempotency", "fresh");
                    Some(guard)
                }
            },
            None => None,
        };

        let limits = EffectiveLimits::resolve(
            &control.limits,
            request.policy.as_ref(),
            &request.options,
        );
        let indexed = self.deps.index.snapshot().find_by_cid(cid.as_str());

        // 5. Policy engine.
        let decision = PolicyEngine::decide(
            &self.policy_input(submission, &cid, indexed.as_deref(), &limits),
            &self.deps.policy,
            &self.deps.trusted_signers,
        );
        let warning = match decision.verdict {
            Verdict::Deny => {
                gateway_metrics().inc_admission_step("policy", "deny");
                return Err(GatewayError::PermissionDenied {
                    reason: decision.reason,
                });
            }
            Verdict::Warn => {
                gateway_metrics().inc_admission_step("policy", "warn");
                Some(decision.reason)
            }
            Verdict::Allow => {
                gateway_metrics().inc_admission_step("policy", "allow");
                None
            }
        };

        // 6. Resolver.
        let target = ResolveTarget {
            cid: Some(cid.clone()),
            structural: None,
        };
        let resolution = step(
            "resolve",
            match self.deps.resolver.resolve(&target, ResolveMode::Full).await {
                Ok(ResolveOutcome::Resolved(resolution)) => Ok(resolution),
                Ok(_) => Err(GatewayError::Internal(
                    "resolver returned a non-byte outcome for a CID target".into(),
                )),
                Err(e) => Err(GatewayError::Resolve(e)),
            },
        )?;
        let bytes = self
            .deps
            .cache
            .read(&resolution.path)
            .await
            .map_err(GatewayError::Resolve)?;
        let record = resolution.record;

        // 7. Executor, bracketed by the lifecycle events.
        let request_id = uuid::Uuid::new_v4().to_string();
        let position = self.inflight.fetch_add(1, Ordering::SeqCst);
        let executed = self
            .run_execution(submission, &cid, &record, bytes, limits, &request_id, position)
            .await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        let outcome = step("execute", executed)?;

        let error_type = outcome.error.as_ref().and_then(ErrorType::from_vm_error);
        let result = ExecutionResultRecord {
            request_id: request_id.clone(),
            success: outcome.error.is_none(),
            output: outcome.output,
            gas_used: Some(outcome.gas_used),
            duration_ms: outcome.duration_ms,
            logs: request.options.return_logs.then_some(outcome.logs),
            gas_profile: outcome.profile,
            trace: outcome.trace,
            error: outcome.error.as_ref().map(|e| e.to_string()),
            error_type,
            warning: warning.clone(),
            executed_at: Utc::now(),
            executor_node: Some(self.deps.node_name.clone()),
        };

        if result.success {
            self.events.emit(ExecutionEvent::Completed {
                request_id: request_id.clone(),
                cid: cid.to_string(),
                success: true,
                duration_ms: result.duration_ms,
                gas_used: result.gas_used,
                warning,
            });
        } else {
            self.events.emit(ExecutionEvent::Error {
                request_id: Some(request_id),
                error: result.error.clone().unwrap_or_else(|| "execution failed".into()),
                error_type,
                cid: Some(cid.to_string()),
            });
        }

        if let Some(guard) = guard {
            guard.complete(Arc::new(result.clone()));
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_execution(
        &self,
        submission: &Submission,
        cid: &ByteCid,
        record: &ArtifactRecord,
        bytes: Vec<u8>,
        limits: EffectiveLimits,
        request_id: &str,
        position: u64,
    ) -> Result<artifex_api::vm::VmOutcome, GatewayError> {
        self.events.emit(ExecutionEvent::Queued {
            request_id: request_id.to_string(),
            cid: cid.to_string(),
            position,
        });

        // Freeze dominance: admitted work that has not entered Running is
        // refused on a fresh snapshot.
        if self.deps.control.snapshot().frozen {
            return Err(GatewayError::Frozen);
        }

        self.events.emit(ExecutionEvent::Started {
            request_id: request_id.to_string(),
            cid: cid.to_string(),
            executor_node: self.deps.node_name.clone(),
        });

        let request = &submission.request;
        let gate = CapabilityGate {
            allow: request
                .policy
                .as_ref()
                .and_then(|p| p.allow_capabilities.clone()),
            deny: request
                .policy
                .as_ref()
                .and_then(|p| p.deny_capabilities.clone())
                .unwrap_or_default(),
        };
        let invocation = VmInvocation {
            module_bytes: bytes,
            entry: record.entry.clone(),
            inputs: request.inputs.clone(),
            param_names: record.params.clone(),
            limits,
            gate,
            collect_profile: request.options.return_gas_profile,
            collect_trace: request.options.trace_execution,
        };
        self.deps
            .executor
            .execute(invocation)
            .await
            .map_err(GatewayError::Vm)
    }

    async fn validate(&self, submission: &Submission) -> Result<ByteCid, GatewayError> {
        if submission.caller.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "caller identity must not be empty".into(),
            ));
        }
        submission.request.validate()?;
        self.resolve_target(&submission.request.cid).await
    }

    /// Accepts raw CID text or a `name:`-prefixed logical name resolved
    /// through the naming service.
    async fn resolve_target(&self, target: &str) -> Result<ByteCid, GatewayError> {
        if let Some(logical) = target.strip_prefix(artifex_api::naming::NAME_SCHEME) {
            return self
                .deps
                .naming
                .resolve_name(logical)
                .await
                .ok_or_else(|| {
                    GatewayError::Resolve(ResolveError::NotFound(format!(
                        "unknown logical name {:?}",
                        logical
                    )))
                });
        }
        ByteCid::parse(target).map_err(|e| GatewayError::Resolve(ResolveError::Identifier(e)))
    }

    fn control_check(
        &self,
        control: &ControlState,
        caller: &str,
    ) -> Result<(), GatewayError> {
        if control.frozen {
            return Err(GatewayError::Frozen);
        }
        if !control.enabled {
            return Err(GatewayError::Disabled);
        }
        if !canary_admits(caller, control.canary_fraction) {
            return Err(GatewayError::NotInCanary);
        }
        Ok(())
    }

    fn policy_input(
        &self,
        submission: &Submission,
        cid: &ByteCid,
        record: Option<&ArtifactRecord>,
        limits: &EffectiveLimits,
    ) -> PolicyInput {
        let metadata = &submission.request.metadata;
        let structural_similarity = match (&metadata.phi_values, record.and_then(|r| r.phi.as_ref()))
        {
            (Some(attested), Some(phi)) => {
                Some(artifex_phash::cosine_similarity(attested, &phi.values))
            }
            _ => None,
        };
        PolicyInput {
            cid: cid.to_string(),
            structural_hash: record.and_then(|r| r.ast_hash.clone()),
            structural_verified: record.is_some_and(|r| r.ast_hash.is_some()),
            structural_similarity,
            signature: metadata.signature.clone(),
            gas_limit: limits.gas,
            memory_bytes: limits.memory_bytes,
            timeout_ms: limits.timeout_ms,
            caller: submission.caller.clone(),
            function_name: metadata.function_name.clone(),
            resonance_hz: metadata.resonance_hz,
            complexity: metadata.complexity,
            impure: record.is_some_and(|r| r.is_impure()),
        }
    }
}

/// Records the step metric for one admission stage.
fn step<T>(name: &'static str, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
    match &result {
        Ok(_) => gateway_metrics().inc_admission_step(name, "ok"),
        Err(e) => gateway_metrics().inc_admission_step(name, e.code()),
    }
    result
}
