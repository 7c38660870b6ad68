// Path: crates/vm/wasm/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! wasmtime-based sandbox executor.
//!
//! Each execution instantiates the verified module in an isolated store
//! with three limits armed up front: fuel for the gas cap, a resource
//! limiter for the memory cap, and an epoch deadline for the wall-clock
//! timeout. The host exposes only the small capability table in [`host`];
//! every call passes the per-execution syscall gate.
//!
//! Execution advances through the monotonic state machine
//! `Pending -> Loading -> Instantiated -> Running -> (Completed | Failed)`;
//! gas and duration are reported even for failed runs.

/// Host state and the capability table.
pub mod host;
/// Static opcode accounting for gas profiles and traces.
pub mod profile;

use artifex_api::vm::{VirtualMachine, VmInvocation, VmOutcome};
use artifex_telemetry::executor_metrics;
use artifex_types::error::VmError;
use artifex_types::record::ScalarValue;
use artifex_types::request::InputValues;
use artifex_types::result::{ErrorType, GasProfile};
use async_trait::async_trait;
use host::HostCtx;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use wasmtime::{Config, Engine, Linker, Module, Store, Trap, Val, ValType};

/// The execution state machine. Transitions are monotonic; a failure in
/// any non-terminal state lands in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Pending,
    Loading,
    Instantiated,
    Running,
    Completed,
    Failed,
}

fn advance(phase: &mut Phase, next: Phase) {
    debug_assert!(*phase <= next, "phase regression: {:?} -> {:?}", phase, next);
    tracing::trace!(target: "vm", from = ?phase, to = ?next, "phase transition");
    *phase = next;
}

/// The sandbox executor. One engine and linker serve all executions; each
/// request gets its own store, instance, and limits.
pub struct WasmExecutor {
    engine: Engine,
    linker: Linker<HostCtx>,
    module_cache: RwLock<HashMap<[u8; 32], Module>>,
    node_label: String,
}

impl WasmExecutor {
    /// Builds the engine with fuel metering and epoch interruption on.
    pub fn new(node_label: impl Into<String>) -> Result<Self, VmError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.epoch_interruption(true);

        let engine = Engine::new(&config).map_err(|e| VmError::Initialization(e.to_string()))?;
        let mut linker = Linker::new(&engine);
        host::add_to_linker(&mut linker).map_err(|e| VmError::Initialization(e.to_string()))?;

        Ok(Self {
            engine,
            linker,
            module_cache: RwLock::new(HashMap::new()),
            node_label: node_label.into(),
        })
    }

    /// The executor-node identity reported in events.
    pub fn node_label(&self) -> &str {
        &self.node_label
    }

    fn module_for(&self, bytes: &[u8]) -> Result<Module, VmError> {
        let key: [u8; 32] = Sha256::digest(bytes).into();
        if let Ok(cache) = self.module_cache.read() {
            if let Some(module) = cache.get(&key) {
                return Ok(module.clone());
            }
        }
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| VmError::Initialization(format!("invalid module: {}", e)))?;
        if let Ok(mut cache) = self.module_cache.write() {
            cache.insert(key, module.clone());
        }
        Ok(module)
    }
}

#[async_trait]
impl VirtualMachine for WasmExecutor {
    async fn execute(&self, invocation: VmInvocation) -> Result<VmOutcome, VmError> {
        let module = self.module_for(&invocation.module_bytes)?;
        let engine = self.engine.clone();
        let linker = self.linker.clone();

        // The epoch ticker enforces the wall-clock deadline: the store is
        // armed one tick away, and the ticker fires exactly once.
        let ticker_engine = self.engine.clone();
        let timeout = Duration::from_millis(invocation.limits.timeout_ms);
        let ticker = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            ticker_engine.increment_epoch();
        });

        let result = tokio::task::spawn_blocking(move || run(engine, linker, module, invocation))
            .await
            .map_err(|e| VmError::Initialization(format!("executor task failed: {}", e)))?;
        ticker.abort();

        if let Ok(outcome) = &result {
            let label = match &outcome.error {
                None => "ok",
                Some(err) => ErrorType::from_vm_error(err)
                    .map(|t| t.as_str())
                    .unwrap_or("internal"),
            };
            executor_metrics().inc_executions(label);
            executor_metrics().observe_execution_duration(outcome.duration_ms as f64 / 1000.0);
            executor_metrics().observe_gas_used(outcome.gas_used);
        }
        result
    }
}

/// The blocking body of one execution.
fn run(
    engine: Engine,
    linker: Linker<HostCtx>,
    module: Module,
    invocation: VmInvocation,
) -> Result<VmOutcome, VmError> {
    let mut phase = Phase::Pending;
    let limits = invocation.limits;
    let started = Instant::now();

    advance(&mut phase, Phase::Loading);
    let ctx = HostCtx::new(invocation.gate.clone(), limits.memory_bytes);
    let mut store = Store::new(&engine, ctx);
    store.limiter(|ctx| ctx as &mut dyn wasmtime::ResourceLimiter);
    store
        .set_fuel(limits.gas)
        .map_err(|e| VmError::Initialization(e.to_string()))?;
    store.set_epoch_deadline(1);

    let instance = match linker.instantiate(&mut store, &module) {
        Ok(instance) => instance,
        Err(e) => {
            advance(&mut phase, Phase::Failed);
            // Initial memory past the cap is an execution-class failure.
            if store.data().memory.exceeded() {
                return Ok(failed_outcome(
                    VmError::OutOfMemory,
                    &mut store,
                    limits.gas,
                    started,
                    &invocation,
                ));
            }
            return Err(VmError::Initialization(format!(
                "instantiation failed: {}",
                e
            )));
        }
    };
    advance(&mut phase, Phase::Instantiated);

    let func = instance
        .get_func(&mut store, &invocation.entry)
        .ok_or_else(|| {
            VmError::Initialization(format!("module exports no entry {:?}", invocation.entry))
        })?;
    let ty = func.ty(&store);
    let param_types: Vec<ValType> = ty.params().collect();
    let result_types: Vec<ValType> = ty.results().collect();
    if result_types.len() > 1 {
        return Err(VmError::TypeUnsupported(
            "multi-value returns are not supported".into(),
        ));
    }

    let params = marshal_inputs(
        &invocation.inputs,
        invocation.param_names.as_deref(),
        &param_types,
    )?;
    let mut results: Vec<Val> = result_types.iter().map(zero_val).collect();

    advance(&mut phase, Phase::Running);
    let call_result = func.call(&mut store, &params, &mut results);
    let duration_ms = started.elapsed().as_millis() as u64;

    // Observe the resident memory even when the guest never grew it.
    if let Some(memory) = instance.get_memory(&mut store, "memory") {
        let size = memory.data_size(&store);
        store.data_mut().memory.observe(size);
    }
    let gas_used = limits.gas.saturating_sub(store.get_fuel().unwrap_or(0));

    match call_result {
        Ok(()) => {
            // A denied growth surfaces as -1 to the guest; the cap breach
            // is still an out-of-memory termination for the pipeline.
            if store.data().memory.exceeded() {
                advance(&mut phase, Phase::Failed);
                return Ok(outcome_with(
                    &mut store,
                    None,
                    gas_used,
                    duration_ms,
                    Some(VmError::OutOfMemory),
                    &invocation,
                ));
            }
            advance(&mut phase, Phase::Completed);
            let output = results.first().map(unmarshal_val).transpose()?;
            Ok(outcome_with(
                &mut store,
                output,
                gas_used,
                duration_ms,
                None,
                &invocation,
            ))
        }
        Err(call_err) => {
            advance(&mut phase, Phase::Failed);
            let error = classify(&call_err, &store);
            Ok(outcome_with(
                &mut store,
                None,
                gas_used,
                duration_ms,
                Some(error),
                &invocation,
            ))
        }
    }
}

/// Maps a call failure onto the termination classes.
fn classify(err: &anyhow::Error, store: &Store<HostCtx>) -> VmError {
    if let Some(violation) = &store.data().violation {
        return VmError::PolicyViolation(violation.clone());
    }
    match err.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => VmError::OutOfGas,
        Some(Trap::Interrupt) => VmError::Timeout,
        _ if store.data().memory.exceeded() => VmError::OutOfMemory,
        Some(trap) => VmError::Trap(trap.to_string()),
        None => VmError::Trap(format!("{:#}", err)),
    }
}

fn failed_outcome(
    error: VmError,
    store: &mut Store<HostCtx>,
    gas_cap: u64,
    started: Instant,
    invocation: &VmInvocation,
) -> VmOutcome {
    let gas_used = gas_cap.saturating_sub(store.get_fuel().unwrap_or(gas_cap));
    let duration_ms = started.elapsed().as_millis() as u64;
    outcome_with(store, None, gas_used, duration_ms, Some(error), invocation)
}

fn outcome_with(
    store: &mut Store<HostCtx>,
    output: Option<ScalarValue>,
    gas_used: u64,
    duration_ms: u64,
    error: Option<VmError>,
    invocation: &VmInvocation,
) -> VmOutcome {
    let ctx = store.data_mut();
    let logs = std::mem::take(&mut ctx.events);
    let profile = invocation.collect_profile.then(|| GasProfile {
        instruction_counts: profile::opcode_histogram(&invocation.module_bytes),
        memory_usage: ctx.memory.peak() as u64,
        syscall_counts: ctx.syscall_counts.clone(),
    });
    let trace = invocation
        .collect_trace
        .then(|| profile::trace_entries(&invocation.module_bytes));
    VmOutcome {
        output,
        gas_used,
        duration_ms,
        logs,
        profile,
        trace,
        error,
    }
}

fn zero_val(ty: &ValType) -> Val {
    match ty {
        ValType::I32 => Val::I32(0),
        ValType::I64 => Val::I64(0),
        ValType::F32 => Val::F32(0),
        ValType::F64 => Val::F64(0),
        _ => Val::FuncRef(None), // unmarshalling rejects reference results
    }
}

/// Positional lists map to successive parameters; named maps go through
/// the artifact's schema record (its ordered parameter names).
fn marshal_inputs(
    inputs: &InputValues,
    param_names: Option<&[String]>,
    param_types: &[ValType],
) -> Result<Vec<Val>, VmError> {
    let positional: Vec<ScalarValue> = match inputs {
        InputValues::Positional(values) => values.clone(),
        InputValues::Named(map) => {
            let names = param_names.ok_or_else(|| {
                VmError::TypeUnsupported(
                    "named inputs require the artifact's parameter schema record".into(),
                )
            })?;
            let mut ordered = Vec::with_capacity(names.len());
            for name in names {
                let value = map.get(name).ok_or_else(|| {
                    VmError::TypeUnsupported(format!("missing named input {:?}", name))
                })?;
                ordered.push(value.clone());
            }
            ordered
        }
    };

    if positional.len() != param_types.len() {
        return Err(VmError::TypeUnsupported(format!(
            "entry expects {} input(s), found {}",
            param_types.len(),
            positional.len()
        )));
    }

    positional
        .iter()
        .zip(param_types)
        .map(|(value, ty)| marshal_val(value, ty))
        .collect()
}

fn marshal_val(value: &ScalarValue, ty: &ValType) -> Result<Val, VmError> {
    match (ty, value) {
        (ValType::I32, ScalarValue::Int(v)) => i32::try_from(*v)
            .map(Val::I32)
            .map_err(|_| VmError::TypeUnsupported(format!("{} exceeds i32 range", v))),
        (ValType::I32, ScalarValue::Bool(b)) => Ok(Val::I32(i32::from(*b))),
        (ValType::I64, ScalarValue::Int(v)) => Ok(Val::I64(*v)),
        (ValType::F64, ScalarValue::Float(v)) => Ok(Val::F64(v.to_bits())),
        (ValType::F64, ScalarValue::Int(v)) => Ok(Val::F64((*v as f64).to_bits())),
        (ty, value) => Err(VmError::TypeUnsupported(format!(
            "cannot marshal {:?} into {:?}",
            value, ty
        ))),
    }
}

fn unmarshal_val(val: &Val) -> Result<ScalarValue, VmError> {
    match val {
        Val::I32(v) => Ok(ScalarValue::Int(*v as i64)),
        Val::I64(v) => Ok(ScalarValue::Int(*v)),
        Val::F64(bits) => Ok(ScalarValue::Float(f64::from_bits(*bits))),
        other => Err(VmError::TypeUnsupported(format!(
            "unsupported return value {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifex_api::vm::CapabilityGate;
    use artifex_builder::{build, describe_source, BuildOptions};
    use artifex_types::control::EffectiveLimits;
    use std::collections::BTreeMap;

    fn limits() -> EffectiveLimits {
        EffectiveLimits {
            memory_bytes: 1 << 20,
            gas: 1_000_000,
            timeout_ms: 5_000,
        }
    }

    fn invocation(bytes: Vec<u8>, entry: &str, inputs: Vec<ScalarValue>) -> VmInvocation {
        VmInvocation {
            module_bytes: bytes,
            entry: entry.to_string(),
            inputs: InputValues::Positional(inputs),
            param_names: None,
            limits: limits(),
            gate: CapabilityGate::default(),
            collect_profile: false,
            collect_trace: false,
        }
    }

    fn built(src: &str) -> (Vec<u8>, String) {
        let source = describe_source(src).unwrap();
        let out = build(&source, &BuildOptions::default()).unwrap();
        (out.bytes, out.record.entry)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_executes_and_returns_five() {
        let (bytes, entry) = built("export function add(a,b){return a+b}");
        let executor = WasmExecutor::new("test-node").unwrap();
        let outcome = executor
            .execute(invocation(
                bytes,
                &entry,
                vec![ScalarValue::Int(2), ScalarValue::Int(3)],
            ))
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.output, Some(ScalarValue::Float(5.0)));
        assert!(outcome.gas_used > 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn named_inputs_marshal_through_the_schema() {
        let (bytes, entry) = built("export function sub(a,b){return a-b}");
        let executor = WasmExecutor::new("test-node").unwrap();
        let mut named = BTreeMap::new();
        named.insert("a".to_string(), ScalarValue::Int(10));
        named.insert("b".to_string(), ScalarValue::Int(4));

        let mut inv = invocation(bytes.clone(), &entry, vec![]);
        inv.inputs = InputValues::Named(named.clone());
        inv.param_names = Some(vec!["a".into(), "b".into()]);
        let outcome = executor.execute(inv).await.unwrap();
        assert_eq!(outcome.output, Some(ScalarValue::Float(6.0)));

        // Without the schema record, named inputs are unsupported.
        let mut inv = invocation(bytes, &entry, vec![]);
        inv.inputs = InputValues::Named(named);
        let err = executor.execute(inv).await.unwrap_err();
        assert!(matches!(err, VmError::TypeUnsupported(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gas_exhaustion_reports_the_full_cap() {
        let bytes = wat::parse_str(
            r#"(module (func (export "spin") (loop $l (br $l))))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let mut inv = invocation(bytes, "spin", vec![]);
        inv.limits.gas = 1_000;
        let outcome = executor.execute(inv).await.unwrap();
        assert!(!outcome.success());
        assert!(matches!(outcome.error, Some(VmError::OutOfGas)));
        assert_eq!(outcome.gas_used, 1_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wall_clock_deadline_interrupts() {
        let bytes = wat::parse_str(
            r#"(module (func (export "spin") (loop $l (br $l))))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let mut inv = invocation(bytes, "spin", vec![]);
        inv.limits.gas = u64::MAX / 2;
        inv.limits.timeout_ms = 100;
        let outcome = executor.execute(inv).await.unwrap();
        assert!(matches!(outcome.error, Some(VmError::Timeout)));
        assert!(outcome.gas_used > 0, "partial gas is still reported");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn traps_classify_as_runtime_errors() {
        let bytes = wat::parse_str(
            r#"(module (func (export "boom") (unreachable)))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let outcome = executor.execute(invocation(bytes, "boom", vec![])).await.unwrap();
        assert!(matches!(outcome.error, Some(VmError::Trap(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn growth_past_the_cap_is_out_of_memory() {
        // Cap is one page; the guest asks for sixteen more.
        let bytes = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "grow") (result i32)
                    (memory.grow (i32.const 16))))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let mut inv = invocation(bytes, "grow", vec![]);
        inv.limits.memory_bytes = 65_536;
        let outcome = executor.execute(inv).await.unwrap();
        assert!(matches!(outcome.error, Some(VmError::OutOfMemory)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn growth_within_the_cap_succeeds() {
        let bytes = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "grow") (result i32)
                    (memory.grow (i32.const 1))))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let mut inv = invocation(bytes, "grow", vec![]);
        inv.limits.memory_bytes = 2 * 65_536;
        let outcome = executor.execute(inv).await.unwrap();
        assert!(outcome.success(), "error: {:?}", outcome.error);
        assert_eq!(outcome.output, Some(ScalarValue::Int(1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn denied_capability_is_a_policy_violation() {
        let bytes = wat::parse_str(
            r#"(module
                (import "env" "read_counter" (func $rc (result i64)))
                (func (export "tick") (result i64) (call $rc)))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let mut inv = invocation(bytes.clone(), "tick", vec![]);
        inv.gate = CapabilityGate {
            allow: None,
            deny: vec!["read_counter".into()],
        };
        let outcome = executor.execute(inv).await.unwrap();
        assert!(matches!(outcome.error, Some(VmError::PolicyViolation(_))));

        // Permitted, the same guest runs and the call is counted.
        let mut inv = invocation(bytes, "tick", vec![]);
        inv.collect_profile = true;
        let outcome = executor.execute(inv).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.output, Some(ScalarValue::Int(0)));
        let profile = outcome.profile.unwrap();
        assert_eq!(profile.syscall_counts.get("read_counter"), Some(&1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn emitted_events_become_logs() {
        let bytes = wat::parse_str(
            r#"(module
                (import "env" "emit_event" (func $emit (param i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "hello from guest")
                (func (export "speak")
                    (call $emit (i32.const 0) (i32.const 16))))"#,
        )
        .unwrap();
        let executor = WasmExecutor::new("test-node").unwrap();
        let outcome = executor.execute(invocation(bytes, "speak", vec![])).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.logs, vec!["hello from guest".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn arity_mismatch_is_type_unsupported() {
        let (bytes, entry) = built("export function add(a,b){return a+b}");
        let executor = WasmExecutor::new("test-node").unwrap();
        let err = executor
            .execute(invocation(bytes, &entry, vec![ScalarValue::Int(1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, VmError::TypeUnsupported(_)));
    }
}
