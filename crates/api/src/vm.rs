// Path: crates/api/src/vm.rs
//! Defines the core trait and types for the sandbox executor.

use artifex_types::control::EffectiveLimits;
use artifex_types::error::VmError;
use artifex_types::record::ScalarValue;
use artifex_types::request::InputValues;
use artifex_types::result::{GasProfile, TraceEntry};
use async_trait::async_trait;

/// The capability names a guest may be granted.
pub const CAPABILITY_EMIT_EVENT: &str = "emit_event";
pub const CAPABILITY_READ_CLOCK: &str = "read_clock";
pub const CAPABILITY_READ_COUNTER: &str = "read_counter";

/// The syscall gate for one execution: which host capabilities the guest
/// may call. Denies take precedence over allows; an absent allow list
/// grants all built-ins.
#[derive(Debug, Clone, Default)]
pub struct CapabilityGate {
    /// Explicit allow list; `None` grants every built-in capability.
    pub allow: Option<Vec<String>>,
    /// Explicit deny list; always wins.
    pub deny: Vec<String>,
}

impl CapabilityGate {
    /// Whether `capability` may be called under this gate.
    pub fn permits(&self, capability: &str) -> bool {
        if self.deny.iter().any(|c| c == capability) {
            return false;
        }
        match &self.allow {
            Some(allowed) => allowed.iter().any(|c| c == capability),
            None => true,
        }
    }
}

/// One execution order handed to the sandbox.
#[derive(Debug, Clone)]
pub struct VmInvocation {
    /// Verified module bytes.
    pub module_bytes: Vec<u8>,
    /// Entry export name.
    pub entry: String,
    /// Positional or named inputs.
    pub inputs: InputValues,
    /// Declared parameter names, in order; the schema record required for
    /// named inputs.
    pub param_names: Option<Vec<String>>,
    /// Resolved resource caps.
    pub limits: EffectiveLimits,
    /// The syscall gate.
    pub gate: CapabilityGate,
    /// Collect the gas profile (memory peak, syscall counts, opcodes).
    pub collect_profile: bool,
    /// Collect a per-instruction trace.
    pub collect_trace: bool,
}

/// The outcome of one sandbox execution.
///
/// Execution-class failures are carried in `error` with partial gas and
/// duration still reported; `error == None` means the entry returned.
#[derive(Debug)]
pub struct VmOutcome {
    /// The returned value, when the entry completed.
    pub output: Option<ScalarValue>,
    /// Gas consumed.
    pub gas_used: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Events emitted by the guest through `emit_event`.
    pub logs: Vec<String>,
    /// Resource accounting, when requested.
    pub profile: Option<GasProfile>,
    /// Per-instruction records, when requested.
    pub trace: Option<Vec<TraceEntry>>,
    /// The execution-class failure, if any.
    pub error: Option<VmError>,
}

impl VmOutcome {
    /// True when the entry returned normally.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A sandboxed execution environment for verified WASM artifacts.
#[async_trait]
pub trait VirtualMachine: Send + Sync {
    /// Instantiates the module under the invocation's limits, invokes the
    /// entry export with the marshalled inputs, and collects the outcome.
    ///
    /// Errors returned here are pipeline failures (bad input types, engine
    /// trouble); guest terminations land in `VmOutcome::error`.
    async fn execute(&self, invocation: VmInvocation) -> Result<VmOutcome, VmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_default_allows_builtins_and_deny_wins() {
        let gate = CapabilityGate::default();
        assert!(gate.permits(CAPABILITY_EMIT_EVENT));

        let gate = CapabilityGate {
            allow: Some(vec![CAPABILITY_READ_CLOCK.into()]),
            deny: vec![CAPABILITY_READ_CLOCK.into()],
        };
        assert!(!gate.permits(CAPABILITY_READ_CLOCK));
        assert!(!gate.permits(CAPABILITY_EMIT_EVENT));
    }
}
