// Path: crates/types/src/result.rs
//! Terminal execution result records.

use crate::error::VmError;
use crate::record::ScalarValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The execution-class failure kinds reported on a terminal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Wall-clock deadline expired.
    Timeout,
    /// Gas cap exhausted.
    OutOfGas,
    /// Memory cap exceeded.
    OutOfMemory,
    /// The module trapped.
    RuntimeError,
    /// The syscall gateway rejected a capability call.
    PolicyViolation,
}

impl ErrorType {
    /// The snake_case wire form, also used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::OutOfGas => "out_of_gas",
            Self::OutOfMemory => "out_of_memory",
            Self::RuntimeError => "runtime_error",
            Self::PolicyViolation => "policy_violation",
        }
    }

    /// Maps an executor error to its terminal error type, when it has one.
    ///
    /// `TypeUnsupported` and `Initialization` are pipeline failures, not
    /// execution terminations, and have no terminal type.
    pub fn from_vm_error(err: &VmError) -> Option<Self> {
        match err {
            VmError::Timeout => Some(Self::Timeout),
            VmError::OutOfGas => Some(Self::OutOfGas),
            VmError::OutOfMemory => Some(Self::OutOfMemory),
            VmError::Trap(_) => Some(Self::RuntimeError),
            VmError::PolicyViolation(_) => Some(Self::PolicyViolation),
            VmError::TypeUnsupported(_) | VmError::Initialization(_) => None,
        }
    }
}

/// Gas and resource accounting for one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GasProfile {
    /// Module opcode histogram, keyed by instruction mnemonic.
    pub instruction_counts: BTreeMap<String, u64>,
    /// Peak linear memory in bytes.
    pub memory_usage: u64,
    /// Capability call counts, keyed by capability name.
    pub syscall_counts: BTreeMap<String, u64>,
}

/// One entry of a per-instruction trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Instruction mnemonic.
    pub op: String,
    /// Occurrences in the module body.
    pub count: u64,
}

/// The terminal record produced exactly once per admitted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResultRecord {
    /// Server-chosen request id.
    pub request_id: String,
    /// True when the entry returned normally.
    pub success: bool,
    /// The returned value, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ScalarValue>,
    /// Gas consumed; present even for execution-class failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Guest-emitted events, when `options.return_logs` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
    /// Resource accounting, when `options.return_gas_profile` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_profile: Option<GasProfile>,
    /// Per-instruction records, when `options.trace_execution` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceEntry>>,
    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    /// Set when the policy verdict was `warn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// When the terminal record was produced.
    pub executed_at: DateTime<Utc>,
    /// Identity of the executing node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_node: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorType::OutOfGas).unwrap(),
            "\"out_of_gas\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorType::RuntimeError).unwrap(),
            "\"runtime_error\""
        );
    }

    #[test]
    fn execution_classes_map_to_terminal_types() {
        assert_eq!(
            ErrorType::from_vm_error(&VmError::Timeout),
            Some(ErrorType::Timeout)
        );
        assert_eq!(
            ErrorType::from_vm_error(&VmError::TypeUnsupported("x".into())),
            None
        );
    }
}
