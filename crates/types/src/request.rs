// Path: crates/types/src/request.rs
//! The public execution request schema and its validation.

use crate::error::GatewayError;
use crate::record::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum accepted CID or logical-name length in a request.
const MAX_TARGET_LEN: usize = 256;
/// Maximum number of inputs in one request.
const MAX_INPUTS: usize = 64;
/// Idempotency key length bounds.
const IDEMPOTENCY_KEY_MIN: usize = 8;
const IDEMPOTENCY_KEY_MAX: usize = 128;

/// Positional or named inputs for the entry function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValues {
    /// Values mapped to successive exported function parameters.
    Positional(Vec<ScalarValue>),
    /// Values mapped through the artifact's schema record.
    Named(BTreeMap<String, ScalarValue>),
}

impl Default for InputValues {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl InputValues {
    /// Number of supplied values.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(v) => v.len(),
            Self::Named(m) => m.len(),
        }
    }

    /// True when no values were supplied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caller-declared caps for one execution.
///
/// Each cap is clamped against the control-plane ranges before use; absent
/// fields fall back to the effective defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPolicy {
    /// Linear-memory cap in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_bytes: Option<u64>,
    /// Gas cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gas: Option<u64>,
    /// Wall-clock timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Capabilities the sandbox may expose; absent means all built-ins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_capabilities: Option<Vec<String>>,
    /// Capabilities explicitly denied; takes precedence over allows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_capabilities: Option<Vec<String>>,
}

/// Request metadata, including attestations from upstream manifests.
///
/// The attestation fields (`resonance_hz`, `complexity`, `signature`,
/// `phi_values`) are treated as opaque attributes; the policy engine enforces
/// whatever the configured rules require of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Logical function name, for events and policy matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Caller-declared artifact version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Opaque resonance tag from an upstream manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resonance_hz: Option<u64>,
    /// Attested complexity scalar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    /// Structural-hash signature token, checked against the trusted set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Attested spectral vector, compared against the resolved record for
    /// the structural-similarity policy rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phi_values: Option<Vec<f64>>,
}

/// Per-request output options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Return events emitted by the guest as `logs`.
    #[serde(default)]
    pub return_logs: bool,
    /// Return the gas profile (instruction, memory, syscall accounting).
    #[serde(default)]
    pub return_gas_profile: bool,
    /// Return a per-instruction trace.
    #[serde(default)]
    pub trace_execution: bool,
    /// Wall-clock timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A request submitted to the intent gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Target: a raw CID text form, or a scheme-prefixed logical name
    /// (`name:<logical>`) resolved through the naming service.
    pub cid: String,
    /// Inputs for the entry function.
    #[serde(default)]
    pub inputs: InputValues,
    /// Caller-declared execution caps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<RequestPolicy>,
    /// Caller-chosen idempotency key, scoped to the caller identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Metadata and attestations.
    #[serde(default)]
    pub metadata: RequestMetadata,
    /// Output options.
    #[serde(default)]
    pub options: RequestOptions,
}

impl ExecutionRequest {
    /// Validates field constraints; the first violation is returned as
    /// `InvalidRequest`.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.cid.is_empty() {
            return Err(GatewayError::InvalidRequest("cid must not be empty".into()));
        }
        if self.cid.len() > MAX_TARGET_LEN {
            return Err(GatewayError::InvalidRequest(format!(
                "cid exceeds {} characters",
                MAX_TARGET_LEN
            )));
        }
        if self.inputs.len() > MAX_INPUTS {
            return Err(GatewayError::InvalidRequest(format!(
                "at most {} inputs are accepted",
                MAX_INPUTS
            )));
        }
        if let Some(key) = &self.idempotency_key {
            validate_idempotency_key(key)?;
        }
        if let Some(p) = self.metadata.complexity {
            if !(0.0..=1.0).contains(&p) {
                return Err(GatewayError::InvalidRequest(
                    "metadata.complexity must be within [0, 1]".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Idempotency keys are 8-128 characters from `[A-Za-z0-9_-]`.
fn validate_idempotency_key(key: &str) -> Result<(), GatewayError> {
    if key.len() < IDEMPOTENCY_KEY_MIN || key.len() > IDEMPOTENCY_KEY_MAX {
        return Err(GatewayError::InvalidRequest(format!(
            "idempotency_key length must be {}..={}",
            IDEMPOTENCY_KEY_MIN, IDEMPOTENCY_KEY_MAX
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GatewayError::InvalidRequest(
            "idempotency_key contains characters outside [A-Za-z0-9_-]".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(cid: &str) -> ExecutionRequest {
        serde_json::from_value(serde_json::json!({ "cid": cid })).unwrap()
    }

    #[test]
    fn minimal_request_is_valid() {
        assert!(minimal("bafkreiabc").validate().is_ok());
    }

    #[test]
    fn idempotency_key_charset_is_enforced() {
        let mut req = minimal("bafkreiabc");
        req.idempotency_key = Some("ok_key-123".into());
        assert!(req.validate().is_ok());

        req.idempotency_key = Some("short".into());
        assert!(req.validate().is_err());

        req.idempotency_key = Some("has spaces!".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn named_and_positional_inputs_parse() {
        let req: ExecutionRequest =
            serde_json::from_str(r#"{ "cid": "c", "inputs": [2, 3] }"#).unwrap();
        assert!(matches!(req.inputs, InputValues::Positional(ref v) if v.len() == 2));

        let req: ExecutionRequest =
            serde_json::from_str(r#"{ "cid": "c", "inputs": { "a": 2, "b": 3 } }"#).unwrap();
        assert!(matches!(req.inputs, InputValues::Named(ref m) if m.len() == 2));
    }
}
