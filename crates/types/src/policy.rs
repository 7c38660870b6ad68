// Path: crates/types/src/policy.rs
//! Declarative policy rules and the attribute record they evaluate over.
//!
//! Rules are data, never code: the condition vocabulary is fixed to the
//! comparators below and evaluation is a pure function of the inputs.

use serde::{Deserialize, Serialize};

/// The admission verdict of the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Let the execution proceed.
    Allow,
    /// Let the execution proceed but mark the terminal event.
    Warn,
    /// Reject the request.
    Deny,
}

/// Conditions that must all hold for a rule to match.
///
/// Absent fields do not constrain the match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConditions {
    /// The request must (or must not) carry a structural hash that the
    /// resolved record verifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_verified_structural: Option<bool>,
    /// Cosine similarity between the attested and recorded spectral
    /// vectors must be at least this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_structural_similarity: Option<f64>,
    /// The request must carry a signature token from the trusted set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_trusted_signature: Option<bool>,
    /// The target CID must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid_whitelist: Option<Vec<String>>,
    /// The declared gas cap must not exceed this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gas: Option<u64>,
    /// The attested complexity must not exceed this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_complexity: Option<f64>,
    /// Gas floor required when complexity meets or exceeds
    /// `max_complexity`; guards against under-budgeted complex artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_gas_for_complexity: Option<u64>,
    /// The request must attest exactly this resonance tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_resonance_hz: Option<u64>,
    /// Restrict the rule to these callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callers: Option<Vec<String>>,
}

/// One declarative admission rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Optional identifier, echoed in decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Verdict when the rule matches.
    pub verdict: Verdict,
    /// Conditions that must all hold.
    #[serde(default)]
    pub when: RuleConditions,
    /// Grants execution to impure artifacts; without a matching rule
    /// carrying this grant, impure artifacts are always denied.
    #[serde(default)]
    pub allow_impure: bool,
    /// Human-readable reason attached to decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The ordered rule set; first matching rule wins, default is deny.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyRuleSet {
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// The attributes of one execution request, as seen by the policy engine.
///
/// Transient; assembled by the gateway per request and never persisted.
#[derive(Debug, Clone)]
pub struct PolicyInput {
    /// Resolved target CID.
    pub cid: String,
    /// Structural hash of the resolved record, when known.
    pub structural_hash: Option<String>,
    /// True when the request attested a structural hash and the resolved
    /// record carries the same one.
    pub structural_verified: bool,
    /// Cosine similarity between attested and recorded spectral vectors.
    pub structural_similarity: Option<f64>,
    /// Signature token carried by the request.
    pub signature: Option<String>,
    /// Effective gas cap.
    pub gas_limit: u64,
    /// Effective memory cap in bytes.
    pub memory_bytes: u64,
    /// Effective timeout in milliseconds.
    pub timeout_ms: u64,
    /// Caller identity.
    pub caller: String,
    /// Logical function name from request metadata.
    pub function_name: Option<String>,
    /// Attested resonance tag.
    pub resonance_hz: Option<u64>,
    /// Attested complexity scalar.
    pub complexity: Option<f64>,
    /// True when the resolved record is labeled impure.
    pub impure: bool,
}

/// The outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    /// The verdict.
    pub verdict: Verdict,
    /// Why; either the matching rule's reason or a synthesized one.
    pub reason: String,
    /// The matching rule's id, when it had one.
    pub rule_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_deserialize_from_config_shape() {
        let raw = r#"
            [[rules]]
            verdict = "allow"
            reason = "trusted publishers"
            [rules.when]
            require_trusted_signature = true
            max_gas = 1000000
        "#;
        let set: PolicyRuleSet = toml::from_str(raw).unwrap();
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].verdict, Verdict::Allow);
        assert_eq!(set.rules[0].when.max_gas, Some(1_000_000));
        assert!(!set.rules[0].allow_impure);
    }
}
