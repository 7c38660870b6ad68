// Path: crates/policy/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Declarative admission policy evaluation.
//!
//! The engine is a pure function of its inputs: the request attributes,
//! the ordered rule set, and the trusted signer set. Rules carry data, not
//! code; the condition vocabulary is a fixed set of comparators, and the
//! first matching rule wins. When nothing matches, the default is deny.
//!
//! Impure artifacts are a special bar: even an allowing rule only admits
//! them when it explicitly carries the `allow_impure` grant.

use artifex_types::policy::{
    PolicyDecision, PolicyInput, PolicyRule, PolicyRuleSet, RuleConditions, Verdict,
};
use std::collections::HashSet;

/// The rule evaluator.
pub struct PolicyEngine;

impl PolicyEngine {
    /// Evaluates `input` against `rules`, first match wins, default deny.
    pub fn decide(
        input: &PolicyInput,
        rules: &PolicyRuleSet,
        trusted_signers: &HashSet<String>,
    ) -> PolicyDecision {
        for rule in &rules.rules {
            if !Self::conditions_hold(&rule.when, input, trusted_signers) {
                continue;
            }
            // The impure bar: an otherwise-admitting rule without the
            // grant turns into a denial.
            if input.impure
                && !rule.allow_impure
                && matches!(rule.verdict, Verdict::Allow | Verdict::Warn)
            {
                tracing::debug!(
                    target: "policy",
                    cid = %input.cid,
                    rule = rule.id.as_deref().unwrap_or("<unnamed>"),
                    "impure artifact matched a rule without allow_impure"
                );
                return PolicyDecision {
                    verdict: Verdict::Deny,
                    reason: "artifact is impure and the matching rule does not allow impure \
                             execution"
                        .to_string(),
                    rule_id: rule.id.clone(),
                };
            }
            return PolicyDecision {
                verdict: rule.verdict,
                reason: Self::reason_for(rule),
                rule_id: rule.id.clone(),
            };
        }
        PolicyDecision {
            verdict: Verdict::Deny,
            reason: "no admission rule matched; the default is deny".to_string(),
            rule_id: None,
        }
    }

    fn reason_for(rule: &PolicyRule) -> String {
        rule.reason.clone().unwrap_or_else(|| {
            format!(
                "matched rule {}",
                rule.id.as_deref().unwrap_or("<unnamed>")
            )
        })
    }

    /// Every present condition must hold; absent conditions do not
    /// constrain the match.
    fn conditions_hold(
        when: &RuleConditions,
        input: &PolicyInput,
        trusted_signers: &HashSet<String>,
    ) -> bool {
        if let Some(required) = when.require_verified_structural {
            if input.structural_verified != required {
                return false;
            }
        }
        if let Some(threshold) = when.min_structural_similarity {
            match input.structural_similarity {
                Some(similarity) if similarity >= threshold => {}
                _ => return false,
            }
        }
        if let Some(required) = when.require_trusted_signature {
            let trusted = input
                .signature
                .as_deref()
                .is_some_and(|sig| trusted_signers.contains(sig));
            if trusted != required {
                return false;
            }
        }
        if let Some(whitelist) = &when.cid_whitelist {
            if !whitelist.iter().any(|c| c == &input.cid) {
                return false;
            }
        }
        if let Some(max_gas) = when.max_gas {
            if input.gas_limit > max_gas {
                return false;
            }
        }
        if let Some(max_complexity) = when.max_complexity {
            match input.complexity {
                Some(complexity) if complexity <= max_complexity => {}
                _ => return false,
            }
        }
        if let Some(floor) = when.min_gas_for_complexity {
            if input.gas_limit < floor {
                return false;
            }
        }
        if let Some(required) = when.required_resonance_hz {
            if input.resonance_hz != Some(required) {
                return false;
            }
        }
        if let Some(callers) = &when.callers {
            if !callers.iter().any(|c| c == &input.caller) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PolicyInput {
        PolicyInput {
            cid: "bafkreiexample".into(),
            structural_hash: Some("phash:v1:sha256:abc".into()),
            structural_verified: true,
            structural_similarity: Some(0.99),
            signature: Some("signer-a".into()),
            gas_limit: 1_000_000,
            memory_bytes: 1 << 20,
            timeout_ms: 5_000,
            caller: "caller-1".into(),
            function_name: Some("add".into()),
            resonance_hz: Some(432),
            complexity: Some(0.2),
            impure: false,
        }
    }

    fn allow_rule(when: RuleConditions) -> PolicyRule {
        PolicyRule {
            id: Some("r1".into()),
            verdict: Verdict::Allow,
            when,
            allow_impure: false,
            reason: Some("test allow".into()),
        }
    }

    fn trusted() -> HashSet<String> {
        ["signer-a".to_string()].into_iter().collect()
    }

    #[test]
    fn default_is_deny() {
        let decision = PolicyEngine::decide(&input(), &PolicyRuleSet::default(), &trusted());
        assert_eq!(decision.verdict, Verdict::Deny);
        assert!(decision.rule_id.is_none());
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = PolicyRuleSet {
            rules: vec![
                PolicyRule {
                    id: Some("warn-first".into()),
                    verdict: Verdict::Warn,
                    when: RuleConditions::default(),
                    allow_impure: false,
                    reason: None,
                },
                allow_rule(RuleConditions::default()),
            ],
        };
        let decision = PolicyEngine::decide(&input(), &rules, &trusted());
        assert_eq!(decision.verdict, Verdict::Warn);
        assert_eq!(decision.rule_id.as_deref(), Some("warn-first"));
    }

    #[test]
    fn trusted_signature_condition() {
        let rules = PolicyRuleSet {
            rules: vec![allow_rule(RuleConditions {
                require_trusted_signature: Some(true),
                ..Default::default()
            })],
        };
        assert_eq!(
            PolicyEngine::decide(&input(), &rules, &trusted()).verdict,
            Verdict::Allow
        );

        let mut unsigned = input();
        unsigned.signature = None;
        assert_eq!(
            PolicyEngine::decide(&unsigned, &rules, &trusted()).verdict,
            Verdict::Deny
        );

        let mut unknown = input();
        unknown.signature = Some("stranger".into());
        assert_eq!(
            PolicyEngine::decide(&unknown, &rules, &trusted()).verdict,
            Verdict::Deny
        );
    }

    #[test]
    fn similarity_threshold_and_whitelist() {
        let rules = PolicyRuleSet {
            rules: vec![allow_rule(RuleConditions {
                min_structural_similarity: Some(0.95),
                cid_whitelist: Some(vec!["bafkreiexample".into()]),
                ..Default::default()
            })],
        };
        assert_eq!(
            PolicyEngine::decide(&input(), &rules, &trusted()).verdict,
            Verdict::Allow
        );

        let mut dissimilar = input();
        dissimilar.structural_similarity = Some(0.5);
        assert_eq!(
            PolicyEngine::decide(&dissimilar, &rules, &trusted()).verdict,
            Verdict::Deny
        );

        let mut other_cid = input();
        other_cid.cid = "bafkreiother".into();
        assert_eq!(
            PolicyEngine::decide(&other_cid, &rules, &trusted()).verdict,
            Verdict::Deny
        );
    }

    #[test]
    fn gas_and_complexity_budget_consistency() {
        let rules = PolicyRuleSet {
            rules: vec![allow_rule(RuleConditions {
                max_gas: Some(2_000_000),
                max_complexity: Some(0.5),
                min_gas_for_complexity: Some(100_000),
                ..Default::default()
            })],
        };
        assert_eq!(
            PolicyEngine::decide(&input(), &rules, &trusted()).verdict,
            Verdict::Allow
        );

        let mut greedy = input();
        greedy.gas_limit = 5_000_000;
        assert_eq!(
            PolicyEngine::decide(&greedy, &rules, &trusted()).verdict,
            Verdict::Deny
        );

        let mut starved = input();
        starved.gas_limit = 1_000;
        assert_eq!(
            PolicyEngine::decide(&starved, &rules, &trusted()).verdict,
            Verdict::Deny
        );
    }

    #[test]
    fn resonance_attestation_must_match_exactly() {
        let rules = PolicyRuleSet {
            rules: vec![allow_rule(RuleConditions {
                required_resonance_hz: Some(432),
                ..Default::default()
            })],
        };
        assert_eq!(
            PolicyEngine::decide(&input(), &rules, &trusted()).verdict,
            Verdict::Allow
        );

        let mut detuned = input();
        detuned.resonance_hz = Some(440);
        assert_eq!(
            PolicyEngine::decide(&detuned, &rules, &trusted()).verdict,
            Verdict::Deny
        );
    }

    #[test]
    fn impure_artifacts_need_the_explicit_grant() {
        let mut impure = input();
        impure.impure = true;

        let without_grant = PolicyRuleSet {
            rules: vec![allow_rule(RuleConditions::default())],
        };
        let decision = PolicyEngine::decide(&impure, &without_grant, &trusted());
        assert_eq!(decision.verdict, Verdict::Deny);

        let with_grant = PolicyRuleSet {
            rules: vec![PolicyRule {
                allow_impure: true,
                ..allow_rule(RuleConditions::default())
            }],
        };
        assert_eq!(
            PolicyEngine::decide(&impure, &with_grant, &trusted()).verdict,
            Verdict::Allow
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rules = PolicyRuleSet {
            rules: vec![allow_rule(RuleConditions::default())],
        };
        let a = PolicyEngine::decide(&input(), &rules, &trusted());
        let b = PolicyEngine::decide(&input(), &rules, &trusted());
        assert_eq!(a, b);
    }
}
