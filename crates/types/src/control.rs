// Path: crates/types/src/control.rs
//! Control-plane state, limit defaults, and effective limit computation.

use crate::request::{RequestOptions, RequestPolicy};
use serde::{Deserialize, Serialize};

/// Memory cap bounds in bytes.
pub const MEMORY_BYTES_MIN: u64 = 1024;
pub const MEMORY_BYTES_MAX: u64 = 1 << 30;
/// Gas cap bounds.
pub const GAS_MIN: u64 = 1_000;
pub const GAS_MAX: u64 = 1_000_000_000;
/// Wall-clock timeout bounds in milliseconds.
pub const TIMEOUT_MS_MIN: u64 = 100;
pub const TIMEOUT_MS_MAX: u64 = 60_000;

/// Default resource caps applied when a request declares none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDefaults {
    /// Linear-memory cap in bytes.
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: u64,
    /// Gas cap.
    #[serde(default = "default_gas")]
    pub gas: u64,
    /// Wall-clock timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_memory_bytes() -> u64 {
    1 << 20
}
fn default_gas() -> u64 {
    1_000_000
}
fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for LimitDefaults {
    fn default() -> Self {
        Self {
            memory_bytes: default_memory_bytes(),
            gas: default_gas(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// The resolved caps for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLimits {
    /// Linear-memory cap in bytes.
    pub memory_bytes: u64,
    /// Gas cap.
    pub gas: u64,
    /// Wall-clock timeout in milliseconds.
    pub timeout_ms: u64,
}

impl EffectiveLimits {
    /// Resolves the caps for one request: caller-declared values override
    /// the defaults, then everything is clamped into the supported ranges.
    ///
    /// `options.timeout_ms` takes precedence over `policy.timeout_ms`.
    pub fn resolve(
        defaults: &LimitDefaults,
        policy: Option<&RequestPolicy>,
        options: &RequestOptions,
    ) -> Self {
        let memory_bytes = policy
            .and_then(|p| p.max_memory_bytes)
            .unwrap_or(defaults.memory_bytes)
            .clamp(MEMORY_BYTES_MIN, MEMORY_BYTES_MAX);
        let gas = policy
            .and_then(|p| p.max_gas)
            .unwrap_or(defaults.gas)
            .clamp(GAS_MIN, GAS_MAX);
        let timeout_ms = options
            .timeout_ms
            .or_else(|| policy.and_then(|p| p.timeout_ms))
            .unwrap_or(defaults.timeout_ms)
            .clamp(TIMEOUT_MS_MIN, TIMEOUT_MS_MAX);
        Self {
            memory_bytes,
            gas,
            timeout_ms,
        }
    }
}

/// The process-wide control state; read as one snapshot per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    /// Whether the pipeline accepts traffic at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hard kill switch; dominates every other flag.
    #[serde(default)]
    pub frozen: bool,
    /// Share of callers admitted while a rollout is in progress, 0..=1.
    #[serde(default = "default_canary")]
    pub canary_fraction: f64,
    /// Limit defaults applied to requests that declare no caps.
    #[serde(default)]
    pub limits: LimitDefaults,
}

fn default_true() -> bool {
    true
}
fn default_canary() -> f64 {
    1.0
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            enabled: true,
            frozen: false,
            canary_fraction: 1.0,
            limits: LimitDefaults::default(),
        }
    }
}

/// A partial update applied through the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitDefaults>,
}

/// Coarse health reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Disabled,
    Frozen,
}

impl ControlState {
    /// The coarse status derived from this snapshot. Freeze dominates.
    pub fn health(&self) -> HealthStatus {
        if self.frozen {
            HealthStatus::Frozen
        } else if !self.enabled {
            HealthStatus::Disabled
        } else {
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_clamp_into_supported_ranges() {
        let defaults = LimitDefaults::default();
        let policy = RequestPolicy {
            max_memory_bytes: Some(8),
            max_gas: Some(u64::MAX),
            timeout_ms: Some(1),
            ..Default::default()
        };
        let limits = EffectiveLimits::resolve(&defaults, Some(&policy), &RequestOptions::default());
        assert_eq!(limits.memory_bytes, MEMORY_BYTES_MIN);
        assert_eq!(limits.gas, GAS_MAX);
        assert_eq!(limits.timeout_ms, TIMEOUT_MS_MIN);
    }

    #[test]
    fn options_timeout_overrides_policy_timeout() {
        let defaults = LimitDefaults::default();
        let policy = RequestPolicy {
            timeout_ms: Some(2_000),
            ..Default::default()
        };
        let options = RequestOptions {
            timeout_ms: Some(7_000),
            ..Default::default()
        };
        let limits = EffectiveLimits::resolve(&defaults, Some(&policy), &options);
        assert_eq!(limits.timeout_ms, 7_000);
    }

    #[test]
    fn freeze_dominates_health() {
        let state = ControlState {
            enabled: false,
            frozen: true,
            ..Default::default()
        };
        assert_eq!(state.health(), HealthStatus::Frozen);
    }
}
