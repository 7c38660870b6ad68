// Path: crates/control/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Control plane.
//!
//! Holds the process-wide control state (enabled, frozen, canary fraction,
//! limit defaults) behind an atomically swapped snapshot. Readers take one
//! snapshot per request and use it consistently; updates go through a
//! serialized admin path and become visible atomically. Precedence, high
//! to low: environment overrides, the on-disk configuration file, compiled
//! defaults.

use arc_swap::ArcSwap;
use artifex_types::config::NodeConfig;
use artifex_types::control::{ControlPatch, ControlState};
use artifex_types::error::ControlError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Environment variable names recognized as overrides.
const ENV_ENABLED: &str = "ARTIFEX_ENABLED";
const ENV_FROZEN: &str = "ARTIFEX_FROZEN";
const ENV_CANARY: &str = "ARTIFEX_CANARY_FRACTION";
const ENV_GAS: &str = "ARTIFEX_DEFAULT_GAS";
const ENV_MEMORY: &str = "ARTIFEX_DEFAULT_MEMORY_BYTES";
const ENV_TIMEOUT: &str = "ARTIFEX_DEFAULT_TIMEOUT_MS";

/// The process-wide control plane.
pub struct ControlPlane {
    current: ArcSwap<ControlState>,
    // Serializes admin updates; snapshot readers never take this lock.
    admin: Mutex<()>,
}

impl ControlPlane {
    /// Wraps an already-resolved state.
    pub fn new(state: ControlState) -> Self {
        Self {
            current: ArcSwap::from_pointee(state),
            admin: Mutex::new(()),
        }
    }

    /// The consistent snapshot taken at the start of each request.
    pub fn snapshot(&self) -> Arc<ControlState> {
        self.current.load_full()
    }

    /// Applies a partial update through the admin surface.
    pub fn update(&self, patch: ControlPatch) -> Result<Arc<ControlState>, ControlError> {
        if let Some(fraction) = patch.canary_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ControlError::InvalidPatch(format!(
                    "canary_fraction {} is outside [0, 1]",
                    fraction
                )));
            }
        }
        let _guard = self
            .admin
            .lock()
            .map_err(|_| ControlError::InvalidPatch("admin lock poisoned".into()))?;
        let mut next = (*self.current.load_full()).clone();
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if let Some(frozen) = patch.frozen {
            next.frozen = frozen;
        }
        if let Some(fraction) = patch.canary_fraction {
            next.canary_fraction = fraction;
        }
        if let Some(limits) = patch.limits {
            next.limits = limits;
        }
        let next = Arc::new(next);
        self.current.store(next.clone());
        tracing::info!(
            target: "control",
            enabled = next.enabled,
            frozen = next.frozen,
            canary = next.canary_fraction,
            "control state updated"
        );
        Ok(next)
    }
}

/// Loads the full node configuration: compiled defaults, then the optional
/// TOML file, then environment overrides on the control section.
pub fn load_node_config(path: Option<&Path>) -> Result<NodeConfig, ControlError> {
    let mut config = match path {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).map_err(|e| ControlError::Io(e.to_string()))?;
            toml::from_str(&text).map_err(|e| ControlError::Parse(e.to_string()))?
        }
        None => NodeConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut NodeConfig) -> Result<(), ControlError> {
    if let Some(v) = env_parse::<bool>(ENV_ENABLED)? {
        config.control.enabled = v;
    }
    if let Some(v) = env_parse::<bool>(ENV_FROZEN)? {
        config.control.frozen = v;
    }
    if let Some(v) = env_parse::<f64>(ENV_CANARY)? {
        if !(0.0..=1.0).contains(&v) {
            return Err(ControlError::Parse(format!(
                "{} must be within [0, 1]",
                ENV_CANARY
            )));
        }
        config.control.canary_fraction = v;
    }
    if let Some(v) = env_parse::<u64>(ENV_GAS)? {
        config.control.limits.gas = v;
    }
    if let Some(v) = env_parse::<u64>(ENV_MEMORY)? {
        config.control.limits.memory_bytes = v;
    }
    if let Some(v) = env_parse::<u64>(ENV_TIMEOUT)? {
        config.control.limits.timeout_ms = v;
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ControlError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ControlError::Parse(format!("{}={:?} did not parse", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Deterministic canary admission: the caller's hash, scaled to [0, 1),
/// must fall below the fraction. The same caller always lands on the same
/// side of a given fraction.
pub fn canary_admits(caller: &str, fraction: f64) -> bool {
    if fraction >= 1.0 {
        return true;
    }
    if fraction <= 0.0 {
        return false;
    }
    let digest = Sha256::digest(caller.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let scaled = u64::from_be_bytes(prefix) as f64 / u64::MAX as f64;
    scaled < fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_stable_across_updates() {
        let plane = ControlPlane::new(ControlState::default());
        let before = plane.snapshot();
        plane
            .update(ControlPatch {
                frozen: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(!before.frozen, "a taken snapshot never changes");
        assert!(plane.snapshot().frozen);
    }

    #[test]
    fn invalid_canary_patch_is_rejected() {
        let plane = ControlPlane::new(ControlState::default());
        let err = plane
            .update(ControlPatch {
                canary_fraction: Some(1.5),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidPatch(_)));
    }

    #[test]
    fn canary_is_deterministic_and_monotone() {
        for caller in ["alice", "bob", "carol", "dave"] {
            assert_eq!(canary_admits(caller, 0.5), canary_admits(caller, 0.5));
            // Admission at a fraction implies admission at any larger one.
            if canary_admits(caller, 0.3) {
                assert!(canary_admits(caller, 0.7));
            }
        }
        assert!(canary_admits("anyone", 1.0));
        assert!(!canary_admits("anyone", 0.0));
    }

    #[test]
    fn file_then_defaults_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifex.toml");
        std::fs::write(
            &path,
            r#"
            [control]
            canary_fraction = 0.25
            "#,
        )
        .unwrap();
        let config = load_node_config(Some(&path)).unwrap();
        assert_eq!(config.control.canary_fraction, 0.25);
        // Untouched sections keep compiled defaults.
        assert_eq!(config.gateway.rate_limit, 10);
    }
}
