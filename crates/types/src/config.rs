// Path: crates/types/src/config.rs
//! Shared configuration structures for pipeline components.
//!
//! The on-disk format is TOML; environment overrides are applied by the
//! control plane on top of the parsed file, and compiled defaults sit at
//! the bottom of the precedence order.

use crate::control::ControlState;
use crate::policy::PolicyRuleSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One HTTP mirror serving artifact bytes by CID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Base URL; the resolver appends `/<cid>`.
    pub url: String,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: u32,
}

/// Resolver tuning: sources, retry budget, and backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// HTTP mirrors in declared priority order.
    #[serde(default)]
    pub mirrors: Vec<MirrorConfig>,
    /// Peer-network block endpoint, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_endpoint: Option<String>,
    /// Attempts per mirror before moving on.
    #[serde(default = "default_mirror_attempts")]
    pub mirror_attempts: u32,
    /// Base backoff between attempts, milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling, milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Per-request HTTP timeout, milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_mirror_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_cap_ms() -> u64 {
    5_000
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mirrors: Vec::new(),
            peer_endpoint: None,
            mirror_attempts: default_mirror_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

/// Gateway admission tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayParams {
    /// Sustained admissions per caller per window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Rate window in seconds.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Burst size of the per-caller token bucket.
    #[serde(default = "default_rate_burst")]
    pub rate_burst: u32,
    /// Idempotency entry TTL in seconds.
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,
    /// Request body cap in KiB on the HTTP surface.
    #[serde(default = "default_body_limit_kb")]
    pub body_limit_kb: usize,
    /// Concurrent in-flight requests on the HTTP surface.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_rate_limit() -> u32 {
    10
}
fn default_rate_window_secs() -> u64 {
    60
}
fn default_rate_burst() -> u32 {
    10
}
fn default_idempotency_ttl_secs() -> u64 {
    300
}
fn default_body_limit_kb() -> usize {
    256
}
fn default_concurrency() -> usize {
    128
}

impl Default for GatewayParams {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
            rate_burst: default_rate_burst(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            body_limit_kb: default_body_limit_kb(),
            concurrency: default_concurrency(),
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity reported in events and results.
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// HTTP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Root directory of the content-addressed artifact cache.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// Directories scanned for build manifests.
    #[serde(default = "default_manifest_dirs")]
    pub manifest_dirs: Vec<PathBuf>,
    /// Control-plane flags and limit defaults.
    #[serde(default)]
    pub control: ControlState,
    /// Gateway admission tuning.
    #[serde(default)]
    pub gateway: GatewayParams,
    /// Resolver sources and retry budget.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Signature tokens accepted by trusted-signature policy rules.
    #[serde(default)]
    pub trusted_signers: Vec<String>,
    /// The declarative admission rule set.
    #[serde(default)]
    pub policy: PolicyRuleSet,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            listen_addr: default_listen_addr(),
            cache_root: default_cache_root(),
            manifest_dirs: default_manifest_dirs(),
            control: ControlState::default(),
            gateway: GatewayParams::default(),
            resolver: ResolverConfig::default(),
            trusted_signers: Vec::new(),
            policy: PolicyRuleSet::default(),
        }
    }
}

fn default_node_name() -> String {
    "artifex-local".to_string()
}
fn default_listen_addr() -> String {
    "127.0.0.1:8700".to_string()
}
fn default_cache_root() -> PathBuf {
    PathBuf::from("artifacts/cache")
}
fn default_manifest_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("artifacts/manifests")]
}
