// Path: crates/api/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Boundary traits between artifex pipeline components.
//!
//! Components own their records for their lifetime and hand read-only
//! views across these seams; the traits here are the only places where
//! ownership transfer happens (builder to index, resolver to executor,
//! executor to gateway).

/// Naming-service seam for scheme-prefixed logical names.
pub mod naming;
/// Peer-network seam for CID-addressed block fetching.
pub mod network;
/// Sandbox executor seam.
pub mod vm;

pub use naming::NamingService;
pub use network::ContentNetwork;
pub use vm::{CapabilityGate, VirtualMachine, VmInvocation, VmOutcome};
