// Path: crates/api/src/naming.rs
//! Naming-service seam for scheme-prefixed logical names.

use artifex_cid::ByteCid;
use async_trait::async_trait;

/// Scheme prefix for logical names in execution requests.
pub const NAME_SCHEME: &str = "name:";

/// Resolves logical artifact names to byte-CIDs.
///
/// Requests may target `name:<logical>` instead of a raw CID; the gateway
/// resolves the name through this service before admission continues.
#[async_trait]
pub trait NamingService: Send + Sync {
    /// Resolves `logical` to a CID, or `None` when the name is unknown.
    async fn resolve_name(&self, logical: &str) -> Option<ByteCid>;
}
