// Path: crates/api/src/network.rs
//! Peer-network seam for CID-addressed block fetching.

use artifex_cid::ByteCid;
use artifex_types::error::ResolveError;
use async_trait::async_trait;

/// A content-addressable peer store the resolver may consult.
///
/// Implementations fetch raw block bytes by CID. Returned bytes are
/// untrusted: the resolver re-verifies the digest and length against the
/// expected record on every fetch.
#[async_trait]
pub trait ContentNetwork: Send + Sync {
    /// Fetches the block addressed by `cid`.
    ///
    /// `NotFound` means the network does not hold the block; transient
    /// failures should be reported as `NetworkTransient` so the resolver
    /// can move on to its mirror tier.
    async fn fetch_block(&self, cid: &ByteCid) -> Result<Vec<u8>, ResolveError>;

    /// A short label for logs and metrics (`ipfs`, `mock`, ...).
    fn label(&self) -> &'static str;
}
