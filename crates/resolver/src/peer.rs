// Path: crates/resolver/src/peer.rs
//! The peer-network block client.
//!
//! The shipped implementation speaks the IPFS-compatible HTTP block API
//! (`POST /api/v0/block/get?arg=<cid>`), which is how a co-located content
//! daemon exposes its CID-addressed store. Bytes returned here are
//! untrusted and go through the resolver's double verification like any
//! other network source.

use artifex_api::ContentNetwork;
use artifex_cid::ByteCid;
use artifex_types::error::ResolveError;
use async_trait::async_trait;
use std::time::Duration;

/// A block client for an IPFS-compatible HTTP endpoint.
pub struct IpfsBlockStore {
    endpoint: String,
    http: reqwest::Client,
}

impl IpfsBlockStore {
    /// Connects to a block endpoint such as `http://127.0.0.1:5001`.
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ResolveError::NetworkFatal(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[async_trait]
impl ContentNetwork for IpfsBlockStore {
    async fn fetch_block(&self, cid: &ByteCid) -> Result<Vec<u8>, ResolveError> {
        let url = format!(
            "{}/api/v0/block/get?arg={}",
            self.endpoint.trim_end_matches('/'),
            cid
        );
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| ResolveError::NetworkTransient(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ResolveError::NetworkTransient(e.to_string()))?;
            return Ok(bytes.to_vec());
        }
        // The block API reports unknown CIDs as client errors.
        if status.is_client_error() {
            return Err(ResolveError::NotFound(format!(
                "peer does not hold {}",
                cid
            )));
        }
        Err(ResolveError::NetworkTransient(format!(
            "{} from {}",
            status, url
        )))
    }

    fn label(&self) -> &'static str {
        "ipfs"
    }
}
