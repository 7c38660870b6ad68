// Path: crates/resolver/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Layered artifact resolution.
//!
//! Given a target identified by byte-CID and/or structural hash, the
//! resolver consults cache, the local file hint, the peer network, and the
//! HTTP mirrors, in that order, stopping at the first success. Every
//! non-cache path passes the retrieved bytes through double verification
//! (recomputed CID and SHA-256, plus a length check) before they are
//! promoted into the cache; bytes that fail are discarded and the next
//! source is consulted. The byte-CID is authoritative; structural hashes
//! are a search index only, so structural-only targets return candidate
//! records rather than bytes.

/// The peer-network block client.
pub mod peer;

use artifex_api::ContentNetwork;
use artifex_cache::ArtifactCache;
use artifex_cid::{sha256_hex, ByteCid};
use artifex_index::ManifestIndex;
use artifex_telemetry::resolver_metrics;
use artifex_types::config::ResolverConfig;
use artifex_types::error::{CidError, ResolveError};
use artifex_types::record::ArtifactRecord;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the caller is asking for.
#[derive(Debug, Clone, Default)]
pub struct ResolveTarget {
    /// Byte-CID, the authoritative identity.
    pub cid: Option<ByteCid>,
    /// Structural hash, consulted against the index only.
    pub structural: Option<String>,
}

/// Whether to actually fetch or only plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Fetch and verify.
    Full,
    /// Short-circuit network steps and return the plan.
    DryRun,
}

/// The tier that produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Cache,
    Local,
    Peer,
    Http,
}

impl ResolutionSource {
    fn label(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Local => "local",
            Self::Peer => "peer",
            Self::Http => "http",
        }
    }
}

/// A successful byte resolution. `verified` is always true by the time a
/// value of this type exists.
#[derive(Debug)]
pub struct Resolution {
    /// Cache path holding the verified bytes.
    pub path: PathBuf,
    /// The artifact record the bytes satisfy.
    pub record: Arc<ArtifactRecord>,
    /// Which tier produced the bytes.
    pub source: ResolutionSource,
    /// Always true; retained for the wire shape.
    pub verified: bool,
}

/// One step of a dry-run plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    /// The tier this step would consult.
    pub source: ResolutionSource,
    /// Human-readable detail (mirror URL, hint path, ...).
    pub detail: String,
}

/// The outcome of a resolve call.
#[derive(Debug)]
pub enum ResolveOutcome {
    /// Verified bytes are available at the given cache path.
    Resolved(Resolution),
    /// Structural-only target: the candidate records sharing the shape.
    /// Execution requires a verified byte-CID, which these do not carry.
    Candidates(Vec<Arc<ArtifactRecord>>),
    /// Dry-run: the sources that would be consulted, in order.
    Plan(Vec<PlanStep>),
}

/// The layered resolver.
pub struct Resolver {
    index: Arc<ManifestIndex>,
    cache: Arc<ArtifactCache>,
    network: Option<Arc<dyn ContentNetwork>>,
    config: ResolverConfig,
    http: reqwest::Client,
}

impl Resolver {
    /// Builds a resolver over the given index, cache, and optional peer
    /// network.
    pub fn new(
        index: Arc<ManifestIndex>,
        cache: Arc<ArtifactCache>,
        network: Option<Arc<dyn ContentNetwork>>,
        config: ResolverConfig,
    ) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .build()
            .map_err(|e| ResolveError::NetworkFatal(e.to_string()))?;
        Ok(Self {
            index,
            cache,
            network,
            config,
            http,
        })
    }

    /// Resolves a target to verified bytes, candidate records, or a plan.
    pub async fn resolve(
        &self,
        target: &ResolveTarget,
        mode: ResolveMode,
    ) -> Result<ResolveOutcome, ResolveError> {
        let started = Instant::now();
        let outcome = self.resolve_inner(target, mode).await;
        resolver_metrics().observe_resolve_duration(started.elapsed().as_secs_f64());
        outcome
    }

    async fn resolve_inner(
        &self,
        target: &ResolveTarget,
        mode: ResolveMode,
    ) -> Result<ResolveOutcome, ResolveError> {
        let snapshot = self.index.snapshot();

        let Some(cid) = &target.cid else {
            // Structural-only resolution consults the index path alone.
            let phash = target
                .structural
                .as_deref()
                .ok_or_else(|| ResolveError::NotFound("empty resolve target".into()))?;
            let candidates = snapshot.find_by_structural(phash);
            if candidates.is_empty() {
                return Err(ResolveError::NotFound(format!(
                    "no artifact matches structural hash {}",
                    phash
                )));
            }
            return Ok(ResolveOutcome::Candidates(candidates));
        };

        let indexed = snapshot.find_by_cid(cid.as_str());

        if mode == ResolveMode::DryRun {
            return Ok(ResolveOutcome::Plan(self.plan(cid, indexed.as_deref()).await));
        }

        // 1. Cache. Entries were verified at insertion.
        if let Some(path) = self.cache.get(cid).await {
            let record = match indexed.clone() {
                Some(record) => record,
                None => Arc::new(self.cache.record(cid).await.ok_or_else(|| {
                    ResolveError::Store(format!("cache entry for {} has no sidecar", cid))
                })?),
            };
            resolver_metrics().inc_resolution("cache", "hit");
            return Ok(ResolveOutcome::Resolved(Resolution {
                path,
                record,
                source: ResolutionSource::Cache,
                verified: true,
            }));
        }
        resolver_metrics().inc_resolution("cache", "miss");

        // Every non-cache tier needs the expected record for double
        // verification.
        let Some(record) = indexed else {
            return Err(ResolveError::NotFound(format!(
                "no manifest record for {}",
                cid
            )));
        };

        // 2. Local file from the index hint; verify and promote.
        if let Some(hint) = record.manifest_path.clone() {
            match self.try_local(cid, &record, &hint).await {
                Ok(path) => {
                    resolver_metrics().inc_resolution("local", "ok");
                    return Ok(ResolveOutcome::Resolved(Resolution {
                        path,
                        record,
                        source: ResolutionSource::Local,
                        verified: true,
                    }));
                }
                Err(e) => {
                    tracing::warn!(target: "resolver", cid = %cid, hint = %hint, error = %e, "local hint failed");
                }
            }
        }

        // 3. Peer network, when configured.
        if let Some(network) = &self.network {
            match self.try_peer(network.as_ref(), cid, &record).await {
                Ok(path) => {
                    resolver_metrics().inc_resolution("peer", "ok");
                    return Ok(ResolveOutcome::Resolved(Resolution {
                        path,
                        record,
                        source: ResolutionSource::Peer,
                        verified: true,
                    }));
                }
                Err(e) => {
                    tracing::warn!(target: "resolver", cid = %cid, peer = network.label(), error = %e, "peer fetch failed");
                }
            }
        }

        // 4. HTTP mirrors in declared priority order.
        let mut mirrors = self.config.mirrors.clone();
        mirrors.sort_by_key(|m| m.priority);
        for mirror in &mirrors {
            match self.try_mirror(cid, &record, &mirror.url).await {
                Ok(path) => {
                    resolver_metrics().inc_resolution("http", "ok");
                    return Ok(ResolveOutcome::Resolved(Resolution {
                        path,
                        record,
                        source: ResolutionSource::Http,
                        verified: true,
                    }));
                }
                Err(e) => {
                    tracing::warn!(target: "resolver", cid = %cid, mirror = %mirror.url, error = %e, "mirror failed");
                }
            }
        }

        Err(ResolveError::NotFound(format!(
            "no source produced verified bytes for {}",
            cid
        )))
    }

    /// Structural-hash search over the index snapshot.
    pub fn lookup_structural(&self, phash: &str) -> Vec<Arc<ArtifactRecord>> {
        self.index.snapshot().find_by_structural(phash)
    }

    async fn plan(&self, cid: &ByteCid, record: Option<&ArtifactRecord>) -> Vec<PlanStep> {
        let mut steps = Vec::new();
        let cached = self.cache.get(cid).await.is_some();
        steps.push(PlanStep {
            source: ResolutionSource::Cache,
            detail: if cached {
                "hit".to_string()
            } else {
                "miss".to_string()
            },
        });
        if let Some(hint) = record.and_then(|r| r.manifest_path.as_deref()) {
            steps.push(PlanStep {
                source: ResolutionSource::Local,
                detail: hint.to_string(),
            });
        }
        if let Some(network) = &self.network {
            steps.push(PlanStep {
                source: ResolutionSource::Peer,
                detail: network.label().to_string(),
            });
        }
        let mut mirrors = self.config.mirrors.clone();
        mirrors.sort_by_key(|m| m.priority);
        for mirror in mirrors {
            steps.push(PlanStep {
                source: ResolutionSource::Http,
                detail: mirror.url,
            });
        }
        steps
    }

    async fn try_local(
        &self,
        cid: &ByteCid,
        record: &ArtifactRecord,
        hint: &str,
    ) -> Result<PathBuf, ResolveError> {
        let bytes = tokio::fs::read(hint)
            .await
            .map_err(|e| ResolveError::Store(format!("{}: {}", hint, e)))?;
        self.verify_and_promote(cid, record, bytes, ResolutionSource::Local)
            .await
    }

    async fn try_peer(
        &self,
        network: &dyn ContentNetwork,
        cid: &ByteCid,
        record: &ArtifactRecord,
    ) -> Result<PathBuf, ResolveError> {
        let bytes = network.fetch_block(cid).await?;
        self.verify_and_promote(cid, record, bytes, ResolutionSource::Peer)
            .await
    }

    /// One mirror: up to `mirror_attempts` tries with bounded exponential
    /// backoff. Integrity failures are never retried on the same source.
    async fn try_mirror(
        &self,
        cid: &ByteCid,
        record: &ArtifactRecord,
        base_url: &str,
    ) -> Result<PathBuf, ResolveError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), cid);
        let mut last_err = ResolveError::NetworkTransient("no attempt made".into());

        for attempt in 0..self.config.mirror_attempts {
            if attempt > 0 {
                let backoff = self
                    .config
                    .backoff_base_ms
                    .saturating_mul(1 << (attempt - 1).min(16))
                    .min(self.config.backoff_cap_ms);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            match self.fetch_once(&url).await {
                Ok(bytes) => {
                    return self
                        .verify_and_promote(cid, record, bytes, ResolutionSource::Http)
                        .await;
                }
                Err(err @ ResolveError::NetworkTransient(_)) => {
                    last_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let response = self
            .http
            .get(url)
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
        if status.is_server_error() {
            return Err(ResolveError::NetworkTransient(format!(
                "{} from {}",
                status, url
            )));
        }
        Err(ResolveError::NetworkFatal(format!("{} from {}", status, url)))
    }

    /// Double verification: recomputed CID, recomputed SHA-256, and length
    /// against the expected record. Verified bytes are promoted into the
    /// cache so later calls hit the cache tier.
    async fn verify_and_promote(
        &self,
        cid: &ByteCid,
        record: &ArtifactRecord,
        bytes: Vec<u8>,
        source: ResolutionSource,
    ) -> Result<PathBuf, ResolveError> {
        if bytes.len() as u64 != record.size {
            resolver_metrics().inc_validation_failure(source.label());
            return Err(ResolveError::SizeMismatch {
                cid: cid.to_string(),
                expected: record.size,
                actual: bytes.len() as u64,
            });
        }
        if let Err(e) = cid.verify(&bytes) {
            resolver_metrics().inc_validation_failure(source.label());
            return Err(ResolveError::Identifier(e));
        }
        let sha = sha256_hex(&bytes);
        if sha != record.sha256 {
            resolver_metrics().inc_validation_failure(source.label());
            return Err(ResolveError::Identifier(CidError::IntegrityMismatch {
                expected: record.sha256.clone(),
                computed: sha,
            }));
        }
        self.cache.put(cid, bytes, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifex_builder::{build, describe_source, BuildOptions};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn built_add(dir: &std::path::Path) -> (ArtifactRecord, Vec<u8>) {
        let src = describe_source("export function add(a,b){return a+b}").unwrap();
        let out = build(
            &src,
            &BuildOptions {
                out_dir: Some(dir.to_path_buf()),
                ..Default::default()
            },
        )
        .unwrap();
        (out.record, out.bytes)
    }

    fn resolver_with(
        index: Arc<ManifestIndex>,
        cache: Arc<ArtifactCache>,
        network: Option<Arc<dyn ContentNetwork>>,
    ) -> Resolver {
        Resolver::new(index, cache, network, ResolverConfig::default()).unwrap()
    }

    struct CountingPeer {
        bytes: Vec<u8>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentNetwork for CountingPeer {
        async fn fetch_block(&self, _cid: &ByteCid) -> Result<Vec<u8>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }
        fn label(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn local_hint_resolves_then_cache_serves() {
        let dir = tempfile::tempdir().unwrap();
        let (record, _bytes) = built_add(&dir.path().join("out"));
        let cid = ByteCid::parse(&record.cid).unwrap();

        let index = Arc::new(ManifestIndex::new());
        index.insert(record).unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let resolver = resolver_with(index, cache, None);

        let target = ResolveTarget {
            cid: Some(cid.clone()),
            structural: None,
        };
        let ResolveOutcome::Resolved(first) =
            resolver.resolve(&target, ResolveMode::Full).await.unwrap()
        else {
            panic!("expected resolution");
        };
        assert_eq!(first.source, ResolutionSource::Local);
        assert!(first.verified);

        let ResolveOutcome::Resolved(second) =
            resolver.resolve(&target, ResolveMode::Full).await.unwrap()
        else {
            panic!("expected resolution");
        };
        assert_eq!(second.source, ResolutionSource::Cache);
    }

    #[tokio::test]
    async fn corrupted_local_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let (record, _bytes) = built_add(&out_dir);
        let cid = ByteCid::parse(&record.cid).unwrap();

        // Corrupt the hinted file after the manifest recorded its digest.
        let hint = record.manifest_path.clone().unwrap();
        std::fs::write(&hint, b"corrupted").unwrap();

        let index = Arc::new(ManifestIndex::new());
        index.insert(record).unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let resolver = resolver_with(index, cache, None);

        let err = resolver
            .resolve(
                &ResolveTarget {
                    cid: Some(cid),
                    structural: None,
                },
                ResolveMode::Full,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn peer_bytes_are_double_verified() {
        let dir = tempfile::tempdir().unwrap();
        let (mut record, bytes) = built_add(&dir.path().join("out"));
        record.manifest_path = None; // force the peer tier
        let cid = ByteCid::parse(&record.cid).unwrap();

        let index = Arc::new(ManifestIndex::new());
        index.insert(record).unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let peer = Arc::new(CountingPeer {
            bytes: bytes.clone(),
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver_with(index, cache, Some(peer.clone()));

        let ResolveOutcome::Resolved(res) = resolver
            .resolve(
                &ResolveTarget {
                    cid: Some(cid),
                    structural: None,
                },
                ResolveMode::Full,
            )
            .await
            .unwrap()
        else {
            panic!("expected resolution");
        };
        assert_eq!(res.source, ResolutionSource::Peer);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lying_peer_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut record, _bytes) = built_add(&dir.path().join("out"));
        record.manifest_path = None;
        let cid = ByteCid::parse(&record.cid).unwrap();

        let index = Arc::new(ManifestIndex::new());
        index.insert(record).unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let peer = Arc::new(CountingPeer {
            bytes: b"wrong bytes entirely".to_vec(),
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver_with(index, cache.clone(), Some(peer));

        let err = resolver
            .resolve(
                &ResolveTarget {
                    cid: Some(cid.clone()),
                    structural: None,
                },
                ResolveMode::Full,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
        assert!(cache.get(&cid).await.is_none(), "bad bytes must not be cached");
    }

    #[tokio::test]
    async fn structural_only_returns_candidates_not_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (record, _bytes) = built_add(&dir.path().join("out"));
        let phash = record.ast_hash.clone().unwrap();

        let index = Arc::new(ManifestIndex::new());
        index.insert(record).unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let resolver = resolver_with(index, cache, None);

        let outcome = resolver
            .resolve(
                &ResolveTarget {
                    cid: None,
                    structural: Some(phash),
                },
                ResolveMode::Full,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Candidates(ref c) if c.len() == 1));

        let err = resolver
            .resolve(
                &ResolveTarget {
                    cid: None,
                    structural: Some("phash:v1:sha256:unknown".into()),
                },
                ResolveMode::Full,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn dry_run_returns_the_plan_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let (mut record, bytes) = built_add(&dir.path().join("out"));
        record.manifest_path = None;
        let cid = ByteCid::parse(&record.cid).unwrap();

        let index = Arc::new(ManifestIndex::new());
        index.insert(record).unwrap();
        let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));
        let peer = Arc::new(CountingPeer {
            bytes,
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver_with(index, cache, Some(peer.clone()));

        let ResolveOutcome::Plan(steps) = resolver
            .resolve(
                &ResolveTarget {
                    cid: Some(cid),
                    structural: None,
                },
                ResolveMode::DryRun,
            )
            .await
            .unwrap()
        else {
            panic!("expected a plan");
        };
        assert!(steps.iter().any(|s| s.source == ResolutionSource::Cache));
        assert!(steps.iter().any(|s| s.source == ResolutionSource::Peer));
        assert_eq!(peer.calls.load(Ordering::SeqCst), 0, "dry-run must not fetch");
    }
}
