// Path: crates/cache/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Content-addressed on-disk artifact cache.
//!
//! Each entry lives at a path derived from its byte-CID, next to a small
//! JSON sidecar carrying the original record. Writes go through a
//! temporary file in the same directory and an atomic rename, so a
//! concurrent reader sees either no file or a fully-written, verified
//! one. Entries are never mutated in place and never evicted.

use artifex_cid::ByteCid;
use artifex_types::error::ResolveError;
use artifex_types::record::ArtifactRecord;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The content-addressed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Opens (without creating) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The entry path an artifact would occupy.
    pub fn entry_path(&self, cid: &ByteCid) -> PathBuf {
        self.root.join(format!("{}.wasm", cid))
    }

    fn sidecar_path(&self, cid: &ByteCid) -> PathBuf {
        self.root.join(format!("{}.json", cid))
    }

    /// Returns the entry path when the artifact is present.
    ///
    /// A present entry was byte-verified at insertion and is considered
    /// pre-verified here.
    pub async fn get(&self, cid: &ByteCid) -> Option<PathBuf> {
        let path = self.entry_path(cid);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    /// Reads the sidecar record for a present entry.
    pub async fn record(&self, cid: &ByteCid) -> Option<ArtifactRecord> {
        let bytes = tokio::fs::read(self.sidecar_path(cid)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Inserts an artifact, re-verifying the CID before the atomic rename.
    ///
    /// Re-inserting an existing entry is a no-op beyond the rename; the
    /// content is identical by construction.
    pub async fn put(
        &self,
        cid: &ByteCid,
        bytes: Vec<u8>,
        record: &ArtifactRecord,
    ) -> Result<PathBuf, ResolveError> {
        cid.verify(&bytes)?;

        let root = self.root.clone();
        let entry = self.entry_path(cid);
        let sidecar = self.sidecar_path(cid);
        let record = record.clone();
        let cid_text = cid.to_string();

        let entry_out = entry.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ResolveError> {
            std::fs::create_dir_all(&root).map_err(|e| ResolveError::Store(e.to_string()))?;
            write_atomic(&root, &entry, &bytes)?;
            let sidecar_bytes = serde_json::to_vec_pretty(&record)
                .map_err(|e| ResolveError::Store(e.to_string()))?;
            write_atomic(&root, &sidecar, &sidecar_bytes)?;
            Ok(())
        })
        .await
        .map_err(|e| ResolveError::Store(format!("cache task failed: {}", e)))??;

        tracing::debug!(target: "cache", cid = %cid_text, "artifact cached");
        Ok(entry_out)
    }

    /// Reads entry bytes from a path previously handed out by this cache.
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, ResolveError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ResolveError::Store(format!("{}: {}", path.display(), e)))
    }
}

/// Writes `bytes` to `dest` via a temporary file in the same directory and
/// an atomic rename.
fn write_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<(), ResolveError> {
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| ResolveError::Store(e.to_string()))?;
    tmp.write_all(bytes)
        .map_err(|e| ResolveError::Store(e.to_string()))?;
    tmp.flush().map_err(|e| ResolveError::Store(e.to_string()))?;
    tmp.persist(dest)
        .map_err(|e| ResolveError::Store(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_for(cid: &ByteCid, bytes: &[u8]) -> ArtifactRecord {
        ArtifactRecord {
            name: "add".into(),
            lang: "axs".into(),
            cid: cid.to_string(),
            sha256: artifex_cid::sha256_hex(bytes),
            size: bytes.len() as u64,
            phi: None,
            ast_hash: None,
            labels: vec![],
            manifest_path: None,
            entry: "add".into(),
            params: None,
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let bytes = b"\0asm fake module".to_vec();
        let cid = ByteCid::from_bytes(&bytes);

        assert!(cache.get(&cid).await.is_none());
        let path = cache
            .put(&cid, bytes.clone(), &record_for(&cid, &bytes))
            .await
            .unwrap();
        assert_eq!(cache.get(&cid).await, Some(path.clone()));
        assert_eq!(cache.read(&path).await.unwrap(), bytes);
        assert_eq!(cache.record(&cid).await.unwrap().cid, cid.to_string());
    }

    #[tokio::test]
    async fn put_rejects_mismatched_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let bytes = b"payload".to_vec();
        let cid = ByteCid::from_bytes(b"different payload");

        let err = cache
            .put(&cid, bytes.clone(), &record_for(&cid, &bytes))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Identifier(_)));
        assert!(cache.get(&cid).await.is_none(), "nothing may be written");
    }

    #[tokio::test]
    async fn no_partial_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let bytes = b"module bytes".to_vec();
        let cid = ByteCid::from_bytes(&bytes);
        cache
            .put(&cid, bytes.clone(), &record_for(&cid, &bytes))
            .await
            .unwrap();

        // Only the entry and its sidecar exist; no temp files survive.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
        assert!(names.iter().all(|n| n.starts_with(&cid.to_string())));
    }

    #[tokio::test]
    async fn reinsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let bytes = b"stable".to_vec();
        let cid = ByteCid::from_bytes(&bytes);
        let record = record_for(&cid, &bytes);

        let a = cache.put(&cid, bytes.clone(), &record).await.unwrap();
        let b = cache.put(&cid, bytes.clone(), &record).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.read(&a).await.unwrap(), bytes);
    }
}
