// Path: crates/index/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Manifest loader and dual artifact indices.
//!
//! The index aggregates build manifests into two consistent projections of
//! the same record set: byte-CID to record, and structural hash to the set
//! of records sharing that logical shape. Readers take an immutable
//! snapshot per request; updates are copy-on-write and atomic with respect
//! to readers.

use arc_swap::ArcSwap;
use artifex_api::NamingService;
use artifex_cid::ByteCid;
use artifex_types::error::ManifestError;
use artifex_types::record::ArtifactRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// An immutable view of the record set at one point in time.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    by_cid: HashMap<String, Arc<ArtifactRecord>>,
    by_structural: HashMap<String, Vec<Arc<ArtifactRecord>>>,
    by_name: HashMap<String, Arc<ArtifactRecord>>,
}

impl IndexSnapshot {
    /// Looks up the record for a byte-CID.
    pub fn find_by_cid(&self, cid: &str) -> Option<Arc<ArtifactRecord>> {
        self.by_cid.get(cid).cloned()
    }

    /// Returns every record sharing a structural hash. Byte-distinct
    /// artifacts with the same logical shape are expected.
    pub fn find_by_structural(&self, phash: &str) -> Vec<Arc<ArtifactRecord>> {
        self.by_structural.get(phash).cloned().unwrap_or_default()
    }

    /// Looks up a record by logical name; the naming-service backend.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ArtifactRecord>> {
        self.by_name.get(name).cloned()
    }

    /// Number of known records.
    pub fn len(&self) -> usize {
        self.by_cid.len()
    }

    /// True when no records are known.
    pub fn is_empty(&self) -> bool {
        self.by_cid.is_empty()
    }

    /// Merges one record, enforcing the conflict policy: a CID claimed
    /// twice must agree on size, sha256, and entry.
    fn merge(&mut self, record: ArtifactRecord) -> Result<(), ManifestError> {
        if let Some(existing) = self.by_cid.get(&record.cid) {
            let field = if existing.size != record.size {
                Some("size")
            } else if existing.sha256 != record.sha256 {
                Some("sha256")
            } else if existing.entry != record.entry {
                Some("entry")
            } else {
                None
            };
            if let Some(field) = field {
                return Err(ManifestError::Conflict {
                    cid: record.cid,
                    field,
                });
            }
            // Agreeing duplicate; the first record wins.
            return Ok(());
        }
        let record = Arc::new(record);
        if let Some(phash) = &record.ast_hash {
            self.by_structural
                .entry(phash.clone())
                .or_default()
                .push(record.clone());
        }
        self.by_name.insert(record.name.clone(), record.clone());
        self.by_cid.insert(record.cid.clone(), record);
        Ok(())
    }
}

/// The read-mostly manifest index.
pub struct ManifestIndex {
    current: ArcSwap<IndexSnapshot>,
    // Serializes writers; readers never take this lock.
    write_lock: Mutex<()>,
}

impl Default for ManifestIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(IndexSnapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// The current snapshot; taken once per request and used consistently
    /// throughout it.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }

    /// Loads every `*.json` manifest under the given directories.
    ///
    /// The load is all-or-nothing: a parse failure or conflict in any file
    /// leaves the index unchanged.
    pub fn load_dirs<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<usize, ManifestError> {
        let mut files = Vec::new();
        for dir in dirs {
            let dir = dir.as_ref();
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ManifestError::Parse {
                        path: dir.display().to_string(),
                        reason: e.to_string(),
                    })
                }
            };
            for entry in entries {
                let entry = entry.map_err(|e| ManifestError::Parse {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                })?;
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    files.push(path);
                }
            }
        }
        files.sort();
        self.load_files(&files)
    }

    /// Loads the given manifest files, atomically with respect to readers.
    pub fn load_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize, ManifestError> {
        let _guard = self.write_lock.lock().map_err(|_| ManifestError::Parse {
            path: "<index>".into(),
            reason: "writer lock poisoned".into(),
        })?;

        let mut next = self.clone_snapshot();
        let mut loaded = 0usize;
        for path in paths {
            let path = path.as_ref();
            let records = read_manifest(path)?;
            for record in records {
                next.merge(record)?;
                loaded += 1;
            }
        }
        self.current.store(Arc::new(next));
        tracing::info!(target: "index", files = paths.len(), records = loaded, "manifests loaded");
        Ok(loaded)
    }

    /// Inserts one record produced by a local build.
    pub fn insert(&self, record: ArtifactRecord) -> Result<(), ManifestError> {
        let _guard = self.write_lock.lock().map_err(|_| ManifestError::Parse {
            path: "<index>".into(),
            reason: "writer lock poisoned".into(),
        })?;
        let mut next = self.clone_snapshot();
        next.merge(record)?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    fn clone_snapshot(&self) -> IndexSnapshot {
        let cur = self.current.load();
        IndexSnapshot {
            by_cid: cur.by_cid.clone(),
            by_structural: cur.by_structural.clone(),
            by_name: cur.by_name.clone(),
        }
    }
}

/// Parses one manifest file: a JSON array of artifact records.
fn read_manifest(path: &Path) -> Result<Vec<ArtifactRecord>, ManifestError> {
    let bytes = std::fs::read(path).map_err(|e| ManifestError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ManifestError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Naming service backed by the index's logical-name projection.
pub struct IndexNaming {
    index: Arc<ManifestIndex>,
}

impl IndexNaming {
    pub fn new(index: Arc<ManifestIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl NamingService for IndexNaming {
    async fn resolve_name(&self, logical: &str) -> Option<ByteCid> {
        let record = self.index.snapshot().find_by_name(logical)?;
        ByteCid::parse(&record.cid).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, cid: &str, sha: &str, phash: Option<&str>) -> ArtifactRecord {
        ArtifactRecord {
            name: name.into(),
            lang: "axs".into(),
            cid: cid.into(),
            sha256: sha.into(),
            size: 8,
            phi: None,
            ast_hash: phash.map(Into::into),
            labels: vec![],
            manifest_path: None,
            entry: name.into(),
            params: None,
        }
    }

    #[test]
    fn dual_projections_stay_consistent() {
        let index = ManifestIndex::new();
        index
            .insert(record("add", "cid-a", "aa", Some("phash:v1:sha256:1")))
            .unwrap();
        index
            .insert(record("add2", "cid-b", "bb", Some("phash:v1:sha256:1")))
            .unwrap();

        let snap = index.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.find_by_cid("cid-a").unwrap().name, "add");
        let matches = snap.find_by_structural("phash:v1:sha256:1");
        assert_eq!(matches.len(), 2, "structural lookups return all matches");
        assert!(snap.find_by_name("add2").is_some());
    }

    #[test]
    fn conflicting_records_fail_the_load() {
        let index = ManifestIndex::new();
        index.insert(record("add", "cid-a", "aa", None)).unwrap();
        let err = index
            .insert(record("add", "cid-a", "ff", None))
            .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Conflict {
                field: "sha256",
                ..
            }
        ));
        // Agreeing duplicates are fine.
        index.insert(record("add", "cid-a", "aa", None)).unwrap();
        assert_eq!(index.snapshot().len(), 1);
    }

    #[test]
    fn snapshots_are_immutable_views() {
        let index = ManifestIndex::new();
        let before = index.snapshot();
        index.insert(record("add", "cid-a", "aa", None)).unwrap();
        assert!(before.is_empty(), "earlier snapshot must not see the insert");
        assert_eq!(index.snapshot().len(), 1);
    }

    #[test]
    fn loads_manifest_files_from_directories() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record("add", "cid-a", "aa", None),
            record("mul", "cid-b", "bb", None),
        ];
        std::fs::write(
            dir.path().join("build-1.json"),
            serde_json::to_vec(&records).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let index = ManifestIndex::new();
        let loaded = index.load_dirs(&[dir.path()]).unwrap();
        assert_eq!(loaded, 2);
        assert!(index.snapshot().find_by_name("mul").is_some());
    }

    #[test]
    fn bad_manifest_leaves_the_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{ not json ]").unwrap();
        let index = ManifestIndex::new();
        index.insert(record("add", "cid-a", "aa", None)).unwrap();

        let err = index.load_dirs(&[dir.path()]).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
        assert_eq!(index.snapshot().len(), 1);
    }
}
