// Path: crates/builder/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Deterministic source-to-WASM artifact builder.
//!
//! A build normalizes the source for determinism, compiles it to a WASM
//! module through a fixed toolchain configuration, captures its length and
//! SHA-256, derives the byte-CID, optionally runs the structural pass, and
//! appends the resulting record to a per-build manifest. Two independent
//! builds of the same source yield byte-identical output.
//!
//! Impure sources are accepted: constructs without a pure lowering
//! (unrecognized calls, `await`) compile to a deterministic trap stub and
//! the record is labeled impure, leaving execution to the policy engine's
//! `allow_impure` grant.

/// Typed WAT emission.
pub mod codegen;

use artifex_cid::{sha256_hex, ByteCid};
use artifex_lang::{normalize_source, parse_function, ParseError, LANG_TAG};
use artifex_phash::{PhashError, ProteinHasher};
use artifex_types::record::{ArtifactRecord, SourceFunction, StructuralHash, IMPURE_LABEL};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the artifact builder.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The source did not lex or parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The source is typed inconsistently.
    #[error("type error: {0}")]
    Type(String),
    /// The emitted text failed to assemble; a builder bug.
    #[error("assembly failed: {0}")]
    Assemble(String),
    /// The structural pass failed.
    #[error(transparent)]
    Structural(#[from] PhashError),
    /// Filesystem trouble while writing artifacts or manifests.
    #[error("io error on {path}: {reason}")]
    Io {
        /// The path being written or read.
        path: String,
        /// The underlying failure.
        reason: String,
    },
}

/// Options for one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Run the structural pass and attach the spectral sidecar.
    pub compute_structural: bool,
    /// Extra labels for the record.
    pub labels: Vec<String>,
    /// Where to write the `.wasm` file; skipped when absent.
    pub out_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            compute_structural: true,
            labels: Vec::new(),
            out_dir: None,
        }
    }
}

/// The product of one build.
#[derive(Debug)]
pub struct BuildOutput {
    /// The manifest record for this artifact.
    pub record: ArtifactRecord,
    /// The module bytes.
    pub bytes: Vec<u8>,
    /// The structural hash, when the pass ran.
    pub structural: Option<StructuralHash>,
}

/// Describes a source text as a [`SourceFunction`].
pub fn describe_source(text: &str) -> Result<SourceFunction, BuildError> {
    let func = parse_function(text)?;
    let ret = codegen::return_type(&func)?;
    Ok(SourceFunction {
        name: func.name.clone(),
        lang: LANG_TAG.to_string(),
        body: text.to_string(),
        params: func
            .params
            .iter()
            .map(|p| (p.name.clone(), p.effective_type()))
            .collect(),
        ret,
    })
}

/// Builds one source function into a WASM artifact.
pub fn build(source: &SourceFunction, options: &BuildOptions) -> Result<BuildOutput, BuildError> {
    // Normalization strips comments and canonicalizes whitespace so that
    // trivially-reformatted sources compile to identical bytes.
    let normalized = normalize_source(&source.body)?;
    let func = parse_function(&normalized)?;
    let wat_text = codegen::emit_module(&func)?;
    let bytes = wat::parse_str(&wat_text).map_err(|e| BuildError::Assemble(e.to_string()))?;

    let cid = ByteCid::from_bytes(&bytes);
    let sha256 = sha256_hex(&bytes);
    let size = bytes.len() as u64;

    let structural = if options.compute_structural {
        Some(ProteinHasher::default().hash(&normalized, LANG_TAG)?)
    } else {
        None
    };

    let mut labels = options.labels.clone();
    if let Some(s) = &structural {
        if s.purity < 1.0 && !labels.iter().any(|l| l == IMPURE_LABEL) {
            labels.push(IMPURE_LABEL.to_string());
        }
    }

    let manifest_path = match &options.out_dir {
        Some(dir) => {
            let path = dir.join(format!("{}.wasm", func.name));
            std::fs::create_dir_all(dir).map_err(|e| BuildError::Io {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            std::fs::write(&path, &bytes).map_err(|e| BuildError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Some(path.display().to_string())
        }
        None => None,
    };

    let record = ArtifactRecord {
        name: func.name.clone(),
        lang: LANG_TAG.to_string(),
        cid: cid.to_string(),
        sha256,
        size,
        phi: structural.as_ref().map(|s| s.phi.clone()),
        ast_hash: structural.as_ref().map(|s| s.text.clone()),
        labels,
        manifest_path,
        entry: func.name.clone(),
        params: Some(func.params.iter().map(|p| p.name.clone()).collect()),
    };

    tracing::debug!(
        target: "builder",
        name = %record.name,
        cid = %record.cid,
        size = record.size,
        "artifact built"
    );

    Ok(BuildOutput {
        record,
        bytes,
        structural,
    })
}

/// Appends `record` to the manifest at `path`, creating it when absent.
///
/// The manifest is a JSON array of records; existing entries are kept.
pub fn append_manifest(path: &Path, record: &ArtifactRecord) -> Result<(), BuildError> {
    let io_err = |e: std::io::Error| BuildError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut records: Vec<ArtifactRecord> = match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| BuildError::Io {
            path: path.display().to_string(),
            reason: format!("existing manifest is invalid: {}", e),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(io_err(e)),
    };
    records.push(record.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let rendered = serde_json::to_vec_pretty(&records).map_err(|e| BuildError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, rendered).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> SourceFunction {
        describe_source(text).unwrap()
    }

    #[test]
    fn builds_are_deterministic() {
        let src = source("export function add(a,b){return a+b}");
        let a = build(&src, &BuildOptions::default()).unwrap();
        let b = build(&src, &BuildOptions::default()).unwrap();
        assert_eq!(a.bytes, b.bytes, "independent builds must be byte-identical");
        assert_eq!(a.record.cid, b.record.cid);
        assert_eq!(a.record.sha256, b.record.sha256);
    }

    #[test]
    fn reformatting_does_not_change_the_bytes() {
        let a = build(
            &source("export function add(a,b){return a+b}"),
            &BuildOptions::default(),
        )
        .unwrap();
        let b = build(
            &source("export function add( a, b )  {\n  // sum\n  return a + b\n}"),
            &BuildOptions::default(),
        )
        .unwrap();
        assert_eq!(a.record.cid, b.record.cid);
    }

    #[test]
    fn record_invariants_hold() {
        let out = build(
            &source("export function add(a,b){return a+b}"),
            &BuildOptions::default(),
        )
        .unwrap();
        let cid = ByteCid::parse(&out.record.cid).unwrap();
        assert!(cid.verify(&out.bytes).is_ok());
        assert_eq!(out.record.sha256, sha256_hex(&out.bytes));
        assert_eq!(out.record.size, out.bytes.len() as u64);
        assert_eq!(out.record.entry, "add");
        assert_eq!(out.record.params.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert!(out.record.ast_hash.is_some());
    }

    #[test]
    fn impure_sources_get_the_impure_label() {
        let src = source("function acc(a){let x = a\nx = x + 1\nreturn x}");
        let out = build(&src, &BuildOptions::default()).unwrap();
        assert!(out.record.is_impure());
        assert!(out.structural.unwrap().purity < 1.0);
    }

    #[test]
    fn call_and_await_impurity_still_builds() {
        // Unrecognized calls are accepted and lowered to a trap stub; the
        // artifact carries the impure label and the 0.9 call decay.
        let out = build(
            &source("function relay(a){return fetch(a)}"),
            &BuildOptions::default(),
        )
        .unwrap();
        assert!(out.record.is_impure());
        let purity = out.structural.as_ref().unwrap().purity;
        assert!((purity - 0.9).abs() < 1e-12);
        let cid = ByteCid::parse(&out.record.cid).unwrap();
        assert!(cid.verify(&out.bytes).is_ok());

        // Suspension points likewise build, with the 0.5 decay.
        let out = build(
            &source("function settle(a){return await a}"),
            &BuildOptions::default(),
        )
        .unwrap();
        assert!(out.record.is_impure());
        assert!((out.structural.unwrap().purity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn manifest_appends_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("build.manifest.json");
        let a = build(
            &source("export function add(a,b){return a+b}"),
            &BuildOptions::default(),
        )
        .unwrap();
        let b = build(
            &source("export function mul(a,b){return a*b}"),
            &BuildOptions::default(),
        )
        .unwrap();
        append_manifest(&manifest, &a.record).unwrap();
        append_manifest(&manifest, &b.record).unwrap();

        let loaded: Vec<ArtifactRecord> =
            serde_json::from_slice(&std::fs::read(&manifest).unwrap()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].name, "mul");
    }

    #[test]
    fn out_dir_writes_the_module_and_records_the_hint() {
        let dir = tempfile::tempdir().unwrap();
        let out = build(
            &source("export function add(a,b){return a+b}"),
            &BuildOptions {
                out_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        )
        .unwrap();
        let hint = out.record.manifest_path.unwrap();
        assert_eq!(std::fs::read(hint).unwrap(), out.bytes);
    }
}
