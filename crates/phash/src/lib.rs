// Path: crates/phash/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Structural spectral hashing.
//!
//! A source function is reduced to a logical graph (identifiers discarded,
//! literals typed but valueless), the top eigenvalues of the graph
//! Laplacian are extracted and quantized, and the fingerprint is the
//! SHA-256 of the quantized spectrum together with the canonical operation
//! tags. The result is stable under renaming and reformatting and
//! sensitive to operator and control-flow changes.

/// Logical-graph reduction.
pub mod graph;
/// Laplacian spectrum extraction.
pub mod spectral;

use artifex_lang::{parse_function, ParseError, LANG_TAG};
use artifex_types::record::{SpectralSidecar, StructuralHash};
use graph::LogicalGraph;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use spectral::cosine_similarity;

/// Canonical prefix of the structural hash text form.
pub const PHASH_PREFIX: &str = "phash:v1:sha256:";

/// Errors from the structural hasher.
#[derive(Error, Debug)]
pub enum PhashError {
    /// The source did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The language tag is not supported by any available parser.
    #[error("unsupported source language {0:?}")]
    UnsupportedLanguage(String),
}

/// The structural hasher, parameterized by spectrum size and grid.
#[derive(Debug, Clone, Copy)]
pub struct ProteinHasher {
    /// How many eigenvalues to extract.
    pub k: u32,
    /// Quantization grid levels.
    pub quant: u32,
}

impl Default for ProteinHasher {
    fn default() -> Self {
        Self { k: 5, quant: 1000 }
    }
}

impl ProteinHasher {
    /// Hashes `source` written in `lang`.
    ///
    /// The language is supplied explicitly; only `axs` has a parser today.
    pub fn hash(&self, source: &str, lang: &str) -> Result<StructuralHash, PhashError> {
        if lang != LANG_TAG {
            return Err(PhashError::UnsupportedLanguage(lang.to_string()));
        }
        let func = parse_function(source)?;
        Ok(self.hash_function_graph(&LogicalGraph::reduce(&func)))
    }

    /// Hashes an already-reduced logical graph.
    pub fn hash_function_graph(&self, graph: &LogicalGraph) -> StructuralHash {
        let lap = spectral::laplacian(graph.nodes.len(), &graph.edges);
        let raw = spectral::top_eigenvalues(lap, self.k as usize);
        let values = spectral::quantize(&raw, self.quant);

        let decimals = decimal_places(self.quant);
        let csv: Vec<String> = values
            .iter()
            .map(|v| format!("{:.*}", decimals, v))
            .collect();
        let preimage = format!("{}|{}", csv.join(","), graph.structure_tags());
        let digest = Sha256::digest(preimage.as_bytes());
        let text = format!("{}{}", PHASH_PREFIX, hex::encode(digest));

        StructuralHash {
            text,
            phi: SpectralSidecar {
                op: "laplacian".to_string(),
                k: self.k,
                quant: self.quant,
                values,
            },
            node_count: graph.nodes.len() as u64,
            edge_count: graph.edges.len() as u64,
            complexity: graph.complexity(),
            purity: graph.purity(),
        }
    }
}

fn decimal_places(quant: u32) -> usize {
    // 1000 levels -> 3 decimals; never fewer than 1.
    let mut places = 0usize;
    let mut q = quant.max(2) - 1;
    while q > 0 {
        places += 1;
        q /= 10;
    }
    places.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phash(src: &str) -> StructuralHash {
        ProteinHasher::default().hash(src, "axs").unwrap()
    }

    #[test]
    fn stable_under_identifier_renaming() {
        let a = phash("export function add(a,b){return a+b}");
        let b = phash("export function total(first,second){return first+second}");
        assert_eq!(a.text, b.text);
        assert_eq!(a.phi.values, b.phi.values);
    }

    #[test]
    fn stable_under_reformatting_and_comments() {
        let a = phash("export function add(a,b){return a+b}");
        let b = phash("export function add( a , b )\n{\n  /* sum */ return a + b; // done\n}");
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn stable_under_literal_value_changes() {
        let a = phash("function f(x){return x+2}");
        let b = phash("function f(x){return x+9}");
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn sensitive_to_operator_substitution() {
        let a = phash("export function f(a,b){return a+b}");
        let b = phash("export function f(a,b){return a*b}");
        assert_ne!(a.text, b.text);
    }

    #[test]
    fn sensitive_to_control_flow_predicate_flips() {
        let a = phash("function f(a){if a < 0 { return 0 } return 1}");
        let b = phash("function f(a){if a >= 0 { return 0 } return 1}");
        assert_ne!(a.text, b.text);
    }

    #[test]
    fn degenerate_sources_hash_without_panicking() {
        let empty = phash("function f(){}");
        assert_eq!(empty.node_count, 1);
        assert!(empty.text.starts_with(PHASH_PREFIX));
        assert_eq!(empty.purity, 1.0);
    }

    #[test]
    fn sidecar_carries_the_configured_grid() {
        let h = phash("export function add(a,b){return a+b}");
        assert_eq!(h.phi.op, "laplacian");
        assert_eq!(h.phi.k, 5);
        assert_eq!(h.phi.quant, 1000);
        assert!(h.phi.values.len() <= 5);
    }

    #[test]
    fn unsupported_language_is_rejected() {
        let err = ProteinHasher::default().hash("x", "ts").unwrap_err();
        assert!(matches!(err, PhashError::UnsupportedLanguage(_)));
    }

    #[test]
    fn similarity_of_identical_shapes_is_one() {
        let a = phash("export function add(a,b){return a+b}");
        let b = phash("function sum(x,y){return x+y}");
        let sim = cosine_similarity(&a.phi.values, &b.phi.values);
        assert!((sim - 1.0).abs() < 1e-9);
    }
}
