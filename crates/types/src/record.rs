// Path: crates/types/src/record.rs
//! Artifact records, manifests, and source function descriptions.

use serde::{Deserialize, Serialize};

/// Label attached to artifacts whose source is not semantically pure.
///
/// Impure artifacts are barred from execution unless a policy rule
/// explicitly allows them.
pub const IMPURE_LABEL: &str = "impure";

/// The scalar types a source function may declare for parameters and return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 64-bit IEEE-754 float.
    F64,
    /// Boolean, represented as i32 on the wire.
    Bool,
}

/// A scalar value crossing the request or result boundary.
///
/// JSON has no i32/i64 distinction, so integers are carried as `Int` and
/// coerced against the declared parameter type at marshalling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A boolean.
    Bool(bool),
    /// Any integer literal.
    Int(i64),
    /// Any floating-point literal.
    Float(f64),
}

impl ScalarValue {
    /// The declared type this value naturally maps to, before coercion.
    pub fn natural_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Bool,
            Self::Int(_) => ScalarType::I64,
            Self::Float(_) => ScalarType::F64,
        }
    }
}

/// A source function submitted to the artifact builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFunction {
    /// Declared function name; becomes the entry export.
    pub name: String,
    /// Source language tag (currently only `axs`).
    pub lang: String,
    /// The full textual body, including the signature.
    pub body: String,
    /// Declared parameters in positional order.
    pub params: Vec<(String, ScalarType)>,
    /// Declared return type.
    pub ret: ScalarType,
}

/// The spectral sidecar stored next to a structural hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralSidecar {
    /// The operator the spectrum was taken from (always `laplacian`).
    pub op: String,
    /// How many eigenvalues were extracted.
    pub k: u32,
    /// The quantization grid (values are rounded to 1/quant).
    pub quant: u32,
    /// Top-k eigenvalues, descending, quantized.
    pub values: Vec<f64>,
}

/// The full output of the structural hasher for one source function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralHash {
    /// Canonical text form, `phash:v1:sha256:<hex>`.
    pub text: String,
    /// Spectral sidecar.
    pub phi: SpectralSidecar,
    /// Logical-graph node count.
    pub node_count: u64,
    /// Logical-graph edge count.
    pub edge_count: u64,
    /// McCabe-style complexity scalar in [0, 1].
    pub complexity: f64,
    /// Purity scalar in [0, 1]; 1.0 means semantically pure.
    pub purity: f64,
}

/// One row in a build manifest.
///
/// Serialized field names follow the manifest file format; unknown fields in
/// manifests are ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Logical artifact name.
    pub name: String,
    /// Source language tag.
    pub lang: String,
    /// Byte-CID of the compiled module, canonical text form.
    pub cid: String,
    /// SHA-256 of the module bytes, hex.
    pub sha256: String,
    /// Module byte length.
    pub size: u64,
    /// Spectral sidecar, when the structural pass ran at build time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phi: Option<SpectralSidecar>,
    /// Structural hash text form, when the structural pass ran.
    #[serde(default, rename = "astHash", skip_serializing_if = "Option::is_none")]
    pub ast_hash: Option<String>,
    /// Free-form labels; `impure` bars execution without a policy grant.
    pub labels: Vec<String>,
    /// Local filesystem path hint for the module bytes.
    #[serde(default, rename = "manifestPath", skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,
    /// Entry export name.
    pub entry: String,
    /// Declared parameter names in positional order; the schema record
    /// consulted when a request supplies named inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
}

impl ArtifactRecord {
    /// Whether this artifact was marked impure at build time.
    pub fn is_impure(&self) -> bool {
        self.labels.iter().any(|l| l == IMPURE_LABEL)
    }
}
