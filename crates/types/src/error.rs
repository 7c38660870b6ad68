// Path: crates/types/src/error.rs
//! Core error types for the artifex pipeline.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// The codes are the error classes surfaced to callers and to metrics; they
/// never change once published.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors produced by the byte-CID codec.
#[derive(Error, Debug)]
pub enum CidError {
    /// The identifier text could not be parsed, or uses an unsupported
    /// codec or multihash algorithm.
    #[error("malformed identifier: {0}")]
    Malformed(String),
    /// The digest recomputed from the bytes does not match the identifier.
    #[error("integrity mismatch: expected {expected}, computed {computed}")]
    IntegrityMismatch {
        /// The digest the identifier claims, hex-encoded.
        expected: String,
        /// The digest computed from the actual bytes, hex-encoded.
        computed: String,
    },
}

impl ErrorCode for CidError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_IDENTIFIER",
            Self::IntegrityMismatch { .. } => "INTEGRITY_MISMATCH",
        }
    }
}

/// Errors raised while loading or merging artifact manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// A manifest file could not be read or did not match the schema.
    #[error("manifest parse error in {path}: {reason}")]
    Parse {
        /// The offending manifest file.
        path: String,
        /// What went wrong.
        reason: String,
    },
    /// Two manifests claim the same CID with disagreeing metadata.
    #[error("manifest conflict on {cid}: records disagree on {field}")]
    Conflict {
        /// The contested byte-CID.
        cid: String,
        /// The first field found to disagree.
        field: &'static str,
    },
}

impl ErrorCode for ManifestError {
    fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "MANIFEST_PARSE_ERROR",
            Self::Conflict { .. } => "MANIFEST_CONFLICT",
        }
    }
}

/// Errors surfaced by the layered artifact resolver.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No source produced verified bytes for the target.
    #[error("artifact not found: {0}")]
    NotFound(String),
    /// The target identifier itself was invalid.
    #[error(transparent)]
    Identifier(#[from] CidError),
    /// A retryable network failure; only surfaced after retries are spent.
    #[error("transient network error: {0}")]
    NetworkTransient(String),
    /// A non-retryable network failure.
    #[error("fatal network error: {0}")]
    NetworkFatal(String),
    /// Retrieved bytes did not match the expected record length.
    #[error("size mismatch for {cid}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The target byte-CID.
        cid: String,
        /// Length claimed by the record.
        expected: u64,
        /// Length of the retrieved bytes.
        actual: u64,
    },
    /// A cache or local filesystem operation failed.
    #[error("store error: {0}")]
    Store(String),
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Identifier(e) => e.code(),
            Self::NetworkTransient(_) => "NETWORK_TRANSIENT",
            Self::NetworkFatal(_) => "NETWORK_FATAL",
            Self::SizeMismatch { .. } => "INTEGRITY_MISMATCH",
            Self::Store(_) => "INTERNAL",
        }
    }
}

/// Errors raised by the sandbox executor.
///
/// The execution classes (`Timeout`, `OutOfGas`, `OutOfMemory`, `Trap`,
/// `PolicyViolation`) terminate the request pipeline successfully with
/// `success = false`; they are not pipeline failures.
#[derive(Error, Debug)]
pub enum VmError {
    /// The wall-clock deadline expired before the entry returned.
    #[error("execution exceeded wall-clock deadline")]
    Timeout,
    /// The gas cap was exhausted.
    #[error("execution ran out of gas")]
    OutOfGas,
    /// A memory growth request exceeded the configured cap.
    #[error("execution exceeded memory cap")]
    OutOfMemory,
    /// The module trapped (unreachable, division by zero, bad call, ...).
    #[error("runtime trap: {0}")]
    Trap(String),
    /// The syscall gateway rejected a capability call.
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    /// An input or declared type is not representable in the sandbox.
    #[error("unsupported type: {0}")]
    TypeUnsupported(String),
    /// Engine or instantiation failure unrelated to guest behavior.
    #[error("vm initialization failed: {0}")]
    Initialization(String),
}

impl ErrorCode for VmError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::OutOfGas => "OUT_OF_GAS",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::Trap(_) => "RUNTIME_TRAP",
            Self::PolicyViolation(_) => "POLICY_VIOLATION",
            Self::TypeUnsupported(_) => "TYPE_UNSUPPORTED",
            Self::Initialization(_) => "INTERNAL",
        }
    }
}

/// Errors surfaced by the intent gateway's admission pipeline.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request failed schema validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The pipeline is administratively disabled.
    #[error("execution pipeline is disabled")]
    Disabled,
    /// The freeze kill switch is engaged.
    #[error("execution pipeline is frozen")]
    Frozen,
    /// The caller falls outside the current canary fraction.
    #[error("caller is not in the active canary fraction")]
    NotInCanary,
    /// The caller exceeded its admission rate.
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller's bucket refills enough for one request.
        retry_after_secs: u64,
    },
    /// The policy engine denied the request.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// The reason attached to the denying rule.
        reason: String,
    },
    /// Resolution failed before execution could start.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The executor rejected the request before running it (marshalling,
    /// engine trouble); distinct from execution-class terminations.
    #[error(transparent)]
    Vm(#[from] VmError),
    /// A bug class; callers see an opaque identifier, details go to logs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for GatewayError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Disabled => "DISABLED",
            Self::Frozen => "FROZEN",
            Self::NotInCanary => "NOT_IN_CANARY",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Resolve(e) => e.code(),
            Self::Vm(e) => e.code(),
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// Errors raised while loading or updating control-plane configuration.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The configuration file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// The configuration file or an environment override did not parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A patch carried an out-of-range value.
    #[error("invalid control patch: {0}")]
    InvalidPatch(String),
}

impl ErrorCode for ControlError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Parse(_) => "INTERNAL",
            Self::InvalidPatch(_) => "INVALID_REQUEST",
        }
    }
}
