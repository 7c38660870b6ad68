// Path: crates/cid/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Byte-CID codec.
//!
//! Artifacts are addressed by a CIDv1 with the `raw` codec and a SHA-256
//! multihash, serialized as base32-lowercase without padding. Two artifacts
//! with identical bytes share a CID; any byte-level change changes it.
//! Verification recomputes the digest and compares in constant time.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use artifex_types::error::CidError;

/// Multicodec code for raw bytes.
pub const RAW_CODEC: u64 = 0x55;
/// Multicodec code for dag-pb, carried only by legacy CIDv0 text forms.
pub const DAG_PB_CODEC: u64 = 0x70;
/// Multihash code for SHA2-256.
pub const SHA2_256_CODE: u64 = 0x12;

/// A parsed, validated byte-CID.
///
/// Construction goes through [`ByteCid::from_bytes`] (computation) or
/// [`ByteCid::parse`] (validation); the value is immutable afterwards and
/// compared by equality on the underlying CID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteCid {
    inner: Cid,
    text: String,
}

impl ByteCid {
    /// Computes the CID of `bytes`: SHA-256, multihash-wrapped, CIDv1 with
    /// the raw codec.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mh = Code::Sha2_256.digest(bytes);
        let inner = Cid::new_v1(RAW_CODEC, mh);
        let text = inner.to_string();
        Self { inner, text }
    }

    /// Parses and validates a CID text form.
    ///
    /// CIDv1 must carry the raw codec; legacy CIDv0 forms (implicit dag-pb)
    /// are accepted for compatibility with external callers. The multihash
    /// must be SHA2-256 with a 32-byte digest.
    pub fn parse(text: &str) -> Result<Self, CidError> {
        let inner = Cid::try_from(text).map_err(|e| CidError::Malformed(e.to_string()))?;
        match (inner.version(), inner.codec()) {
            (cid::Version::V1, RAW_CODEC) => {}
            (cid::Version::V0, DAG_PB_CODEC) => {}
            (_, codec) => {
                return Err(CidError::Malformed(format!(
                    "unsupported codec 0x{:x}",
                    codec
                )))
            }
        }
        let mh = inner.hash();
        if mh.code() != SHA2_256_CODE {
            return Err(CidError::Malformed(format!(
                "unsupported multihash algorithm 0x{:x}",
                mh.code()
            )));
        }
        if mh.digest().len() != 32 {
            return Err(CidError::Malformed(format!(
                "unexpected digest length {}",
                mh.digest().len()
            )));
        }
        let text = inner.to_string();
        Ok(Self { inner, text })
    }

    /// The multicodec code (`raw` for every CID this pipeline produces).
    pub fn codec(&self) -> u64 {
        self.inner.codec()
    }

    /// The SHA-256 digest carried by the identifier.
    pub fn digest(&self) -> &[u8] {
        self.inner.hash().digest()
    }

    /// The canonical text form.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Verifies `bytes` against this identifier.
    ///
    /// The digest comparison is constant-time; a mismatch reports both
    /// digests hex-encoded.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), CidError> {
        let computed = Sha256::digest(bytes);
        if computed.as_slice().ct_eq(self.digest()).into() {
            Ok(())
        } else {
            Err(CidError::IntegrityMismatch {
                expected: hex::encode(self.digest()),
                computed: hex::encode(computed),
            })
        }
    }
}

impl std::fmt::Display for ByteCid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::str::FromStr for ByteCid {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ByteCid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for ByteCid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of `bytes`, hex-encoded. Recorded next to the CID in artifact
/// records so integrity can be checked without re-deriving the multihash.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_equality() {
        let a = ByteCid::from_bytes(b"hello world");
        let b = ByteCid::parse(a.as_str()).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with('b'), "v1 text form is base32-lower");
        assert!(!a.as_str().contains('='), "no padding");

        let c = ByteCid::from_bytes(b"hello worlD");
        assert_ne!(a, c, "any byte change changes the CID");
    }

    #[test]
    fn verify_accepts_matching_bytes_only() {
        let cid = ByteCid::from_bytes(b"payload");
        assert!(cid.verify(b"payload").is_ok());
        let err = cid.verify(b"payload!").unwrap_err();
        assert!(matches!(err, CidError::IntegrityMismatch { .. }));
    }

    #[test]
    fn malformed_text_is_rejected() {
        for bad in ["", "not-a-cid", "bafkrei!!", "b"] {
            assert!(
                matches!(ByteCid::parse(bad), Err(CidError::Malformed(_))),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn empty_and_large_inputs_encode() {
        // Boundary: minimum (empty) and a larger buffer both produce
        // well-formed, verifiable identifiers.
        let empty = ByteCid::from_bytes(b"");
        assert!(empty.verify(b"").is_ok());
        let big = vec![0xA5u8; 1 << 16];
        let cid = ByteCid::from_bytes(&big);
        assert!(cid.verify(&big).is_ok());
    }

    #[test]
    fn sha256_hex_matches_digest() {
        let cid = ByteCid::from_bytes(b"abc");
        assert_eq!(sha256_hex(b"abc"), hex::encode(cid.digest()));
    }
}
