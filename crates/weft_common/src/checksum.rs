//! Content checksums identifying buffers throughout the fabric.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 256-bit content checksum computed with SHA-256.
///
/// Every buffer in the fabric is identified by its checksum, and every
/// cache layer is keyed by it. Two buffers with the same `Checksum` are
/// assumed to have identical content. The all-zero [`NIL`](Self::NIL)
/// checksum denotes "no value" and is never the digest of real content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// The nil checksum, denoting the absence of a value.
    pub const NIL: Checksum = Checksum([0u8; 32]);

    /// Computes the checksum of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.into())
    }

    /// Wraps a raw 32-byte digest.
    pub fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-byte digest.
    pub fn as_raw(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns `true` unless this is the nil checksum.
    pub fn is_some(&self) -> bool {
        *self != Self::NIL
    }

    /// Returns `true` if this is the nil checksum.
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Returns the 64-character lowercase hex form.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Checksum {
    type Err = ParseChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseChecksumError {
                input: s.to_string(),
            });
        }
        let mut raw = [0u8; 32];
        hex::decode_to_slice(s, &mut raw).map_err(|_| ParseChecksumError {
            input: s.to_string(),
        })?;
        Ok(Self(raw))
    }
}

/// Error returned when parsing a checksum from a hex string fails.
#[derive(Debug, thiserror::Error)]
#[error("invalid checksum hex string: {input:?}")]
pub struct ParseChecksumError {
    /// The rejected input (possibly truncated).
    pub input: String,
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "Checksum(nil)")
        } else {
            write!(f, "Checksum({:02x}{:02x}..)", self.0[0], self.0[1])
        }
    }
}

// Serialized as hex so checksums are readable in JSON metadata blobs.
impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
