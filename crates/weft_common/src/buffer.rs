//! Immutable, shared-ownership byte buffers.

use crate::checksum::Checksum;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable byte sequence, the serialized form of a value.
///
/// Buffers are cheap to clone (`Arc`-backed) and are long-term owned only
/// by the buffer cache; everywhere else they are transient handles.
#[derive(Clone, PartialEq, Eq)]
pub struct Buffer {
    bytes: Arc<[u8]>,
}

impl Buffer {
    /// Creates a buffer from raw bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Creates a buffer from a UTF-8 string.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }

    /// Returns the byte length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Computes the checksum of the buffer content.
    pub fn checksum(&self) -> Checksum {
        Checksum::from_bytes(&self.bytes)
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_free_function() {
        let buf = Buffer::new(b"abc".to_vec());
        assert_eq!(buf.checksum(), Checksum::from_bytes(b"abc"));
    }

    #[test]
    fn clone_shares_storage() {
        let buf = Buffer::new(vec![1, 2, 3]);
        let clone = buf.clone();
        assert_eq!(buf.as_bytes().as_ptr(), clone.as_bytes().as_ptr());
    }

    #[test]
    fn from_text() {
        let buf = Buffer::from_text("hello");
        assert_eq!(buf.as_bytes(), b"hello");
    }
}
