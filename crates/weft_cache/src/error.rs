//! Error types for cache operations.

use weft_common::Checksum;

/// Errors that can occur during buffer cache operations.
///
/// A `Miss` is recoverable (remote fetch or provenance recomputation may
/// still produce the buffer); `Corruption` is fatal and loudly reported,
/// never silently retried.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The checksum is unknown locally and remotely.
    #[error("cache miss for checksum {checksum}")]
    Miss {
        /// The unknown checksum.
        checksum: Checksum,
    },

    /// A fetched buffer's digest does not match the requested checksum.
    #[error("corrupt buffer: requested {requested}, fetched content hashes to {actual}")]
    Corruption {
        /// The checksum that was requested.
        requested: Checksum,
        /// The digest of the bytes actually received.
        actual: Checksum,
    },

    /// The remote store failed in a way that is neither a miss nor
    /// corruption (connection failure, protocol error).
    #[error("remote store error: {reason}")]
    Remote {
        /// Description of the failure.
        reason: String,
    },
}

impl CacheError {
    /// Convenience constructor for a miss.
    pub fn miss(checksum: Checksum) -> Self {
        CacheError::Miss { checksum }
    }
}
