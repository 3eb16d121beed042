//! Conversion error types.

use weft_cache::CacheError;
use weft_common::{CellType, Checksum};

/// Errors raised by the conversion engine.
///
/// A conversion error is always surfaced to the requester; the engine
/// never silently retries with a different target.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The ordered pair is classified forbidden.
    #[error("conversion from {from} to {to} is forbidden")]
    Forbidden {
        /// Source celltype.
        from: CellType,
        /// Target celltype.
        to: CellType,
    },

    /// The conversion is admissible in general but failed on this
    /// particular content.
    #[error("checksum {checksum} cannot be converted from {from} to {to}: {reason}")]
    Content {
        /// The buffer that failed to convert.
        checksum: Checksum,
        /// Source celltype.
        from: CellType,
        /// Target celltype.
        to: CellType,
        /// What went wrong with the content.
        reason: String,
    },

    /// Equivalence/chain resolution revisited a pair; the classification
    /// table is malformed.
    #[error("circular conversion resolution at ({from}, {to})")]
    CircularResolution {
        /// Source celltype of the revisited pair.
        from: CellType,
        /// Target celltype of the revisited pair.
        to: CellType,
    },

    /// The buffer needed to decide the conversion could not be obtained.
    #[error("buffer {checksum} unavailable for conversion: {source}")]
    BufferUnavailable {
        /// The unobtainable checksum.
        checksum: Checksum,
        /// The underlying cache failure.
        source: CacheError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_mentions_both_celltypes() {
        let err = ConversionError::Forbidden {
            from: CellType::Code,
            to: CellType::Bool,
        };
        let msg = format!("{err}");
        assert!(msg.contains("code") && msg.contains("bool"));
    }
}
