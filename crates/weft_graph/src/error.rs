//! Graph and scheduling error types.

use weft_cache::CacheError;
use weft_common::{Checksum, InternalError};
use weft_convert::ConversionError;

use crate::worker::ExecutionError;

/// Errors raised by graph mutation, evaluation and scheduling.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A connection targeted a cell that already has an upstream.
    #[error("target cell is not independent")]
    NotIndependent,

    /// An ID referred to a destroyed or never-allocated entity.
    #[error("stale {kind} id")]
    Stale {
        /// The entity kind ("cell", "accessor", "worker", "scell").
        kind: &'static str,
    },

    /// A worker pin name does not exist.
    #[error("worker has no pin named {pin:?}")]
    UnknownPin {
        /// The requested pin name.
        pin: String,
    },

    /// A worker pin already has an upstream connection.
    #[error("worker pin {pin:?} is already connected")]
    PinBound {
        /// The pin name.
        pin: String,
    },

    /// An expression violated a structural constraint.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// A buffer could not be recovered locally, remotely or by
    /// provenance replay.
    #[error("buffer {checksum} is irrecoverable")]
    Irrecoverable {
        /// The unrecoverable checksum.
        checksum: Checksum,
    },

    /// A celltype conversion failed during evaluation.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A computation body failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A graph bookkeeping invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}
