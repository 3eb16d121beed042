//! Structured-cell error types.

use weft_graph::GraphError;

/// Errors raised by structured-cell construction and joins.
#[derive(Debug, thiserror::Error)]
pub enum StructuredError {
    /// Two inchannel paths overlap; one would shadow the other.
    #[error("inchannel paths overlap: {a:?} and {b:?}")]
    Overlap {
        /// One of the overlapping paths.
        a: String,
        /// The other path.
        b: String,
    },

    /// A channel buffer did not hold JSON and cannot be overlaid.
    #[error("channel at {path:?} holds a non-JSON buffer")]
    NotJson {
        /// The channel path.
        path: String,
    },

    /// An authoritative write tried to descend through a scalar.
    #[error("cannot write below a scalar at {path:?}")]
    PathBlocked {
        /// The blocked path.
        path: String,
    },

    /// An underlying graph or cache operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
