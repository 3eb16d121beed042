//! Common result and error types for the Weft fabric.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable consistency violation (a bug in Weft
/// or in code driving it), not a data-dependent failure. Data-dependent
/// failures (cache misses, conversion errors, execution errors) have their
/// own per-crate error enums and are surfaced through statuses.
pub type WeftResult<T> = Result<T, InternalError>;

/// A consistency violation: a programmer error that must fail fast.
///
/// Raised for things like re-registering a checksum with different buffer
/// content or constructing overlapping inchannels. These are never
/// recovered from.
#[derive(Debug, thiserror::Error)]
#[error("consistency violation: {message}")]
pub struct InternalError {
    /// Description of the violation.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("checksum re-registered with different content");
        assert_eq!(
            format!("{err}"),
            "consistency violation: checksum re-registered with different content"
        );
    }

    #[test]
    fn from_string() {
        let err: InternalError = "overlapping inchannels".to_string().into();
        assert_eq!(err.message, "overlapping inchannels");
    }
}
