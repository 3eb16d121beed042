//! Workers: named-input computations and their transformation records.
//!
//! A worker owns named input pins and one output. When every pin holds a
//! resolved checksum the scheduler builds a [`TransformationRecord`],
//! consults the transformation result cache, and only then dispatches the
//! opaque body to the [`Executor`] collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weft_common::{Buffer, CellType, Checksum};

use crate::scheduler::CancelToken;

/// Static definition of a worker.
#[derive(Clone, Debug)]
pub struct Worker {
    /// Human-readable name, used in logs and diagnostics.
    pub name: String,
    /// Checksum of the code/parameter buffer identifying the body.
    pub params: Checksum,
    /// Runtime tag selecting how the executor interprets the body.
    pub runtime: String,
    /// Celltype of the produced output.
    pub output_celltype: CellType,
}

/// Canonical, content-addressable description of one execution.
///
/// Two executions with equal records produce the same output; the record
/// checksum keys the transformation result cache.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TransformationRecord {
    /// Pin name to `(celltype, checksum)` of each resolved input.
    pub inputs: BTreeMap<String, (CellType, Checksum)>,
    /// Celltype of the output.
    pub output_celltype: CellType,
    /// Checksum of the code/parameter buffer.
    pub params: Checksum,
    /// Runtime tag.
    pub runtime: String,
}

impl TransformationRecord {
    /// Content digest of the record (canonical JSON; BTreeMap gives
    /// sorted pin order).
    pub fn checksum(&self) -> Checksum {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        Checksum::from_bytes(&encoded)
    }
}

/// A failed computation body.
#[derive(Clone, Debug, thiserror::Error)]
#[error("execution of {name:?} failed: {message}")]
pub struct ExecutionError {
    /// The worker name.
    pub name: String,
    /// What went wrong.
    pub message: String,
    /// Output captured from the body, for diagnostics.
    pub captured: String,
}

/// Runs opaque computation bodies.
///
/// Implementations are supplied by the embedder; the fabric never
/// interprets a body itself. Executions run on job-pool threads and must
/// poll the cancel token at reasonable intervals.
pub trait Executor: Send + Sync {
    /// Executes one transformation, returning the output buffer.
    fn execute(
        &self,
        record: &TransformationRecord,
        inputs: &BTreeMap<String, Buffer>,
        cancel: &CancelToken,
    ) -> Result<Buffer, ExecutionError>;
}

/// Adapter turning a closure into an [`Executor`].
pub struct FnExecutor<F>(pub F);

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&TransformationRecord, &BTreeMap<String, Buffer>) -> Result<Buffer, ExecutionError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        record: &TransformationRecord,
        inputs: &BTreeMap<String, Buffer>,
        _cancel: &CancelToken,
    ) -> Result<Buffer, ExecutionError> {
        (self.0)(record, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(runtime: &str) -> TransformationRecord {
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "a".to_string(),
            (CellType::Plain, Checksum::from_bytes(b"[1]")),
        );
        TransformationRecord {
            inputs,
            output_celltype: CellType::Plain,
            params: Checksum::from_bytes(b"code"),
            runtime: runtime.to_string(),
        }
    }

    #[test]
    fn record_checksum_is_content_addressed() {
        assert_eq!(record("py").checksum(), record("py").checksum());
        assert_ne!(record("py").checksum(), record("js").checksum());
    }

    #[test]
    fn fn_executor_runs_closure() {
        let exec = FnExecutor(|_: &TransformationRecord, _: &BTreeMap<String, Buffer>| {
            Ok(Buffer::from_text("[2]"))
        });
        let out = exec
            .execute(&record("py"), &BTreeMap::new(), &CancelToken::new())
            .unwrap();
        assert_eq!(out.as_bytes(), b"[2]");
    }
}
