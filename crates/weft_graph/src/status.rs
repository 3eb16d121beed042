//! Void status reasons for cells and workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a cell or worker output holds no value.
///
/// A void node always carries exactly one reason; reasons are
/// distinguishable so that a cancelled computation never masquerades as
/// a failed one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusReason {
    /// Independent cell with no value set and no upstream.
    Unconnected,
    /// No value has been produced yet.
    Undefined,
    /// The produced value is invalid for the cell's celltype.
    Invalid,
    /// The producing computation failed.
    Error,
    /// An upstream dependency is void.
    Upstream,
    /// The producing computation was cancelled.
    Cancelled,
    /// The producing computation is in flight.
    Executing,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusReason::Unconnected => "unconnected",
            StatusReason::Undefined => "undefined",
            StatusReason::Invalid => "invalid",
            StatusReason::Error => "error",
            StatusReason::Upstream => "upstream",
            StatusReason::Cancelled => "cancelled",
            StatusReason::Executing => "executing",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&StatusReason::Unconnected).unwrap();
        assert_eq!(json, "\"unconnected\"");
        assert_eq!(StatusReason::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn cancelled_is_not_error() {
        assert_ne!(StatusReason::Cancelled, StatusReason::Error);
    }
}
