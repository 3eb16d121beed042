//! The closed enumeration of buffer serialization formats.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The serialization format and semantic kind of a buffer.
///
/// Celltypes form a directed conversion graph (not a hierarchy); the
/// admissible conversions between any ordered pair are classified
/// exhaustively in `weft_convert`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellType {
    /// Raw bytes; buffer and value coincide.
    Bytes,
    /// UTF-8 text.
    Text,
    /// Structured plain literal: any JSON-parseable byte sequence.
    Plain,
    /// Native numeric array (weft array format, magic-tagged).
    Binary,
    /// Hybrid: a plain buffer, a binary buffer, or a mixed container.
    Mixed,
    /// JSON string scalar (a plain sub-kind).
    Str,
    /// JSON integer scalar (a plain sub-kind).
    Int,
    /// JSON float scalar (a plain sub-kind).
    Float,
    /// JSON boolean scalar (a plain sub-kind).
    Bool,
    /// Source code, a UTF-8 text sub-kind.
    Code,
    /// Checksum-of-checksum: the buffer holds a 64-char hex digest
    /// referencing other content.
    Checksum,
}

/// All celltypes, in a fixed order. Used by the conversion-table
/// self-check to enumerate every ordered pair.
pub const CELL_TYPES: [CellType; 11] = [
    CellType::Bytes,
    CellType::Text,
    CellType::Plain,
    CellType::Binary,
    CellType::Mixed,
    CellType::Str,
    CellType::Int,
    CellType::Float,
    CellType::Bool,
    CellType::Code,
    CellType::Checksum,
];

impl CellType {
    /// The serialized name of the celltype.
    pub fn name(self) -> &'static str {
        match self {
            CellType::Bytes => "bytes",
            CellType::Text => "text",
            CellType::Plain => "plain",
            CellType::Binary => "binary",
            CellType::Mixed => "mixed",
            CellType::Str => "str",
            CellType::Int => "int",
            CellType::Float => "float",
            CellType::Bool => "bool",
            CellType::Code => "code",
            CellType::Checksum => "checksum",
        }
    }

    /// Returns `true` for the scalar sub-kinds of plain.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            CellType::Str | CellType::Int | CellType::Float | CellType::Bool
        )
    }

    /// Returns `true` for celltypes whose buffers are JSON.
    pub fn is_json_kind(self) -> bool {
        self == CellType::Plain || self.is_scalar()
    }

    /// Returns `true` for celltypes whose buffers are UTF-8 text.
    pub fn is_text_kind(self) -> bool {
        matches!(self, CellType::Text | CellType::Code)
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown celltype name.
#[derive(Debug, thiserror::Error)]
#[error("unknown celltype name: {name:?}")]
pub struct ParseCellTypeError {
    /// The rejected name.
    pub name: String,
}

impl FromStr for CellType {
    type Err = ParseCellTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CELL_TYPES
            .into_iter()
            .find(|ct| ct.name() == s)
            .ok_or_else(|| ParseCellTypeError {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for ct in CELL_TYPES {
            let back: CellType = ct.name().parse().unwrap();
            assert_eq!(ct, back);
        }
    }

    #[test]
    fn unknown_name_rejected() {
        assert!("json".parse::<CellType>().is_err());
    }

    #[test]
    fn kind_predicates() {
        assert!(CellType::Int.is_scalar());
        assert!(CellType::Plain.is_json_kind());
        assert!(!CellType::Plain.is_scalar());
        assert!(CellType::Code.is_text_kind());
        assert!(!CellType::Bytes.is_text_kind());
    }

    #[test]
    fn all_celltypes_distinct() {
        for (i, a) in CELL_TYPES.iter().enumerate() {
            for b in &CELL_TYPES[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
