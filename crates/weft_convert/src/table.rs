//! The conversion classification table.
//!
//! Every ordered pair of distinct celltypes belongs to exactly one
//! [`ConversionKind`]. The table is a closed, exhaustive match, so a new
//! celltype cannot be added without classifying all of its pairs; the
//! [`check_conversions`] self-check is retained as a regression test on
//! the equivalence/chain indirections, which the compiler cannot verify.

use crate::error::ConversionError;
use weft_common::{CellType, CELL_TYPES};

/// The seven disjoint kinds of celltype conversion.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConversionKind {
    /// Checksum unchanged, guaranteed to succeed for valid input.
    Trivial,
    /// Checksum unchanged, but the content must pass a validity check.
    Reinterpret,
    /// Guaranteed to succeed; the checksum sometimes changes.
    Reformat,
    /// May fail on content and may change the checksum.
    Possible,
    /// Delegates to another directly-classified pair.
    Equivalent(CellType, CellType),
    /// Delegates through an intermediate celltype.
    Chain(CellType),
    /// Full decode/recode through a structured value; content-dependent.
    Values,
    /// Never admissible.
    Forbidden,
}

/// Classifies an ordered pair of distinct celltypes.
///
/// # Panics
///
/// Panics if `from == to`; identity is not a conversion.
pub fn classify(from: CellType, to: CellType) -> ConversionKind {
    use CellType::*;
    use ConversionKind::*;
    assert_ne!(from, to, "identity pair is not classified");
    match (from, to) {
        // conversions to/from the checksum reference kind are always
        // value-level
        (Checksum, _) | (_, Checksum) => Values,

        (Bytes, Text) => Reinterpret,
        (Bytes, Plain) => Reinterpret,
        (Bytes, Binary) => Reformat,
        (Bytes, Mixed) => Reformat,
        (Bytes, Str) => Chain(Plain),
        (Bytes, Int) => Chain(Plain),
        (Bytes, Float) => Chain(Plain),
        (Bytes, Bool) => Chain(Plain),
        (Bytes, Code) => Chain(Text),

        (Text, Bytes) => Trivial,
        (Text, Plain) => Reformat,
        (Text, Binary) => Chain(Mixed),
        (Text, Mixed) => Equivalent(Text, Str),
        (Text, Str) => Reformat,
        (Text, Int) => Chain(Plain),
        (Text, Float) => Chain(Plain),
        (Text, Bool) => Chain(Plain),
        (Text, Code) => Reinterpret,

        (Plain, Bytes) => Trivial,
        (Plain, Text) => Reformat,
        (Plain, Binary) => Values,
        (Plain, Mixed) => Trivial,
        (Plain, Str) => Reinterpret,
        (Plain, Int) => Reinterpret,
        (Plain, Float) => Reinterpret,
        (Plain, Bool) => Reinterpret,
        (Plain, Code) => Chain(Text),

        (Binary, Bytes) => Reformat,
        (Binary, Text) => Chain(Plain),
        (Binary, Plain) => Values,
        (Binary, Mixed) => Trivial,
        (Binary, Str) => Chain(Bytes),
        (Binary, Int) => Possible,
        (Binary, Float) => Possible,
        (Binary, Bool) => Possible,
        (Binary, Code) => Chain(Text),

        (Mixed, Bytes) => Reformat,
        (Mixed, Text) => Chain(Plain),
        (Mixed, Plain) => Reinterpret,
        (Mixed, Binary) => Reinterpret,
        (Mixed, Str) => Possible,
        (Mixed, Int) => Possible,
        (Mixed, Float) => Possible,
        (Mixed, Bool) => Possible,
        (Mixed, Code) => Chain(Text),

        (Str, Bytes) => Equivalent(Plain, Bytes),
        (Str, Text) => Reformat,
        (Str, Plain) => Trivial,
        (Str, Binary) => Equivalent(Plain, Binary),
        (Str, Mixed) => Equivalent(Str, Binary),
        (Str, Int) => Possible,
        (Str, Float) => Possible,
        (Str, Bool) => Possible,
        (Str, Code) => Equivalent(Str, Text),

        (Int, Bytes) => Equivalent(Plain, Bytes),
        (Int, Text) => Equivalent(Plain, Text),
        (Int, Plain) => Trivial,
        (Int, Binary) => Equivalent(Plain, Binary),
        (Int, Mixed) => Equivalent(Int, Plain),
        (Int, Str) => Reformat,
        (Int, Float) => Reformat,
        (Int, Bool) => Reformat,
        (Int, Code) => Forbidden,

        (Float, Bytes) => Equivalent(Plain, Bytes),
        (Float, Text) => Equivalent(Plain, Text),
        (Float, Plain) => Trivial,
        (Float, Binary) => Equivalent(Plain, Binary),
        (Float, Mixed) => Equivalent(Float, Plain),
        (Float, Str) => Reformat,
        (Float, Int) => Reformat,
        (Float, Bool) => Reformat,
        (Float, Code) => Forbidden,

        (Bool, Bytes) => Equivalent(Plain, Bytes),
        (Bool, Text) => Equivalent(Plain, Text),
        (Bool, Plain) => Trivial,
        (Bool, Binary) => Equivalent(Plain, Binary),
        (Bool, Mixed) => Equivalent(Bool, Plain),
        (Bool, Str) => Reformat,
        (Bool, Int) => Reformat,
        (Bool, Float) => Reformat,
        (Bool, Code) => Forbidden,

        (Code, Bytes) => Equivalent(Code, Text),
        (Code, Text) => Trivial,
        (Code, Plain) => Equivalent(Text, Str),
        (Code, Binary) => Equivalent(Text, Binary),
        (Code, Mixed) => Equivalent(Text, Str),
        (Code, Str) => Equivalent(Text, Str),
        (Code, Int) => Forbidden,
        (Code, Float) => Forbidden,
        (Code, Bool) => Forbidden,

        (Bytes, Bytes)
        | (Text, Text)
        | (Plain, Plain)
        | (Binary, Binary)
        | (Mixed, Mixed)
        | (Str, Str)
        | (Int, Int)
        | (Float, Float)
        | (Bool, Bool)
        | (Code, Code) => unreachable!("identity pair"),
    }
}

/// Expands a conversion into its directly-classified single-hop steps.
///
/// Equivalences rename the pair (the steps may not start at `from` nor
/// end at `to`); chains insert intermediate hops. The returned steps are
/// each classified trivial, reinterpret, reformat, possible, values, or
/// forbidden; no step may be skipped during execution.
pub fn expand_conversion(
    from: CellType,
    to: CellType,
) -> Result<Vec<(CellType, CellType)>, ConversionError> {
    fn inner(
        from: CellType,
        to: CellType,
        seen: &mut Vec<(CellType, CellType)>,
        out: &mut Vec<(CellType, CellType)>,
    ) -> Result<(), ConversionError> {
        if seen.contains(&(from, to)) {
            return Err(ConversionError::CircularResolution { from, to });
        }
        seen.push((from, to));
        match classify(from, to) {
            ConversionKind::Equivalent(a, b) => inner(a, b, seen, out),
            ConversionKind::Chain(mid) => {
                inner(from, mid, seen, out)?;
                inner(mid, to, seen, out)
            }
            _ => {
                out.push((from, to));
                Ok(())
            }
        }
    }
    let mut out = Vec::new();
    if from != to {
        inner(from, to, &mut Vec::new(), &mut out)?;
    }
    Ok(out)
}

/// Startup self-check over the classification table.
///
/// Enumerates every ordered pair of distinct celltypes and verifies that
/// equivalence/chain resolution terminates without cycles in a directly
/// classified pair, and that no indirection maps a pair to itself.
pub fn check_conversions() -> Result<(), ConversionError> {
    for from in CELL_TYPES {
        for to in CELL_TYPES {
            if from == to {
                continue;
            }
            match classify(from, to) {
                ConversionKind::Equivalent(a, b) => {
                    if (a, b) == (from, to) {
                        return Err(ConversionError::CircularResolution { from, to });
                    }
                }
                ConversionKind::Chain(mid) => {
                    if mid == from || mid == to {
                        return Err(ConversionError::CircularResolution { from, to });
                    }
                }
                _ => {}
            }
            expand_conversion(from, to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_common::CellType::*;

    #[test]
    fn self_check_passes() {
        check_conversions().unwrap();
    }

    #[test]
    fn every_pair_expands_to_direct_steps() {
        for from in CELL_TYPES {
            for to in CELL_TYPES {
                if from == to {
                    continue;
                }
                let steps = expand_conversion(from, to).unwrap();
                assert!(!steps.is_empty(), "({from}, {to}) expands to nothing");
                for (a, b) in steps {
                    let kind = classify(a, b);
                    assert!(
                        !matches!(
                            kind,
                            ConversionKind::Equivalent(..) | ConversionKind::Chain(_)
                        ),
                        "({a}, {b}) is not a direct step"
                    );
                }
            }
        }
    }

    #[test]
    fn chain_steps_compose() {
        // binary -> str goes binary -> bytes -> plain -> str
        let steps = expand_conversion(Binary, Str).unwrap();
        assert_eq!(steps, vec![(Binary, Bytes), (Bytes, Plain), (Plain, Str)]);
    }

    #[test]
    fn equivalences_rename_pairs() {
        // str -> bytes behaves as plain -> bytes (a str buffer is JSON)
        let steps = expand_conversion(Str, Bytes).unwrap();
        assert_eq!(steps, vec![(Plain, Bytes)]);
        assert_eq!(classify(Plain, Bytes), ConversionKind::Trivial);
    }

    #[test]
    fn code_to_scalar_is_forbidden() {
        assert_eq!(classify(Code, Bool), ConversionKind::Forbidden);
        assert_eq!(classify(Int, Code), ConversionKind::Forbidden);
    }

    #[test]
    fn checksum_pairs_are_value_level() {
        for other in CELL_TYPES {
            if other == Checksum {
                continue;
            }
            assert_eq!(classify(Checksum, other), ConversionKind::Values);
            assert_eq!(classify(other, Checksum), ConversionKind::Values);
        }
    }

    #[test]
    fn trivial_pairs_have_reinterpret_inverses() {
        // the subtype-to-supertype promotions invert to reinterpretations
        for (a, b) in [
            (Text, Bytes),
            (Plain, Mixed),
            (Binary, Mixed),
            (Str, Plain),
            (Int, Plain),
            (Float, Plain),
            (Bool, Plain),
            (Code, Text),
        ] {
            assert_eq!(classify(a, b), ConversionKind::Trivial);
            assert_eq!(classify(b, a), ConversionKind::Reinterpret);
        }
    }
}
