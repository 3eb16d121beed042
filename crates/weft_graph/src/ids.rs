//! Opaque ID newtypes for live-graph entities.
//!
//! Each ID pairs a slot index with a generation counter. Graph entities
//! are destroyed at runtime and their slots reused; the generation makes
//! a stale ID miss instead of aliasing the new occupant.

use crate::arena::SlotId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $name {
            /// Creates an ID from a raw slot index and generation.
            pub fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// Returns the raw slot index.
            pub fn index(self) -> u32 {
                self.index
            }

            /// Returns the generation counter.
            pub fn generation(self) -> u32 {
                self.generation
            }
        }

        impl SlotId for $name {
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            fn index(self) -> u32 {
                self.index
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a cell in the live graph.
    CellId
);

define_id!(
    /// Opaque, copyable ID for an accessor (a live dependency edge).
    AccessorId
);

define_id!(
    /// Opaque, copyable ID for a worker.
    WorkerId
);

define_id!(
    /// Opaque, copyable ID for a structured cell registration.
    ScellId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_roundtrip() {
        let id = CellId::from_parts(42, 3);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 3);
    }

    #[test]
    fn same_slot_different_generation_differ() {
        let a = AccessorId::from_parts(7, 0);
        let b = AccessorId::from_parts(7, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn id_hash_in_set() {
        let mut set = HashSet::new();
        set.insert(WorkerId::from_parts(1, 0));
        set.insert(WorkerId::from_parts(2, 0));
        set.insert(WorkerId::from_parts(1, 0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = ScellId::from_parts(99, 5);
        let json = serde_json::to_string(&id).unwrap();
        let restored: ScellId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }
}
