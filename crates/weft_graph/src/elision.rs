//! Macro elision.
//!
//! A macro run is summarized by the checksums of its parameters and
//! inputs. When the same summary is seen again, the recorded output
//! checksums are replayed and the macro body is skipped entirely.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use weft_common::Checksum;

use crate::ids::CellId;

/// One recorded macro run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElisionRecord {
    /// Checksum of the macro parameters.
    pub params: Checksum,
    /// Input checksums by name.
    pub inputs: BTreeMap<String, Checksum>,
    /// Output checksums by name.
    pub outputs: BTreeMap<String, Checksum>,
    /// Cells whose values the run depended on.
    #[serde(skip)]
    pub cells: Vec<CellId>,
}

/// Derives the elision key from parameters and inputs.
pub fn elision_checksum(params: Checksum, inputs: &BTreeMap<String, Checksum>) -> Checksum {
    let mut material = Vec::new();
    material.extend_from_slice(params.as_raw());
    for (name, cs) in inputs {
        material.extend_from_slice(name.as_bytes());
        material.push(0);
        material.extend_from_slice(cs.as_raw());
    }
    Checksum::from_bytes(&material)
}

/// The elision table.
#[derive(Default)]
pub struct ElisionTable {
    records: HashMap<Checksum, ElisionRecord>,
    by_cell: HashMap<CellId, HashSet<Checksum>>,
}

impl ElisionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed macro run.
    pub fn record(&mut self, record: ElisionRecord) -> Checksum {
        let key = elision_checksum(record.params, &record.inputs);
        for cell in &record.cells {
            self.by_cell.entry(*cell).or_default().insert(key);
        }
        debug!(%key, outputs = record.outputs.len(), "elision recorded");
        self.records.insert(key, record);
        key
    }

    /// Looks up a prior run with the same parameters and inputs.
    pub fn lookup(
        &self,
        params: Checksum,
        inputs: &BTreeMap<String, Checksum>,
    ) -> Option<&ElisionRecord> {
        self.records.get(&elision_checksum(params, inputs))
    }

    /// Drops every record that depended on the cell.
    pub fn invalidate_cell(&mut self, cell: CellId) -> usize {
        let keys = match self.by_cell.remove(&cell) {
            Some(keys) => keys,
            None => return 0,
        };
        let mut dropped = 0;
        for key in keys {
            if self.records.remove(&key).is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(?cell, dropped, "elision records invalidated");
        }
        dropped
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs(tag: &[u8]) -> Checksum {
        Checksum::from_bytes(tag)
    }

    fn inputs(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Checksum> {
        pairs
            .iter()
            .map(|(name, tag)| (name.to_string(), cs(tag)))
            .collect()
    }

    #[test]
    fn key_depends_on_names_and_checksums() {
        let params = cs(b"params");
        let a = elision_checksum(params, &inputs(&[("x", b"1"), ("y", b"2")]));
        let b = elision_checksum(params, &inputs(&[("x", b"2"), ("y", b"1")]));
        let c = elision_checksum(params, &inputs(&[("x", b"1"), ("y", b"2")]));
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn record_then_lookup_replays_outputs() {
        let mut table = ElisionTable::new();
        let params = cs(b"params");
        let ins = inputs(&[("x", b"1")]);
        let mut outputs = BTreeMap::new();
        outputs.insert("out".to_string(), cs(b"result"));
        table.record(ElisionRecord {
            params,
            inputs: ins.clone(),
            outputs: outputs.clone(),
            cells: Vec::new(),
        });
        let hit = table.lookup(params, &ins).unwrap();
        assert_eq!(hit.outputs, outputs);
        assert!(table.lookup(params, &inputs(&[("x", b"other")])).is_none());
    }

    #[test]
    fn invalidation_drops_dependent_records_only() {
        let mut table = ElisionTable::new();
        let cell_a = crate::ids::CellId::from_parts(0, 0);
        let cell_b = crate::ids::CellId::from_parts(1, 0);
        table.record(ElisionRecord {
            params: cs(b"p1"),
            inputs: inputs(&[("x", b"1")]),
            outputs: BTreeMap::new(),
            cells: vec![cell_a],
        });
        table.record(ElisionRecord {
            params: cs(b"p2"),
            inputs: inputs(&[("x", b"2")]),
            outputs: BTreeMap::new(),
            cells: vec![cell_b],
        });
        assert_eq!(table.invalidate_cell(cell_a), 1);
        assert_eq!(table.len(), 1);
        assert!(table.lookup(cs(b"p2"), &inputs(&[("x", b"2")])).is_some());
    }
}
