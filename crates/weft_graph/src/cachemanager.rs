//! Provenance and result-cache bookkeeping on top of the buffer cache.
//!
//! Every checksum the fabric derives is remembered together with the
//! recipe that produced it, so an evicted buffer can be recomputed
//! (fingertipped) later instead of being lost.

use std::collections::HashMap;

use tracing::debug;
use weft_cache::BufferCache;
use weft_common::Checksum;

use crate::expression::Expression;
use crate::worker::TransformationRecord;

/// How a checksum was derived.
#[derive(Clone, Debug)]
pub enum Provenance {
    /// Result of evaluating an expression.
    Expression(Expression),
    /// Output of the transformation with this record checksum.
    Transformation(Checksum),
}

/// Tracks provenance, transformation records and local result memos.
#[derive(Default)]
pub struct CacheManager {
    provenance: HashMap<Checksum, Provenance>,
    records: HashMap<Checksum, TransformationRecord>,
    results: HashMap<Checksum, Checksum>,
}

impl CacheManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers how a checksum was derived. An existing recipe for the
    /// same checksum is kept; any valid one suffices for replay.
    pub fn record_provenance(&mut self, checksum: Checksum, provenance: Provenance) {
        self.provenance.entry(checksum).or_insert(provenance);
    }

    /// The recorded recipe for a checksum, if any.
    pub fn provenance(&self, checksum: Checksum) -> Option<&Provenance> {
        self.provenance.get(&checksum)
    }

    /// Stores a transformation record under its own checksum and memoizes
    /// its result locally.
    pub fn record_transformation(
        &mut self,
        record: TransformationRecord,
        result: Checksum,
    ) -> Checksum {
        let tf_checksum = record.checksum();
        debug!(%tf_checksum, %result, "transformation recorded");
        self.records.insert(tf_checksum, record);
        self.results.insert(tf_checksum, result);
        self.record_provenance(result, Provenance::Transformation(tf_checksum));
        tf_checksum
    }

    /// The stored record for a transformation checksum.
    pub fn transformation_record(&self, tf_checksum: Checksum) -> Option<&TransformationRecord> {
        self.records.get(&tf_checksum)
    }

    /// Looks up a transformation result, locally first, then remotely.
    /// A remote hit is memoized locally.
    pub fn transformation_result(
        &mut self,
        cache: &BufferCache,
        tf_checksum: Checksum,
    ) -> Option<Checksum> {
        if let Some(result) = self.results.get(&tf_checksum) {
            return Some(*result);
        }
        let result = cache.remote().get_transformation_result(tf_checksum)?;
        self.results.insert(tf_checksum, result);
        Some(result)
    }

    /// Publishes a result to the remote result cache.
    pub fn push_transformation_result(
        &self,
        cache: &BufferCache,
        tf_checksum: Checksum,
        result: Checksum,
    ) {
        cache.remote().set_transformation_result(tf_checksum, result);
    }

    /// Forgets the locally memoized result for a transformation. Used by
    /// fingertip replay, which must re-execute rather than trust a memo
    /// for a buffer that proved unavailable.
    pub fn forget_result(&mut self, tf_checksum: Checksum) {
        self.results.remove(&tf_checksum);
    }

    /// Drops provenance entries whose recipe mentions a destroyed
    /// transformation record.
    pub fn forget_transformation(&mut self, tf_checksum: Checksum) {
        self.records.remove(&tf_checksum);
        self.results.remove(&tf_checksum);
        self.provenance.retain(|_, p| {
            !matches!(p, Provenance::Transformation(tf) if *tf == tf_checksum)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_cache::NoRemote;
    use weft_common::CellType;

    fn cs(tag: &[u8]) -> Checksum {
        Checksum::from_bytes(tag)
    }

    fn record() -> TransformationRecord {
        let mut inputs = BTreeMap::new();
        inputs.insert("x".to_string(), (CellType::Int, cs(b"1")));
        TransformationRecord {
            inputs,
            output_celltype: CellType::Int,
            params: cs(b"code"),
            runtime: "test".to_string(),
        }
    }

    #[test]
    fn recorded_result_is_memoized() {
        let mut manager = CacheManager::new();
        let cache = BufferCache::new(Box::new(NoRemote));
        let tf = manager.record_transformation(record(), cs(b"out"));
        assert_eq!(manager.transformation_result(&cache, tf), Some(cs(b"out")));
        assert!(matches!(
            manager.provenance(cs(b"out")),
            Some(Provenance::Transformation(t)) if *t == tf
        ));
    }

    #[test]
    fn first_provenance_wins() {
        let mut manager = CacheManager::new();
        let expr = Expression::conversion(cs(b"a"), CellType::Plain, CellType::Text);
        manager.record_provenance(cs(b"out"), Provenance::Expression(expr));
        manager.record_provenance(cs(b"out"), Provenance::Transformation(cs(b"tf")));
        assert!(matches!(
            manager.provenance(cs(b"out")),
            Some(Provenance::Expression(_))
        ));
    }

    #[test]
    fn forget_result_forces_reexecution() {
        let mut manager = CacheManager::new();
        let cache = BufferCache::new(Box::new(NoRemote));
        let tf = manager.record_transformation(record(), cs(b"out"));
        manager.forget_result(tf);
        assert_eq!(manager.transformation_result(&cache, tf), None);
        // the record itself survives for replay
        assert!(manager.transformation_record(tf).is_some());
    }
}
