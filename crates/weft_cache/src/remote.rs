//! The remote buffer/value store collaborator interface.

use crate::buffer_info::BufferInfo;
use crate::error::CacheError;
use weft_common::{Buffer, CellType, Checksum};

/// External store the cache delegates to on local misses.
///
/// Durability is the store's concern, not the cache's. Implementations
/// live outside this crate (`weft_remote` ships an in-process reference
/// implementation); the cache re-verifies every fetched buffer against the
/// requested checksum and treats a mismatch as fatal corruption.
pub trait RemoteStore {
    /// Returns `true` if the store holds the buffer.
    fn has_buffer(&self, checksum: Checksum) -> bool;

    /// Fetches a buffer, or `None` on a remote miss.
    fn get_buffer(&self, checksum: Checksum) -> Result<Option<Buffer>, CacheError>;

    /// Writes a buffer under its checksum.
    fn set_buffer(&self, checksum: Checksum, buffer: &Buffer) -> Result<(), CacheError>;

    /// Returns the stored byte length of a buffer, if known.
    fn get_buffer_length(&self, checksum: Checksum) -> Option<u64>;

    /// Fetches stored classification metadata, if any.
    fn get_buffer_info(&self, checksum: Checksum) -> Option<BufferInfo>;

    /// Stores classification metadata.
    fn set_buffer_info(&self, checksum: Checksum, info: &BufferInfo);

    /// Looks up a cached transformation result.
    fn get_transformation_result(&self, tf_checksum: Checksum) -> Option<Checksum>;

    /// Records a transformation result.
    fn set_transformation_result(&self, tf_checksum: Checksum, result: Checksum);

    /// Looks up a cached macro elision result.
    fn get_elision_result(&self, elision_checksum: Checksum) -> Option<Checksum>;

    /// Records a macro elision result.
    fn set_elision_result(&self, elision_checksum: Checksum, result: Checksum);

    /// Looks up the syntactic representatives of a semantic checksum for a
    /// celltype.
    fn get_semantic_to_syntactic(
        &self,
        semantic: Checksum,
        celltype: CellType,
    ) -> Vec<Checksum>;

    /// Records a syntactic representative of a semantic checksum.
    fn set_semantic_to_syntactic(
        &self,
        semantic: Checksum,
        celltype: CellType,
        syntactic: Checksum,
    );
}

/// A remote store that holds nothing; used when no delegation is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemote;

impl RemoteStore for NoRemote {
    fn has_buffer(&self, _checksum: Checksum) -> bool {
        false
    }

    fn get_buffer(&self, _checksum: Checksum) -> Result<Option<Buffer>, CacheError> {
        Ok(None)
    }

    fn set_buffer(&self, _checksum: Checksum, _buffer: &Buffer) -> Result<(), CacheError> {
        Ok(())
    }

    fn get_buffer_length(&self, _checksum: Checksum) -> Option<u64> {
        None
    }

    fn get_buffer_info(&self, _checksum: Checksum) -> Option<BufferInfo> {
        None
    }

    fn set_buffer_info(&self, _checksum: Checksum, _info: &BufferInfo) {}

    fn get_transformation_result(&self, _tf_checksum: Checksum) -> Option<Checksum> {
        None
    }

    fn set_transformation_result(&self, _tf_checksum: Checksum, _result: Checksum) {}

    fn get_elision_result(&self, _elision_checksum: Checksum) -> Option<Checksum> {
        None
    }

    fn set_elision_result(&self, _elision_checksum: Checksum, _result: Checksum) {}

    fn get_semantic_to_syntactic(
        &self,
        _semantic: Checksum,
        _celltype: CellType,
    ) -> Vec<Checksum> {
        Vec::new()
    }

    fn set_semantic_to_syntactic(
        &self,
        _semantic: Checksum,
        _celltype: CellType,
        _syntactic: Checksum,
    ) {
    }
}
