//! An in-process reference store.
//!
//! [`MemoryStore`] implements the cache's [`RemoteStore`] interface with
//! shared in-memory maps. It stands in for a federation peer in tests and
//! single-process deployments: clones share state, fetched buffers are
//! re-verified against the requested digest, and a service restriction
//! makes unoffered kinds answer as a miss.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::error;
use weft_cache::{BufferInfo, CacheError, RemoteStore};
use weft_common::{Buffer, CellType, Checksum};

use crate::service::ServiceKind;

#[derive(Default)]
struct Inner {
    buffers: HashMap<Checksum, Buffer>,
    infos: HashMap<Checksum, BufferInfo>,
    transformations: HashMap<Checksum, Checksum>,
    elisions: HashMap<Checksum, Checksum>,
    sem2syn: HashMap<(Checksum, CellType), Vec<Checksum>>,
}

/// A shared in-memory store. Clones view the same state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    services: Vec<ServiceKind>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store offering every service kind.
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            services: ServiceKind::ALL.to_vec(),
        }
    }

    /// A store offering only the given kinds; the rest answer as misses.
    pub fn with_services(services: Vec<ServiceKind>) -> Self {
        Self {
            inner: Arc::default(),
            services,
        }
    }

    /// Number of stored buffers.
    pub fn buffer_count(&self) -> usize {
        self.lock().buffers.len()
    }

    fn offers(&self, kind: ServiceKind) -> bool {
        self.services.contains(&kind)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RemoteStore for MemoryStore {
    fn has_buffer(&self, checksum: Checksum) -> bool {
        self.offers(ServiceKind::Buffer) && self.lock().buffers.contains_key(&checksum)
    }

    fn get_buffer(&self, checksum: Checksum) -> Result<Option<Buffer>, CacheError> {
        if !self.offers(ServiceKind::Buffer) {
            return Ok(None);
        }
        let buffer = match self.lock().buffers.get(&checksum) {
            Some(buffer) => buffer.clone(),
            None => return Ok(None),
        };
        let actual = buffer.checksum();
        if actual != checksum {
            error!(requested = %checksum, %actual, "remote buffer failed digest verification");
            return Err(CacheError::Corruption {
                requested: checksum,
                actual,
            });
        }
        Ok(Some(buffer))
    }

    fn set_buffer(&self, checksum: Checksum, buffer: &Buffer) -> Result<(), CacheError> {
        if self.offers(ServiceKind::Buffer) {
            self.lock().buffers.insert(checksum, buffer.clone());
        }
        Ok(())
    }

    fn get_buffer_length(&self, checksum: Checksum) -> Option<u64> {
        if !self.offers(ServiceKind::Buffer) {
            return None;
        }
        self.lock()
            .buffers
            .get(&checksum)
            .map(|b| b.as_bytes().len() as u64)
    }

    fn get_buffer_info(&self, checksum: Checksum) -> Option<BufferInfo> {
        if !self.offers(ServiceKind::BufferInfo) {
            return None;
        }
        self.lock().infos.get(&checksum).cloned()
    }

    fn set_buffer_info(&self, checksum: Checksum, info: &BufferInfo) {
        if self.offers(ServiceKind::BufferInfo) {
            self.lock().infos.insert(checksum, info.clone());
        }
    }

    fn get_transformation_result(&self, tf_checksum: Checksum) -> Option<Checksum> {
        if !self.offers(ServiceKind::Transformation) {
            return None;
        }
        self.lock().transformations.get(&tf_checksum).copied()
    }

    fn set_transformation_result(&self, tf_checksum: Checksum, result: Checksum) {
        if self.offers(ServiceKind::Transformation) {
            self.lock().transformations.insert(tf_checksum, result);
        }
    }

    fn get_elision_result(&self, elision_checksum: Checksum) -> Option<Checksum> {
        if !self.offers(ServiceKind::Elision) {
            return None;
        }
        self.lock().elisions.get(&elision_checksum).copied()
    }

    fn set_elision_result(&self, elision_checksum: Checksum, result: Checksum) {
        if self.offers(ServiceKind::Elision) {
            self.lock().elisions.insert(elision_checksum, result);
        }
    }

    fn get_semantic_to_syntactic(
        &self,
        semantic: Checksum,
        celltype: CellType,
    ) -> Vec<Checksum> {
        self.lock()
            .sem2syn
            .get(&(semantic, celltype))
            .cloned()
            .unwrap_or_default()
    }

    fn set_semantic_to_syntactic(
        &self,
        semantic: Checksum,
        celltype: CellType,
        syntactic: Checksum,
    ) {
        let mut inner = self.lock();
        let entry = inner.sem2syn.entry((semantic, celltype)).or_default();
        if !entry.contains(&syntactic) {
            entry.push(syntactic);
        }
    }
}
