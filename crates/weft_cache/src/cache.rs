//! The checksum-to-buffer cache.
//!
//! `BufferCache` is the sole long-term owner of buffers. Checksums with a
//! nonzero refcount are never evicted; zero-refcount buffers survive a
//! bounded grace period (longer for small buffers) before a `tick` purges
//! them. On a local miss the cache delegates to its [`RemoteStore`] and
//! re-verifies the fetched bytes against the requested digest.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use weft_common::{Buffer, Checksum, InternalError, WeftResult};

use crate::buffer_info::BufferInfo;
use crate::error::CacheError;
use crate::remote::RemoteStore;

/// Buffers below this size get the long grace period.
pub const SMALL_BUFFER_LIMIT: usize = 100_000;

/// Grace period for unreferenced large buffers.
pub const LIFETIME_TEMP: Duration = Duration::from_secs(20);

/// Grace period for unreferenced small buffers.
pub const LIFETIME_TEMP_SMALL: Duration = Duration::from_secs(600);

/// Local content-addressed buffer store with refcounting and bounded
/// lifetime for unreferenced entries.
pub struct BufferCache {
    buffers: HashMap<Checksum, Buffer>,
    refcount: HashMap<Checksum, u64>,
    /// Last time a zero-refcount buffer was stored or touched.
    last_use: HashMap<Checksum, Instant>,
    /// Classification metadata; never expires.
    buffer_info: HashMap<Checksum, BufferInfo>,
    /// Checksums incref'ed without a buffer; value records whether the
    /// buffer should be written remotely once found.
    missing: HashMap<Checksum, bool>,
    remote: Box<dyn RemoteStore>,
    small_buffer_limit: usize,
    lifetime_temp: Duration,
    lifetime_temp_small: Duration,
}

impl BufferCache {
    /// Creates a cache with the default grace periods, pre-registering the
    /// well-known empty dict and list buffers as persistent.
    pub fn new(remote: Box<dyn RemoteStore>) -> Self {
        Self::with_lifetimes(remote, SMALL_BUFFER_LIMIT, LIFETIME_TEMP, LIFETIME_TEMP_SMALL)
    }

    /// Creates a cache with explicit eviction parameters.
    pub fn with_lifetimes(
        remote: Box<dyn RemoteStore>,
        small_buffer_limit: usize,
        lifetime_temp: Duration,
        lifetime_temp_small: Duration,
    ) -> Self {
        let mut cache = Self {
            buffers: HashMap::new(),
            refcount: HashMap::new(),
            last_use: HashMap::new(),
            buffer_info: HashMap::new(),
            missing: HashMap::new(),
            remote,
            small_buffer_limit,
            lifetime_temp,
            lifetime_temp_small,
        };
        for well_known in [b"{}".as_slice(), b"[]".as_slice()] {
            let buffer = Buffer::from(well_known);
            let checksum = buffer.checksum();
            cache
                .incref_buffer(checksum, buffer)
                .expect("well-known buffer registration cannot conflict");
        }
        cache
    }

    /// Stores a buffer locally without touching its refcount.
    ///
    /// Idempotent: re-storing identical content is a no-op. Re-storing the
    /// same checksum with different content is a fatal consistency
    /// violation. Resolves pending missing entries for the checksum.
    pub fn cache_buffer(&mut self, checksum: Checksum, buffer: Buffer) -> WeftResult<()> {
        if checksum.is_nil() {
            return Ok(());
        }
        if let Some(existing) = self.buffers.get(&checksum) {
            if existing.as_bytes() != buffer.as_bytes() {
                return Err(InternalError::new(format!(
                    "checksum {checksum} re-registered with different buffer content"
                )));
            }
            self.last_use.insert(checksum, Instant::now());
            return Ok(());
        }
        debug!(checksum = %checksum, len = buffer.len(), "cache buffer");
        self.record_length(checksum, buffer.len() as u64);
        self.last_use.insert(checksum, Instant::now());
        self.buffers.insert(checksum, buffer.clone());
        self.resolve_missing(checksum, &buffer);
        Ok(())
    }

    /// Increments a checksum's refcount, providing the buffer.
    pub fn incref_buffer(&mut self, checksum: Checksum, buffer: Buffer) -> WeftResult<()> {
        if checksum.is_nil() {
            return Err(InternalError::new("incref of nil checksum"));
        }
        self.cache_buffer(checksum, buffer)?;
        *self.refcount.entry(checksum).or_insert(0) += 1;
        Ok(())
    }

    /// Increments a checksum's refcount without providing a buffer.
    ///
    /// If the buffer is not obtainable locally or remotely, the checksum
    /// is recorded as missing until someone provides the content.
    pub fn incref(&mut self, checksum: Checksum) -> WeftResult<()> {
        if checksum.is_nil() {
            return Err(InternalError::new("incref of nil checksum"));
        }
        *self.refcount.entry(checksum).or_insert(0) += 1;
        if !self.buffers.contains_key(&checksum) && !self.remote.has_buffer(checksum) {
            debug!(checksum = %checksum, "incref of unavailable buffer, tracking as missing");
            self.missing.entry(checksum).or_insert(false);
        }
        Ok(())
    }

    /// Decrements a checksum's refcount. Dropping to zero starts the
    /// eviction grace period.
    pub fn decref(&mut self, checksum: Checksum) {
        if checksum.is_nil() {
            return;
        }
        match self.refcount.get_mut(&checksum) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.refcount.remove(&checksum);
                self.missing.remove(&checksum);
                if self.buffers.contains_key(&checksum) {
                    self.last_use.insert(checksum, Instant::now());
                }
            }
            None => warn!(checksum = %checksum, "decref of unreferenced checksum"),
        }
    }

    /// Current refcount of a checksum.
    pub fn refcount(&self, checksum: Checksum) -> u64 {
        self.refcount.get(&checksum).copied().unwrap_or(0)
    }

    /// Returns the buffer if locally resident, without remote delegation.
    /// Refreshes the grace timer.
    pub fn get_local(&mut self, checksum: Checksum) -> Option<Buffer> {
        let buffer = self.buffers.get(&checksum).cloned()?;
        self.last_use.insert(checksum, Instant::now());
        Some(buffer)
    }

    /// Returns the buffer, delegating to the remote store on a local miss.
    ///
    /// Fetched bytes are re-verified against the requested checksum; a
    /// mismatch is [`CacheError::Corruption`], reported loudly and never
    /// silently retried.
    pub fn get_buffer(&mut self, checksum: Checksum) -> Result<Buffer, CacheError> {
        if checksum.is_nil() {
            return Err(CacheError::miss(checksum));
        }
        if let Some(buffer) = self.get_local(checksum) {
            return Ok(buffer);
        }
        match self.remote.get_buffer(checksum)? {
            Some(buffer) => {
                let actual = buffer.checksum();
                if actual != checksum {
                    tracing::error!(
                        requested = %checksum,
                        actual = %actual,
                        "remote returned corrupt buffer"
                    );
                    return Err(CacheError::Corruption {
                        requested: checksum,
                        actual,
                    });
                }
                self.cache_buffer(checksum, buffer.clone())
                    .expect("verified buffer cannot conflict");
                Ok(buffer)
            }
            None => Err(CacheError::miss(checksum)),
        }
    }

    /// Returns `true` if the buffer is locally resident.
    pub fn is_resident(&self, checksum: Checksum) -> bool {
        self.buffers.contains_key(&checksum)
    }

    /// Evicts zero-refcount buffers whose grace period has elapsed.
    /// Returns the number of evicted buffers.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        for (&checksum, &last) in &self.last_use {
            if self.refcount.contains_key(&checksum) {
                continue;
            }
            let len = self
                .buffers
                .get(&checksum)
                .map(Buffer::len)
                .unwrap_or(usize::MAX);
            let lifetime = if len < self.small_buffer_limit {
                self.lifetime_temp_small
            } else {
                self.lifetime_temp
            };
            if now.duration_since(last) >= lifetime {
                expired.push(checksum);
            }
        }
        for checksum in &expired {
            debug!(checksum = %checksum, "evicting unreferenced buffer");
            self.buffers.remove(checksum);
            self.last_use.remove(checksum);
        }
        expired.len()
    }

    /// Looks up classification metadata, consulting the remote store on a
    /// local miss.
    pub fn buffer_info(&mut self, checksum: Checksum) -> Option<&BufferInfo> {
        if !self.buffer_info.contains_key(&checksum) {
            if let Some(remote_info) = self.remote.get_buffer_info(checksum) {
                self.buffer_info.insert(checksum, remote_info);
            }
        }
        self.buffer_info.get(&checksum)
    }

    /// Monotonically merges classification metadata for a checksum and
    /// pushes the merged result to the remote store.
    pub fn update_buffer_info(
        &mut self,
        checksum: Checksum,
        info: &BufferInfo,
    ) -> WeftResult<()> {
        let entry = self.buffer_info.entry(checksum).or_default();
        entry.update(info)?;
        self.remote.set_buffer_info(checksum, entry);
        Ok(())
    }

    /// Access to the remote collaborator (transformation/elision result
    /// lookups go through here).
    pub fn remote(&self) -> &dyn RemoteStore {
        &*self.remote
    }

    fn record_length(&mut self, checksum: Checksum, length: u64) {
        let entry = self.buffer_info.entry(checksum).or_default();
        let measured = BufferInfo {
            length: Some(length),
            ..Default::default()
        };
        // Synced peer metadata is unverified; the measured length wins.
        if entry.update(&measured).is_err() {
            warn!(
                checksum = %checksum,
                recorded = ?entry.length,
                measured = length,
                "buffer length conflicts with synced metadata, trusting the bytes"
            );
            entry.length = Some(length);
        }
    }

    fn resolve_missing(&mut self, checksum: Checksum, buffer: &Buffer) {
        if let Some(persistent) = self.missing.remove(&checksum) {
            debug!(checksum = %checksum, "found missing buffer");
            if persistent && !self.remote.has_buffer(checksum) {
                if let Err(err) = self.remote.set_buffer(checksum, buffer) {
                    warn!(checksum = %checksum, error = %err, "failed to offload found buffer");
                }
            }
        }
    }
}
