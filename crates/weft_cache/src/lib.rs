//! Local content-addressed buffer caching for the Weft fabric.
//!
//! This crate provides the checksum-to-buffer cache with refcounting and
//! grace-period eviction, the per-checksum [`BufferInfo`] classification
//! metadata, and the [`RemoteStore`] trait through which the cache falls
//! back to an external buffer/value store.

#![warn(missing_docs)]

pub mod buffer_info;
pub mod cache;
pub mod error;
pub mod remote;

pub use buffer_info::{BufferInfo, JsonType};
pub use cache::BufferCache;
pub use error::CacheError;
pub use remote::{NoRemote, RemoteStore};
