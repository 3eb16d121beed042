//! The celltype conversion engine.
//!
//! Celltypes form a directed conversion graph. Every ordered pair of
//! distinct celltypes is classified into exactly one of seven disjoint
//! kinds ([`table`]); the engine ([`engine::Converter`]) resolves a
//! requested conversion into single-hop steps, consults the per-checksum
//! [`BufferInfo`](weft_cache::BufferInfo) shortcuts, and only fetches and
//! transforms buffers when the outcome cannot be decided from metadata.
//!
//! Conversions never silently change semantic content: a kind either
//! preserves the checksum, is guaranteed to succeed, or may fail loudly
//! with a [`ConversionError`]; the classification states which.

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod table;
pub mod value;

pub use engine::{ConversionCounters, Converter, TryConvertResult};
pub use error::ConversionError;
pub use table::{check_conversions, classify, expand_conversion, ConversionKind};
