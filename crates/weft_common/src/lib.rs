//! Shared foundational types used across the Weft computation fabric.
//!
//! This crate provides core value types: content checksums, immutable
//! buffers, the closed celltype enum, the native numeric-array and mixed
//! buffer formats, and common result types.

#![warn(missing_docs)]

pub mod buffer;
pub mod celltype;
pub mod checksum;
pub mod format;
pub mod result;

pub use buffer::Buffer;
pub use celltype::{CellType, ParseCellTypeError, CELL_TYPES};
pub use checksum::Checksum;
pub use format::{is_array_buffer, is_mixed_container, ArrayBuf, Dtype, MAGIC_ARRAY, MAGIC_MIXED};
pub use result::{InternalError, WeftResult};
