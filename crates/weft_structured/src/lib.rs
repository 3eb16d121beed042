//! Structured cells: composed JSON state over the dependency graph.
//!
//! A structured cell owns an authoritative value and a set of channel
//! paths. Graph connections write inchannels, joins overlay them onto
//! the authoritative value, and outchannels expose sub-paths of the
//! joined result as ordinary cells.

#![warn(missing_docs)]

pub mod error;
pub mod paths;
pub mod structured;

pub use error::StructuredError;
pub use structured::StructuredCell;
