//! End-to-end conformance tests for the weft fabric.
//!
//! This crate holds no library code; the suites under `tests/` exercise
//! the public surface of every weft crate together.
