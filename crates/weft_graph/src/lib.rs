//! The live dependency graph and its driving engine.
//!
//! Cells hold checksums, accessors connect them, workers compute, and
//! every demanded value is an [`Expression`] that is deduplicated and
//! evaluated at most once. The [`Manager`] ties the graph to the buffer
//! cache, the converter, the elision table and the job scheduler, and
//! drives the whole fabric to quiescence in [`Manager::compute`].

#![warn(missing_docs)]

pub mod arena;
pub mod cachemanager;
pub mod config;
pub mod elision;
pub mod error;
pub mod expression;
pub mod ids;
pub mod livegraph;
pub mod manager;
pub mod scheduler;
pub mod status;
pub mod worker;

pub use cachemanager::{CacheManager, Provenance};
pub use config::{load_config, load_config_from_str, ConfigError, EngineConfig};
pub use elision::{elision_checksum, ElisionRecord, ElisionTable};
pub use error::GraphError;
pub use expression::{evaluate_expression, Expression, HashPattern};
pub use ids::{AccessorId, CellId, ScellId, WorkerId};
pub use livegraph::{GraphEffect, LiveGraph, ReadSide, WriteSide};
pub use manager::{ComputeReport, Manager};
pub use scheduler::{CancelToken, Task, TaskManager};
pub use status::StatusReason;
pub use worker::{ExecutionError, Executor, FnExecutor, TransformationRecord, Worker};
