//! # Pipelines Module (Orchestration)
//!
//! High-level workflow coordination: pipelines own the execution flow,
//! calling into `io` to load data, `model` to infer, and `io` again to
//! write results. Parallel fan-out over loci happens here, never inside
//! the algorithms.

pub mod compare;
pub mod index;
pub mod map;
