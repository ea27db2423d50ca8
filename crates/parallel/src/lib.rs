//! # firebasin parallel
//!
//! Execution strategies for coarse-grained, independent tasks.
//!
//! Work is dispatched as owned task values to a dedicated rayon pool and
//! results are collected in task order. Workers share no mutable state.

pub mod strategy;

pub use strategy::{default_workers, ParallelStrategy, ProcessingMode};
