//! Shared plumbing: configuration, errors, and per-task counters.

pub mod config;
pub mod error;
pub mod metrics;
