//! Periodic background execution and the edge-detection helpers the monitors
//! build their per-tick comparisons on.

pub mod edge;
pub mod periodic;
