//! Controller power and bus health: HAL readings, edge-triggered fault
//! reporting, and per-tick telemetry.

pub mod hal;
pub mod reporter;
pub mod telemetry;
