//! # rio_monitor
//!
//! Background hardware monitoring for a robot controller, each part on its own
//! fixed-period thread, separate from the main control loop:
//!
//! - **Gyro simulation** (20 ms): integrates drivebase odometry into a simulated
//!   gyro when no physical sensor is fitted.
//! - **Fault reporting** (80 ms): edge-triggered diagnostics for brownouts, rail
//!   state and fault counts, CAN errors and utilization, plus CSV telemetry.
//! - **Robot log**: urgent lines go out immediately; everything else is buffered
//!   and flushed on its own period.
//!
//! Components are constructed once and shared by handle. Every periodic task has
//! an explicit start/stop lifecycle and a single-step `tick` for tests.

pub mod faults;
pub mod gyro;
pub mod logging;
pub mod scheduler;
pub mod utils;
