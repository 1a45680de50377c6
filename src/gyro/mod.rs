//! Gyroscope access, with a simulated backend that derives heading from
//! drivebase odometry when no physical sensor is fitted.

pub mod drivebase;
pub mod sim_device;
pub mod sim_gyro;
