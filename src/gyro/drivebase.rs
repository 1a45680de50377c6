//! Drivebase odometry consumed by the gyro simulation.

use super::sim_device::SimDouble;

/// Read-only view of a differential drivebase's odometry.
pub trait DifferentialDrivebase: Send + Sync {
    /// Left wheel displacement since boot, meters.
    fn left_meters(&self) -> f64;
    /// Right wheel displacement since boot, meters.
    fn right_meters(&self) -> f64;
    /// Distance between the wheel contact patches, meters. Must be non-zero.
    fn track_width_meters(&self) -> f64;
}

/// Drivebase whose encoder readings are written by the control loop (or a
/// physics stub) and read by the simulation thread.
#[derive(Debug)]
pub struct SimDrivebase {
    left: SimDouble,
    right: SimDouble,
    track_width: f64,
}

impl SimDrivebase {
    pub fn new(track_width_meters: f64) -> Self {
        Self {
            left: SimDouble::new(0.0),
            right: SimDouble::new(0.0),
            track_width: track_width_meters,
        }
    }

    pub fn set_positions(&self, left_meters: f64, right_meters: f64) {
        self.left.set(left_meters);
        self.right.set(right_meters);
    }

    /// Advances both wheels by the given displacement.
    pub fn drive(&self, left_delta: f64, right_delta: f64) {
        self.left.set(self.left.get() + left_delta);
        self.right.set(self.right.get() + right_delta);
    }
}

impl DifferentialDrivebase for SimDrivebase {
    fn left_meters(&self) -> f64 {
        self.left.get()
    }

    fn right_meters(&self) -> f64 {
        self.right.get()
    }

    fn track_width_meters(&self) -> f64 {
        self.track_width
    }
}
