//! sim_gyro.rs
//! Gyroscope with a simulated backend driven by drivebase odometry.
//!
//! - Simulation tick (20 ms default): wheel deltas -> angular increment
//!   `omega = (dL - dR) / track_width * gain`, integrated into the device angle.
//! - Heading: IEEE remainder of the raw angle, kept in (-180, 180].
//! - Inversion: applied on read only; stored angle and rate are untouched.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::info;
use parking_lot::Mutex;

use crate::gyro::{
    drivebase::DifferentialDrivebase,
    sim_device::SimGyroDevice,
};
use crate::scheduler::periodic::{PeriodicScheduler, PeriodicTask};
use crate::utils::{config::GyroConfig, error::Result};

/// Hardware gyro reached through the HAL. Only its raw readings matter here.
pub trait PhysicalGyro: Send + Sync {
    /// Accumulated angle, degrees.
    fn angle(&self) -> f64;
    /// Angular rate, degrees/second.
    fn rate(&self) -> f64;
}

/// Last wheel positions seen by the integrator.
#[derive(Debug, Default, Clone, Copy)]
struct WheelMemory {
    left: f64,
    right: f64,
}

struct SimCore {
    drivebase: Arc<dyn DifferentialDrivebase>,
    device: Arc<SimGyroDevice>,
    gain: f64,
    last: Mutex<WheelMemory>,
}

impl SimCore {
    /// One integration step. A zero track width divides by zero; callers must
    /// not configure one.
    fn step(&self) -> f64 {
        let left = self.drivebase.left_meters();
        let right = self.drivebase.right_meters();
        let width = self.drivebase.track_width_meters();

        let omega = {
            let mut last = self.last.lock();
            let left_delta = left - last.left;
            let right_delta = right - last.right;
            last.left = left;
            last.right = right;
            (left_delta - right_delta) / width * self.gain
        };

        self.device.angle.set(self.device.angle.get() + omega);
        self.device.rate.set(omega);
        omega
    }
}

/// Integrates drivebase odometry into the simulated gyro device on its own
/// periodic task.
pub struct SimulatedGyroEngine {
    core: Arc<SimCore>,
    task: PeriodicTask,
}

impl SimulatedGyroEngine {
    /// Opens the simulated device and schedules the integration task without
    /// starting it.
    pub fn new(
        scheduler: &PeriodicScheduler,
        drivebase: Arc<dyn DifferentialDrivebase>,
        config: &GyroConfig,
    ) -> Self {
        let core = Arc::new(SimCore {
            drivebase,
            device: SimGyroDevice::create(config.device_name.clone()),
            gain: config.rotation_gain,
            last: Mutex::new(WheelMemory::default()),
        });

        let tick_core = core.clone();
        let task = scheduler.schedule("gyro-sim", config.period(), move || {
            tick_core.step();
        });

        Self { core, task }
    }

    /// Opens the device and starts simulating. Attach once per drivebase.
    pub fn attach(
        scheduler: &PeriodicScheduler,
        drivebase: Arc<dyn DifferentialDrivebase>,
        config: &GyroConfig,
    ) -> Result<Self> {
        let mut engine = Self::new(scheduler, drivebase, config);
        engine.start()?;
        info!(
            "[Gyro] simulating `{}` at {:?}",
            engine.core.device.name(),
            engine.task.period()
        );
        Ok(engine)
    }

    pub fn start(&mut self) -> Result<()> {
        self.task.start()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }

    /// Runs one integration step on the calling thread.
    pub fn tick(&self) {
        self.task.tick_once();
    }

    pub fn device(&self) -> Arc<SimGyroDevice> {
        self.core.device.clone()
    }

    pub fn angle(&self) -> f64 {
        self.core.device.angle.get()
    }

    pub fn rate(&self) -> f64 {
        self.core.device.rate.get()
    }
}

/// Backend selected when the gyro is constructed.
pub enum GyroSource {
    Physical(Box<dyn PhysicalGyro>),
    Simulated(SimulatedGyroEngine),
}

pub struct Gyroscope {
    source: GyroSource,
    inverted: AtomicBool,
}

impl Gyroscope {
    pub fn physical(sensor: Box<dyn PhysicalGyro>) -> Self {
        Self::from_source(GyroSource::Physical(sensor))
    }

    pub fn simulated(engine: SimulatedGyroEngine) -> Self {
        Self::from_source(GyroSource::Simulated(engine))
    }

    pub fn from_source(source: GyroSource) -> Self {
        Self {
            source,
            inverted: AtomicBool::new(false),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.source, GyroSource::Simulated(_))
    }

    pub fn engine(&self) -> Option<&SimulatedGyroEngine> {
        match &self.source {
            GyroSource::Simulated(engine) => Some(engine),
            GyroSource::Physical(_) => None,
        }
    }

    pub fn set_inverted(&self, inverted: bool) {
        self.inverted.store(inverted, Ordering::Relaxed);
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted.load(Ordering::Relaxed)
    }

    /// Raw accumulated angle, never wrapped and never inverted.
    pub fn get_angle(&self) -> f64 {
        match &self.source {
            GyroSource::Simulated(engine) => engine.angle(),
            GyroSource::Physical(sensor) => sensor.angle(),
        }
    }

    /// Angle wrapped into (-180, 180], sign-adjusted for inversion.
    pub fn get_heading(&self) -> f64 {
        wrap_heading(self.get_angle() * self.sign())
    }

    pub fn get_rate(&self) -> f64 {
        let raw = match &self.source {
            GyroSource::Simulated(engine) => engine.rate(),
            GyroSource::Physical(sensor) => sensor.rate(),
        };
        raw * self.sign()
    }

    #[inline]
    fn sign(&self) -> f64 {
        if self.is_inverted() { -1.0 } else { 1.0 }
    }
}

/// IEEE-754 remainder by 360. Ties round to even, so both ±180 can come out;
/// either is reported as 180. The remainder is odd, so wrapping a negated angle
/// equals negating the wrapped angle everywhere except that boundary.
pub fn wrap_heading(angle: f64) -> f64 {
    let wrapped = libm::remainder(angle, 360.0);
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}
