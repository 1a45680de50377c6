//! Simulated sensor channels: named devices with independently settable
//! numeric fields, readable by anything holding the device handle.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// An `f64` cell shared between one writer and any number of readers.
#[derive(Debug, Default)]
pub struct SimDouble {
    bits: AtomicU64,
}

impl SimDouble {
    pub fn new(initial: f64) -> Self {
        Self {
            bits: AtomicU64::new(initial.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

/// Simulated gyro output: accumulated angle (degrees) and rate (degrees/tick).
#[derive(Debug)]
pub struct SimGyroDevice {
    name: String,
    pub angle: SimDouble,
    pub rate: SimDouble,
}

impl SimGyroDevice {
    pub fn create(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            angle: SimDouble::new(0.0),
            rate: SimDouble::new(0.0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
