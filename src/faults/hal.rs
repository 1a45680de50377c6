//! Controller health readings as seen through the HAL.
//!
//! Each read is fallible on its own so a monitor can keep sampling the other
//! signals when one of them fails.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::utils::error::HalError;

/// Regulated outputs on the controller's power board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rail {
    V3_3,
    V5,
    V6,
}

impl Rail {
    pub const ALL: [Rail; 3] = [Rail::V3_3, Rail::V5, Rail::V6];

    pub fn label(&self) -> &'static str {
        match self {
            Rail::V3_3 => "3v3",
            Rail::V5 => "5v",
            Rail::V6 => "6v",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Rail::V3_3 => 0,
            Rail::V5 => 1,
            Rail::V6 => 2,
        }
    }

    pub fn enabled_signal(&self) -> &'static str {
        match self {
            Rail::V3_3 => "3v3_enabled",
            Rail::V5 => "5v_enabled",
            Rail::V6 => "6v_enabled",
        }
    }

    pub fn faults_signal(&self) -> &'static str {
        match self {
            Rail::V3_3 => "3v3_faults",
            Rail::V5 => "5v_faults",
            Rail::V6 => "6v_faults",
        }
    }
}

/// CAN controller status block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CanStatus {
    /// Bus utilization, 0.0..=1.0.
    pub utilization: f64,
    pub bus_off_count: u32,
    pub tx_full_count: u32,
    pub receive_error_count: u32,
    pub transmit_error_count: u32,
}

pub mod signal {
    pub const FPGA_VERSION: &str = "fpga_version";
    pub const BROWNOUT: &str = "brownout";
    pub const SYSTEM_ACTIVE: &str = "system_active";
    pub const VOLTAGE: &str = "robot_voltage";
    pub const CAN_STATUS: &str = "can_status";
}

pub trait RioHal: Send + Sync {
    /// `(version, revision)`.
    fn fpga_version(&self) -> Result<(u32, u32), HalError>;
    fn is_browned_out(&self) -> Result<bool, HalError>;
    fn is_sys_active(&self) -> Result<bool, HalError>;
    /// Battery voltage; a fixed nominal value under simulation.
    fn battery_voltage(&self) -> Result<f64, HalError>;
    fn can_status(&self) -> Result<CanStatus, HalError>;
    fn rail_enabled(&self, rail: Rail) -> Result<bool, HalError>;
    fn rail_fault_count(&self, rail: Rail) -> Result<u32, HalError>;
}

#[derive(Debug, Clone)]
pub struct SimRioState {
    pub fpga: (u32, u32),
    pub brownout: bool,
    pub system_active: bool,
    pub voltage: f64,
    pub can: CanStatus,
    pub rail_enabled: [bool; 3],
    pub rail_faults: [u32; 3],
}

impl Default for SimRioState {
    fn default() -> Self {
        Self {
            fpga: (2022, 4),
            brownout: false,
            system_active: false,
            voltage: 12.0,
            can: CanStatus::default(),
            rail_enabled: [false; 3],
            rail_faults: [0; 3],
        }
    }
}

/// Settable stand-in for the controller. The control loop (or a test) writes
/// the state; the monitor thread reads it. Named signals can be forced to fail.
#[derive(Debug, Default)]
pub struct SimRio {
    state: RwLock<SimRioState>,
    failing: RwLock<HashSet<&'static str>>,
}

impl SimRio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the simulated state under the write lock.
    pub fn update<F: FnOnce(&mut SimRioState)>(&self, f: F) {
        f(&mut self.state.write());
    }

    /// Makes every read of `signal` fail until `restore` is called.
    pub fn fail(&self, signal: &'static str) {
        self.failing.write().insert(signal);
    }

    pub fn restore(&self, signal: &'static str) {
        self.failing.write().remove(signal);
    }

    fn read<T>(&self, signal: &'static str, f: impl FnOnce(&SimRioState) -> T) -> Result<T, HalError> {
        if self.failing.read().contains(signal) {
            return Err(HalError::new(signal, "simulated read failure"));
        }
        Ok(f(&self.state.read()))
    }
}

impl RioHal for SimRio {
    fn fpga_version(&self) -> Result<(u32, u32), HalError> {
        self.read(signal::FPGA_VERSION, |s| s.fpga)
    }

    fn is_browned_out(&self) -> Result<bool, HalError> {
        self.read(signal::BROWNOUT, |s| s.brownout)
    }

    fn is_sys_active(&self) -> Result<bool, HalError> {
        self.read(signal::SYSTEM_ACTIVE, |s| s.system_active)
    }

    fn battery_voltage(&self) -> Result<f64, HalError> {
        self.read(signal::VOLTAGE, |s| s.voltage)
    }

    fn can_status(&self) -> Result<CanStatus, HalError> {
        self.read(signal::CAN_STATUS, |s| s.can)
    }

    fn rail_enabled(&self, rail: Rail) -> Result<bool, HalError> {
        self.read(rail.enabled_signal(), |s| s.rail_enabled[rail.index()])
    }

    fn rail_fault_count(&self, rail: Rail) -> Result<u32, HalError> {
        self.read(rail.faults_signal(), |s| s.rail_faults[rail.index()])
    }
}
