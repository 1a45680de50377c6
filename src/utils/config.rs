//! Runtime configuration for the monitoring subsystem.
//!
//! Every field has a default, so an empty (or missing) TOML file yields the stock
//! robot configuration: 20 ms gyro simulation, 80 ms fault reporting, 20 ms log flush.

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::utils::error::Result;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub gyro: GyroConfig,
    pub faults: FaultConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GyroConfig {
    /// Simulation tick period.
    pub period_ms: u64,
    /// Scale from odometry units to simulated degrees.
    pub rotation_gain: f64,
    pub device_name: String,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            rotation_gain: 40.0,
            device_name: "Simulated ADXRS450_Gyro".into(),
        }
    }
}

impl GyroConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub period_ms: u64,
    /// Bus utilization fraction above which every tick warns.
    pub can_usage_threshold: f64,
    pub telemetry_csv: Option<PathBuf>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            period_ms: 80,
            can_usage_threshold: 0.9,
            telemetry_csv: None,
        }
    }
}

impl FaultConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub flush_period_ms: u64,
    pub backlog_capacity: usize,
    /// Mirror every rendered line into `sim_logfile`.
    pub simulation: bool,
    pub sim_logfile: PathBuf,
    /// Secondary line transport (USB stick on the robot).
    pub usb_logfile: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            flush_period_ms: 20,
            backlog_capacity: 8192,
            simulation: false,
            sim_logfile: PathBuf::from("./FRC_UserProgram.log"),
            usb_logfile: None,
        }
    }
}

impl LoggingConfig {
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period_ms)
    }
}

impl MonitorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Falls back to defaults when the file does not exist. A file that exists
    /// but fails to parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
